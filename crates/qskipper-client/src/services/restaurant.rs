//! Restaurant profile updates.
//!
//! `/update-restaurant` is the only path used for profile changes; the
//! registration endpoint is never reused for them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use qskipper_shared::constants::{BANNER_IMAGE_MAX_EDGE, BANNER_PHOTO_FIELD, UPDATE_RESTAURANT_PATH};
use qskipper_shared::normalize::records::restaurant_id_from_raw;
use qskipper_shared::{RestaurantProfile, SessionIdentity};

use crate::error::{ApiError, Result};
use crate::fallback::FallbackChain;
use crate::gateway::ApiGateway;
use crate::session::SessionHandle;

#[derive(Debug, Clone, Default)]
pub struct RestaurantUpdate {
    pub name: String,
    pub cuisine: String,
    /// Minutes.
    pub estimated_time: u32,
    pub banner: Option<Bytes>,
}

impl RestaurantUpdate {
    fn text_fields(&self, user_id: &str) -> [(&'static str, String); 4] {
        [
            ("restaurant_Name", self.name.trim().to_string()),
            ("userId", user_id.to_string()),
            ("cuisines", self.cuisine.trim().to_string()),
            ("estimatedTime", self.estimated_time.to_string()),
        ]
    }

    fn form(&self, user_id: &str) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in self.text_fields(user_id) {
            form = form.text(name, value);
        }
        if let Some(banner) = &self.banner {
            let part = Part::bytes(banner.to_vec())
                .file_name("banner.jpg")
                .mime_str("image/jpeg")?;
            form = form.part(BANNER_PHOTO_FIELD, part);
        }
        Ok(form)
    }

    fn json(&self, user_id: &str) -> Value {
        let mut map = Map::new();
        for (name, value) in self.text_fields(user_id) {
            map.insert(name.into(), Value::String(value));
        }
        map.insert("estimatedTime".into(), json!(self.estimated_time));
        if let Some(banner) = &self.banner {
            map.insert(BANNER_PHOTO_FIELD.into(), json!(STANDARD.encode(banner)));
        }
        Value::Object(map)
    }

    fn profile(&self) -> RestaurantProfile {
        RestaurantProfile {
            name: self.name.trim().to_string(),
            cuisine: self.cuisine.trim().to_string(),
            estimated_time: self.estimated_time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestaurantService {
    gateway: ApiGateway,
    session: SessionHandle,
}

impl RestaurantService {
    pub fn new(gateway: ApiGateway, session: SessionHandle) -> Self {
        Self { gateway, session }
    }

    /// Push a profile change, multipart first, then JSON. On success the
    /// session's restaurant snapshot is replaced.
    #[tracing::instrument(skip(self, update), fields(name = %update.name))]
    pub async fn update_profile(&self, update: &RestaurantUpdate) -> Result<SessionIdentity> {
        let user_id = self
            .session
            .user_id()
            .ok_or_else(|| ApiError::InvalidInput("not signed in".into()))?;
        if update.name.trim().is_empty() {
            return Err(ApiError::InvalidInput("restaurant name is required".into()));
        }

        let mut upload = update.clone();
        if let Some(banner) = update.banner.clone() {
            upload.banner = Some(super::compress_upload(banner, BANNER_IMAGE_MAX_EDGE).await?);
        }

        let gateway = &self.gateway;
        let (upload, user_id) = (&upload, user_id.as_str());
        let response = FallbackChain::new("update_restaurant")
            .then("multipart", move || async move {
                let form = upload.form(user_id)?;
                gateway
                    .send_multipart(Method::POST, UPDATE_RESTAURANT_PATH, form)
                    .await
            })
            .then("json", move || async move {
                gateway
                    .send_json(Method::POST, UPDATE_RESTAURANT_PATH, &upload.json(user_id))
                    .await
            })
            .run()
            .await
            .into_result()?;

        let echoed_id = serde_json::from_slice::<Value>(&response.body)
            .ok()
            .and_then(|value| restaurant_id_from_raw(&value));
        debug!(restaurant_id = ?echoed_id, "Restaurant update accepted");

        let identity = self
            .session
            .set_restaurant(echoed_id, update.profile())
            .await?;
        info!(restaurant_id = ?identity.restaurant_id, "Restaurant profile updated");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes as Body;
    use axum::extract::Multipart;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;

    use qskipper_shared::constants::KEY_RESTAURANT_DATA;

    use crate::test_support::{harness, sample_png, Harness};

    fn service(h: &Harness) -> RestaurantService {
        RestaurantService::new(h.gateway.clone(), h.session.clone())
    }

    fn update() -> RestaurantUpdate {
        RestaurantUpdate {
            name: "Chai Point Express".into(),
            cuisine: "Snacks".into(),
            estimated_time: 12,
            banner: None,
        }
    }

    #[tokio::test]
    async fn multipart_update_refreshes_session_snapshot() {
        async fn handler(mut multipart: Multipart) -> impl IntoResponse {
            let mut user = String::new();
            let mut banner_len = 0;
            while let Some(field) = multipart.next_field().await.unwrap() {
                let name = field.name().unwrap_or_default().to_string();
                let data = field.bytes().await.unwrap();
                match name.as_str() {
                    "userId" => user = String::from_utf8(data.to_vec()).unwrap(),
                    BANNER_PHOTO_FIELD => banner_len = data.len(),
                    _ => {}
                }
            }
            assert_eq!(user, "u1");
            assert!(banner_len > 0);
            axum::Json(serde_json::json!({ "restaurant": { "_id": "r1", "restaurantName": "Chai Point Express" } }))
        }
        let router = Router::new().route(UPDATE_RESTAURANT_PATH, post(handler));
        let h = harness(router, true).await;

        let mut change = update();
        change.banner = Some(Bytes::from(sample_png(300, 120)));
        let identity = service(&h).update_profile(&change).await.unwrap();

        assert_eq!(identity.restaurant_id.as_deref(), Some("r1"));
        assert_eq!(identity.restaurant.name, "Chai Point Express");
        assert_eq!(h.session.current().restaurant.estimated_time, 12);
        assert!(h
            .store
            .get(KEY_RESTAURANT_DATA)
            .unwrap()
            .contains("Chai Point Express"));
    }

    #[tokio::test]
    async fn json_fallback_after_multipart_timeout_class_failure() {
        async fn handler(headers: HeaderMap, body: Body) -> axum::response::Response {
            let is_multipart = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("multipart/"));
            if is_multipart {
                return (StatusCode::BAD_GATEWAY, "upstream reset").into_response();
            }
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["restaurant_Name"], "Chai Point Express");
            assert_eq!(value["estimatedTime"], 12);
            (StatusCode::OK, "updated").into_response()
        }
        let router = Router::new().route(UPDATE_RESTAURANT_PATH, post(handler));
        let h = harness(router, true).await;

        let identity = service(&h).update_profile(&update()).await.unwrap();
        // The response named no restaurant; the resolved one is kept.
        assert_eq!(identity.restaurant_id.as_deref(), Some("r1"));
        assert_eq!(identity.restaurant.cuisine, "Snacks");
    }

    #[tokio::test]
    async fn requires_a_session() {
        let h = harness(Router::new(), false).await;
        assert!(matches!(
            service(&h).update_profile(&update()).await,
            Err(ApiError::InvalidInput(_))
        ));
    }
}
