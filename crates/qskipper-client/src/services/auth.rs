use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use qskipper_shared::constants::{LOGIN_PATH, REGISTER_PATH};
use qskipper_shared::normalize::decode_auth;
use qskipper_shared::SessionIdentity;

use crate::error::{ApiError, Result};
use crate::gateway::ApiGateway;
use crate::session::SessionHandle;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "restaurant_Name")]
    pub restaurant_name: String,
    #[serde(rename = "cuisines")]
    pub cuisine: String,
    #[serde(rename = "estimatedTime")]
    pub estimated_time: u32,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    gateway: ApiGateway,
    session: SessionHandle,
}

impl AuthService {
    pub fn new(gateway: ApiGateway, session: SessionHandle) -> Self {
        Self { gateway, session }
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionIdentity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::InvalidInput("email and password are required".into()));
        }

        let response = self
            .gateway
            .send_json(
                Method::POST,
                LOGIN_PATH,
                &json!({ "email": email, "password": password }),
            )
            .await?;
        let identity = self.session.establish(decode_auth(&response.body)?).await?;

        info!(user_id = ?identity.user_id, "Logged in");
        Ok(identity)
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<SessionIdentity> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(ApiError::InvalidInput("email and password are required".into()));
        }
        if request.restaurant_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("restaurant name is required".into()));
        }

        let response = self
            .gateway
            .send_json(Method::POST, REGISTER_PATH, request)
            .await?;
        let mut payload = decode_auth(&response.body)?;

        // Fill the profile from the request where the response is silent.
        if payload.restaurant.name.is_empty() {
            payload.restaurant.name = request.restaurant_name.clone();
        }
        if payload.restaurant.cuisine.is_empty() {
            payload.restaurant.cuisine = request.cuisine.clone();
        }
        if payload.restaurant.estimated_time == 0 {
            payload.restaurant.estimated_time = request.estimated_time;
        }

        let identity = self.session.establish(payload).await?;
        info!(user_id = ?identity.user_id, "Registered");
        Ok(identity)
    }

    /// Clear the session and every cached response.
    pub async fn logout(&self) -> Result<()> {
        self.gateway.response_cache().clear().await;
        self.session.logout().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    use qskipper_shared::constants::{KEY_AUTH_TOKEN, KEY_RESTAURANT_ID, KEY_USER_ID};

    use crate::test_support::harness;

    fn service(h: &crate::test_support::Harness) -> AuthService {
        AuthService::new(h.gateway.clone(), h.session.clone())
    }

    #[tokio::test]
    async fn login_with_nested_user_response() {
        let router = Router::new().route(
            LOGIN_PATH,
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["email"], "owner@chai.in");
                Json(serde_json::json!({
                    "token": "jwt-1",
                    "user": {
                        "_id": "u42",
                        "restaurantid": "r42",
                        "restaurantName": "Chai Point",
                        "cuisine": "Indian",
                        "estimatedTime": "25"
                    }
                }))
            }),
        );
        let h = harness(router, false).await;

        let identity = service(&h).login("owner@chai.in", "secret").await.unwrap();
        assert_eq!(identity.user_id.as_deref(), Some("u42"));
        assert_eq!(identity.restaurant_id.as_deref(), Some("r42"));
        assert_eq!(identity.restaurant.estimated_time, 25);
        assert!(h.session.is_authenticated());
        assert_eq!(h.store.get(KEY_USER_ID).as_deref(), Some("u42"));
        assert_eq!(h.store.get(KEY_AUTH_TOKEN).as_deref(), Some("jwt-1"));
        assert_eq!(h.store.get(KEY_RESTAURANT_ID).as_deref(), Some("r42"));
    }

    #[tokio::test]
    async fn rejected_login_leaves_no_session() {
        let router = Router::new().route(
            LOGIN_PATH,
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "message": "Invalid credentials" })),
                )
            }),
        );
        let h = harness(router, false).await;
        let err = service(&h).login("owner@chai.in", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let h = harness(Router::new(), false).await;
        assert!(matches!(
            service(&h).login("  ", "pw").await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn register_fills_profile_from_request() {
        let router = Router::new().route(
            REGISTER_PATH,
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["restaurant_Name"], "Dosa Hut");
                assert_eq!(body["cuisines"], "South Indian");
                Json(serde_json::json!({ "id": "u7", "restaurantId": "r7" }))
            }),
        );
        let h = harness(router, false).await;
        let request = RegisterRequest {
            email: "dosa@hut.in".into(),
            password: "pw".into(),
            restaurant_name: "Dosa Hut".into(),
            cuisine: "South Indian".into(),
            estimated_time: 15,
        };

        let identity = service(&h).register(&request).await.unwrap();
        assert_eq!(identity.user_id.as_deref(), Some("u7"));
        assert_eq!(identity.restaurant.name, "Dosa Hut");
        assert_eq!(identity.restaurant.estimated_time, 15);
    }

    #[tokio::test]
    async fn logout_clears_session_and_response_cache() {
        let h = harness(Router::new(), true).await;
        h.gateway
            .response_cache()
            .put("/get_all_product/r1", bytes::Bytes::from_static(b"[]"))
            .await;

        let auth = service(&h);
        auth.logout().await.unwrap();
        assert!(!auth.is_authenticated());
        assert_eq!(h.session.user_id(), None);
        assert_eq!(h.gateway.response_cache().len().await, 0);

        auth.logout().await.unwrap();
    }
}
