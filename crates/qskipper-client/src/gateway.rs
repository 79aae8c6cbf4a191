//! HTTP gateway to the QSkipper backend.
//!
//! Requests to the backend carry the session's bearer token when one is held.
//! Every request gets a per-method timeout (reads short, writes long enough
//! for image payloads). Responses are classified into [`RawResponse`] or an
//! [`ApiError`]; a backend 401 logs the session out before the error is
//! returned. Other hosts never see the token and their 401s are plain errors.

use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use qskipper_shared::constants::APP_NAME;
use qskipper_shared::normalize::envelope::extract_message;
use qskipper_shared::normalize::looks_like_html;
use qskipper_shared::NormalizeError;

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::response_cache::ResponseCache;
use crate::session::SessionHandle;

/// Decoder turning a list body into typed records.
pub type ListDecoder<T> = fn(&[u8]) -> std::result::Result<Vec<T>, NormalizeError>;

/// A 2xx response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct ApiGateway {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
    cache: ResponseCache,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// Map a status and body onto the error taxonomy.
pub fn classify(status: u16, body: Bytes) -> Result<RawResponse> {
    match status {
        200..=299 => Ok(RawResponse { status, body }),
        401 => Err(ApiError::Unauthorized),
        404 => Err(ApiError::NotFound(
            extract_message(&body).unwrap_or_else(|| "resource not found".into()),
        )),
        _ => Err(ApiError::Server {
            status,
            message: extract_message(&body)
                .unwrap_or_else(|| format!("Request failed with status {status}")),
        }),
    }
}

impl ApiGateway {
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self> {
        let base_url = config.api_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidInput(format!(
                "backend URL must be http(s): {base_url}"
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            session,
            cache: ResponseCache::new(config.response_cache_ttl),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Absolute URLs pass through; paths are joined to the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn timeout_for(&self, method: &Method) -> Duration {
        if *method == Method::POST || *method == Method::PUT || *method == Method::PATCH {
            self.write_timeout
        } else {
            self.read_timeout
        }
    }

    /// Whether `url` points at the configured backend.
    pub fn targets_backend(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
    }

    fn builder(&self, method: Method, path: &str) -> Outgoing {
        let url = self.url(path);
        let backend = self.targets_backend(&url);
        let timeout = self.timeout_for(&method);
        let mut request = self.http.request(method, url).timeout(timeout);
        if backend {
            if let Some(token) = self.session.token() {
                request = request.bearer_auth(token);
            }
        }
        Outgoing { request, backend }
    }

    /// Same as [`ApiGateway::builder`] but never carries credentials and never
    /// touches the session.
    fn anonymous(&self, method: Method, path: &str) -> Outgoing {
        let timeout = self.timeout_for(&method);
        Outgoing {
            request: self.http.request(method, self.url(path)).timeout(timeout),
            backend: false,
        }
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<(u16, Bytes)> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let url = response.url().path().to_string();
        let body = response.bytes().await?;
        debug!(path = %url, status, len = body.len(), "Response received");
        Ok((status, body))
    }

    async fn finish(&self, status: u16, body: Bytes, backend: bool) -> Result<RawResponse> {
        if status == 401 && !backend {
            return Err(ApiError::Server {
                status,
                message: extract_message(&body)
                    .unwrap_or_else(|| format!("Request failed with status {status}")),
            });
        }
        let result = classify(status, body);
        if let Err(ApiError::Unauthorized) = &result {
            warn!("Backend rejected credentials, invalidating session");
            self.cache.clear().await;
            if let Err(e) = self.session.logout().await {
                warn!(error = %e, "Session invalidation incomplete");
            }
        }
        result
    }

    async fn execute(&self, outgoing: Outgoing) -> Result<RawResponse> {
        let (status, body) = self.send_raw(outgoing.request).await?;
        self.finish(status, body, outgoing.backend).await
    }

    pub async fn get(&self, path: &str) -> Result<RawResponse> {
        self.execute(self.builder(Method::GET, path)).await
    }

    /// GET without credentials, for public assets such as images that may
    /// live on another host. A 401 here is an ordinary failure.
    pub async fn get_public(&self, path: &str) -> Result<RawResponse> {
        self.execute(self.anonymous(Method::GET, path)).await
    }

    /// GET through the short-lived response cache. Only 2xx bodies are kept.
    pub async fn get_cached(&self, path: &str) -> Result<Bytes> {
        if let Some(body) = self.cache.get(path).await {
            return Ok(body);
        }
        let response = self.get(path).await?;
        self.cache.put(path, response.body.clone()).await;
        Ok(response.body)
    }

    pub async fn send_json<B>(&self, method: Method, path: &str, body: &B) -> Result<RawResponse>
    where
        B: Serialize + ?Sized,
    {
        let mut outgoing = self.builder(method, path);
        outgoing.request = outgoing.request.json(body);
        self.execute(outgoing).await
    }

    pub async fn send_multipart(&self, method: Method, path: &str, form: Form) -> Result<RawResponse> {
        let mut outgoing = self.builder(method, path);
        outgoing.request = outgoing.request.multipart(form);
        self.execute(outgoing).await
    }

    pub async fn delete(&self, path: &str) -> Result<RawResponse> {
        self.execute(self.builder(Method::DELETE, path)).await
    }

    /// Read a list endpoint. Anything that plausibly means "nothing here"
    /// (404, an HTML error page, a no-results message, an unreadable 2xx
    /// body) yields an empty list.
    pub async fn fetch_list<T>(
        &self,
        path: &str,
        decode: ListDecoder<T>,
        cached: bool,
    ) -> Result<Vec<T>> {
        if cached {
            if let Some(body) = self.cache.get(path).await {
                return Ok(decode_or_empty(path, &body, decode));
            }
        }

        let outgoing = self.builder(Method::GET, path);
        let backend = outgoing.backend;
        let (status, body) = self.send_raw(outgoing.request).await?;
        if !(200..300).contains(&status) {
            if status == 404 {
                debug!(path, message = ?extract_message(&body), "List endpoint returned 404, treating as empty");
                return Ok(Vec::new());
            }
            if looks_like_html(&body) {
                warn!(path, status, "List endpoint answered with an HTML error page, treating as empty");
                return Ok(Vec::new());
            }
            return self.finish(status, body, backend).await.map(|_| Vec::new());
        }

        if cached {
            self.cache.put(path, body.clone()).await;
        }
        Ok(decode_or_empty(path, &body, decode))
    }
}

struct Outgoing {
    request: RequestBuilder,
    backend: bool,
}

fn decode_or_empty<T>(path: &str, body: &[u8], decode: ListDecoder<T>) -> Vec<T> {
    match decode(body) {
        Ok(items) => items,
        Err(e) => {
            warn!(path, error = %e, "Unreadable list body, treating as empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{Html, IntoResponse};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use qskipper_shared::normalize::{decode_orders, decode_products};

    use crate::test_support::{harness, serve};

    #[test]
    fn classify_maps_statuses() {
        assert!(classify(200, Bytes::new()).is_ok());
        assert_eq!(classify(202, Bytes::new()).unwrap().status, 202);
        assert!(matches!(
            classify(401, Bytes::new()),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            classify(404, Bytes::from_static(br#"{"message":"No orders found"}"#)),
            Err(ApiError::NotFound(m)) if m == "No orders found"
        ));
        assert!(matches!(
            classify(500, Bytes::from_static(br#"{"error":"db down"}"#)),
            Err(ApiError::Server { status: 500, message }) if message == "db down"
        ));
        assert!(matches!(
            classify(503, Bytes::from_static(b"<html>busy</html>")),
            Err(ApiError::Server { status: 503, message }) if message == "Request failed with status 503"
        ));
    }

    #[tokio::test]
    async fn bearer_token_is_attached_when_held() {
        async fn echo(headers: HeaderMap) -> Json<serde_json::Value> {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Json(json!({ "authorization": auth }))
        }
        let router = Router::new().route("/echo", get(echo));

        let signed_in = harness(router.clone(), true).await;
        let body = signed_in.gateway.get("/echo").await.unwrap().body;
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["authorization"], "Bearer tok");

        let anonymous = harness(router, false).await;
        let body = anonymous.gateway.get("/echo").await.unwrap().body;
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["authorization"].is_null());
    }

    #[tokio::test]
    async fn not_found_list_is_empty() {
        let router = Router::new().route(
            "/get-order/r1",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "message": "No orders found" })),
                )
            }),
        );
        let h = harness(router, true).await;
        let orders = h
            .gateway
            .fetch_list("/get-order/r1", decode_orders, false)
            .await
            .unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn html_list_bodies_are_empty() {
        let page = "<!DOCTYPE html><html><body>Bad gateway</body></html>";
        let router = Router::new()
            .route("/ok-html", get(move || async move { Html(page) }))
            .route(
                "/bad-gateway",
                get(move || async move { (StatusCode::BAD_GATEWAY, Html(page)).into_response() }),
            );
        let h = harness(router, true).await;

        let ok = h.gateway.fetch_list("/ok-html", decode_products, false).await;
        assert!(ok.unwrap().is_empty());
        let bad = h.gateway.fetch_list("/bad-gateway", decode_products, false).await;
        assert!(bad.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_success_body_is_empty() {
        let router = Router::new().route("/get_all_product/r1", get(|| async { "Service warming up" }));
        let h = harness(router, true).await;
        let products = h
            .gateway
            .fetch_list("/get_all_product/r1", decode_products, false)
            .await
            .unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn server_errors_on_lists_surface() {
        let router = Router::new().route(
            "/get-order/r1",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "database unavailable" })),
                )
            }),
        );
        let h = harness(router, true).await;
        let err = h
            .gateway
            .fetch_list("/get-order/r1", decode_orders, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 500, message } if message == "database unavailable"));
    }

    #[tokio::test]
    async fn unauthorized_invalidates_session() {
        let router = Router::new().route(
            "/get-order/r1",
            get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({ "message": "jwt expired" }))) }),
        );
        let h = harness(router, true).await;
        assert!(h.session.is_authenticated());

        let err = h
            .gateway
            .fetch_list("/get-order/r1", decode_orders, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(!h.session.is_authenticated());
        assert_eq!(h.session.token(), None);
    }

    #[tokio::test]
    async fn unauthorized_also_drops_cached_responses() {
        let router = Router::new().route(
            "/get-order/r1",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let h = harness(router, true).await;
        h.gateway
            .response_cache()
            .put("/get_all_product/r1", Bytes::from_static(b"[]"))
            .await;

        assert!(h.gateway.get("/get-order/r1").await.is_err());
        assert_eq!(h.gateway.response_cache().len().await, 0);
    }

    #[tokio::test]
    async fn other_hosts_get_no_token_and_cannot_end_the_session() {
        async fn reject(headers: HeaderMap) -> (StatusCode, Json<serde_json::Value>) {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            (StatusCode::UNAUTHORIZED, Json(json!({ "message": auth })))
        }
        let cdn = serve(Router::new().route("/img.jpg", get(reject))).await;
        let h = harness(Router::new(), true).await;

        let err = h.gateway.get(&format!("{cdn}/img.jpg")).await.unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 401, message } if message == "none"));
        assert!(h.session.is_authenticated());
        assert_eq!(h.session.token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn backend_prefix_must_end_at_a_path_boundary() {
        let h = harness(Router::new(), false).await;
        let base = h.gateway.url("");
        let base = base.trim_end_matches('/');
        assert!(h.gateway.targets_backend(&format!("{base}/get-order/r1")));
        assert!(h.gateway.targets_backend(base));
        assert!(!h.gateway.targets_backend(&format!("{base}0/evil")));
        assert!(!h.gateway.targets_backend("https://cdn.example.com/a.jpg"));
    }

    #[tokio::test]
    async fn cached_reads_hit_the_network_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/get_all_product/r1",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "products": [{ "_id": "p1", "product_name": "Idli", "product_price": 60 }] }))
                }
            }),
        );
        let h = harness(router, true).await;

        for _ in 0..3 {
            let products = h
                .gateway
                .fetch_list("/get_all_product/r1", decode_products, true)
                .await
                .unwrap();
            assert_eq!(products.len(), 1);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        h.gateway.response_cache().invalidate_prefix("/get_all_product").await;
        h.gateway
            .fetch_list("/get_all_product/r1", decode_products, true)
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_reads_time_out() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let base = serve(router).await;
        let h = harness(Router::new(), false).await;
        let config = ClientConfig {
            api_url: base,
            read_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let gateway = ApiGateway::new(&config, h.session.clone()).unwrap();
        assert!(matches!(gateway.get("/slow").await, Err(ApiError::Timeout)));
    }

    #[tokio::test]
    async fn rejects_non_http_base_url() {
        let h = harness(Router::new(), false).await;
        let config = ClientConfig {
            api_url: "qskipper.local".into(),
            ..Default::default()
        };
        assert!(matches!(
            ApiGateway::new(&config, h.session.clone()),
            Err(ApiError::InvalidInput(_))
        ));
        assert_eq!(
            h.gateway.url("https://cdn.example.com/a.jpg"),
            "https://cdn.example.com/a.jpg"
        );
        assert!(h.gateway.url("/get-order/r1").ends_with("/get-order/r1"));
    }
}
