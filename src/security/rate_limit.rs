//! Per-client, per-category admission control middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, Request},
    middleware::Next,
    response::Response,
};

use crate::observability::metrics;
use crate::security::classifier::{classify, Classification};
use crate::security::client_ip::resolve_client_ip;
use crate::security::rejection::{reject, RejectionContext};
use crate::security::window::{Decision, RequestKey, WindowStore};

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not covered by any policy.
    Bypass,
    Admitted(Classification),
    Rejected {
        client: String,
        classification: Classification,
    },
}

/// Shared admission controller state.
#[derive(Debug, Default)]
pub struct AdmissionControl {
    store: Arc<WindowStore>,
}

impl AdmissionControl {
    pub fn new(store: Arc<WindowStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }

    /// Resolve, classify, and count a request.
    pub fn evaluate(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        remote: Option<SocketAddr>,
    ) -> Admission {
        let Some(classification) = classify(path, method) else {
            return Admission::Bypass;
        };

        let client = resolve_client_ip(headers, remote);
        let key = RequestKey::new(client, classification.category);
        let decision = self
            .store
            .check_and_record(&key, classification.policy.max_requests);
        metrics::record_decision(classification.category, decision);

        match decision {
            Decision::Admit => Admission::Admitted(classification),
            Decision::Reject => Admission::Rejected {
                client: key.client,
                classification,
            },
        }
    }
}

/// Middleware function for admission control.
pub async fn admission_middleware(
    State(control): State<Arc<AdmissionControl>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let admission = control.evaluate(
        request.method(),
        request.uri().path(),
        request.headers(),
        remote,
    );

    match admission {
        Admission::Bypass | Admission::Admitted(_) => next.run(request).await,
        Admission::Rejected {
            client,
            classification,
        } => {
            tracing::warn!(
                client = %client,
                method = %request.method(),
                path = %request.uri().path(),
                category = %classification.category,
                "Rate limit exceeded"
            );
            reject(&RejectionContext {
                client: &client,
                path: request.uri().path(),
                max_requests: classification.policy.max_requests,
                window: classification.policy.window,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderValue, StatusCode},
        middleware, Router,
    };
    use tower::ServiceExt;

    use crate::security::classifier::Category;

    fn app(control: Arc<AdmissionControl>) -> Router {
        Router::new()
            .fallback(|| async { "ok" })
            .layer(middleware::from_fn_with_state(control, admission_middleware))
    }

    fn request(method: Method, path: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_evaluate_bypass() {
        let control = AdmissionControl::default();
        let outcome = control.evaluate(&Method::GET, "/static/logo.png", &HeaderMap::new(), None);
        assert_eq!(outcome, Admission::Bypass);
        assert!(control.store().is_empty());
    }

    #[test]
    fn test_evaluate_keys_by_client_and_category() {
        let control = AdmissionControl::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("5.6.7.8"));

        let outcome = control.evaluate(&Method::POST, "/api/auth/login", &headers, None);
        assert!(matches!(outcome, Admission::Admitted(c) if c.category == Category::Auth));
        assert!(control
            .store()
            .contains(&RequestKey::new("5.6.7.8", Category::Auth)));
    }

    #[tokio::test]
    async fn test_middleware_rejects_after_quota() {
        let control = Arc::new(AdmissionControl::default());
        let app = app(control);

        for _ in 0..10 {
            let res = app
                .clone()
                .oneshot(request(Method::POST, "/api/auth/login", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/login", "1.2.3.4"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()["retry-after"], "60");

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["retryAfter"], 60);
        assert_eq!(json["error"], "Too Many Requests");

        // Another client is unaffected.
        let res = app
            .oneshot(request(Method::POST, "/api/auth/login", "4.3.2.1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unclassified_paths_never_throttled() {
        let control = Arc::new(AdmissionControl::default());
        let app = app(control.clone());

        for _ in 0..500 {
            let res = app
                .clone()
                .oneshot(request(Method::GET, "/assets/app.css", "1.2.3.4"))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        assert!(control.store().is_empty());
    }

    #[tokio::test]
    async fn test_peer_address_used_without_headers() {
        let control = Arc::new(AdmissionControl::default());
        let app = app(control.clone());

        let mut req = Request::builder()
            .uri("/api/levels")
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "10.1.1.1:4000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(control
            .store()
            .contains(&RequestKey::new("10.1.1.1", Category::Read)));
    }
}
