//! Per-request correlation ids, threaded through `tracing` spans and
//! returned to the caller as `X-Request-Id`.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

const HEADER_NAME: &str = "x-request-id";

/// The request id extracted from (or generated for) the current request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Middleware that assigns a request id (reusing an inbound `X-Request-Id`
/// header if present), stores it as a request extension, and mirrors it
/// onto the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let id = req
        .headers()
        .get(HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let span = tracing::info_span!("request", request_id = %id);
    let _guard = span.enter();

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(HEADER_NAME, value);
    }
    response
}

/// Plugin wrapper installing [`request_id_middleware`] on every route.
pub struct RequestIdPlugin;

impl crate::plugin::Plugin for RequestIdPlugin {
    fn install<T: Clone + Send + Sync + 'static>(
        self,
        app: crate::builder::AppBuilder<T>,
    ) -> crate::builder::AppBuilder<T> {
        app.with_layer_fn(|router| router.layer(axum::middleware::from_fn(request_id_middleware)))
    }
}
