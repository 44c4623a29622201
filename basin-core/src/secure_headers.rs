//! Baseline security headers applied to every response.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

async fn secure_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("no-referrer"),
    );
    response
}

/// Plugin installing a minimal set of security headers
/// (`X-Content-Type-Options`, `X-Frame-Options`, `Referrer-Policy`).
pub struct SecureHeaders;

impl crate::plugin::Plugin for SecureHeaders {
    fn install<T: Clone + Send + Sync + 'static>(
        self,
        app: crate::builder::AppBuilder<T>,
    ) -> crate::builder::AppBuilder<T> {
        app.with_layer_fn(|router| router.layer(axum::middleware::from_fn(secure_headers_middleware)))
    }
}
