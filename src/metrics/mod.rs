//! HTTP request metrics.
//!
//! Counters and histograms go through the `metrics` facade; the binary decides
//! whether a recorder is installed. Without one the macros are no-ops.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use std::time::Instant;

/// Label for requests that matched no route, so unknown paths do not explode cardinality
const UNMATCHED_ROUTE: &str = "unmatched";

pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds` per route template.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    counter!(
        "http_requests_total",
        1,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status_class(status)
    );
    histogram!(
        "http_request_duration_seconds",
        started.elapsed().as_secs_f64(),
        "method" => method,
        "route" => route
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn status_codes_bucket_by_class() {
        assert_eq!(status_class(201), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }

    #[tokio::test]
    async fn middleware_passes_responses_through() {
        let app = Router::new()
            .route("/ping", get(|| async { StatusCode::ACCEPTED }))
            .layer(axum::middleware::from_fn(http_metrics_middleware));
        let response = app
            .oneshot(axum::http::Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
