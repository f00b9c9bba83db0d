use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};

const MAX_LOGGED_BODY: usize = 4096;

/// 记录 5xx 响应的请求路径和响应体，响应体原样返回
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("{} {} failed, unreadable body: {}", method, uri, e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    // 日志中只保留前一段
    let logged = &bytes[..bytes.len().min(MAX_LOGGED_BODY)];
    tracing::error!(
        "{} {} failed - Status: {}, Body: {}{}",
        method,
        uri,
        parts.status,
        String::from_utf8_lossy(logged),
        if bytes.len() > MAX_LOGGED_BODY { "..." } else { "" }
    );

    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app(body_len: usize) -> Router {
        Router::new()
            .route(
                "/boom",
                get(move || async move { (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(body_len)) }),
            )
            .layer(axum::middleware::from_fn(log_errors))
    }

    async fn call(app: Router) -> (StatusCode, usize) {
        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.len())
    }

    #[tokio::test]
    async fn small_error_body_passes_through() {
        assert_eq!(call(app(10)).await, (StatusCode::INTERNAL_SERVER_ERROR, 10));
    }

    #[tokio::test]
    async fn large_error_body_is_not_dropped() {
        let len = MAX_LOGGED_BODY * 3;
        assert_eq!(call(app(len)).await, (StatusCode::INTERNAL_SERVER_ERROR, len));
    }
}
