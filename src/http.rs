//! HTTP 路由装配、访问日志与安全头。

use axum::body::Body as AxumBody;
use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware, response::Response};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::files;
use crate::transfer::FileService;

/// 构建应用路由。`upload_max_size` 为 0 时不限制请求体大小。
pub fn build_router(service: Arc<FileService>, upload_max_size: u64) -> Router {
    let body_limit = match usize::try_from(upload_max_size) {
        Ok(0) => DefaultBodyLimit::disable(),
        Ok(limit) => DefaultBodyLimit::max(limit),
        Err(_) => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(files::index))
        .route("/files", get(files::list_files))
        .route("/api/files", get(files::list_files_json))
        .route("/api/status", get(files::status))
        .route("/upload", post(files::upload_file).layer(body_limit))
        .route("/download/{file_name}", get(files::download_file))
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(service))
}

/// 综合 `x-forwarded-for` 与连接信息计算客户端 IP。
pub fn resolve_client_ip(headers: &HeaderMap, connect_ip: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|value| value.parse::<IpAddr>().ok())
        .or(connect_ip)
}

/// 添加基础安全响应头。
pub async fn add_security_headers(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}
