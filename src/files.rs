//! 文件列表、上传与下载的 HTTP 处理器。

use axum::body::Body as AxumBody;
use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, Multipart, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Json as JsonResponse, Redirect, Response};
use chrono::SecondsFormat;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::registry::FileMetadata;
use crate::transfer::FileService;
use crate::view::render_file_list;

pub const UPLOAD_FIELD: &str = "file";
pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    name: String,
    uploaded_at: String,
}

impl From<FileMetadata> for FileEntry {
    fn from(metadata: FileMetadata) -> Self {
        Self {
            uploaded_at: metadata
                .uploaded_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            name: metadata.name,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    version: &'static str,
    build_time: &'static str,
    build_env: String,
    storage_root: String,
    tracked_files: usize,
}

pub async fn index() -> Redirect {
    Redirect::to("/files")
}

/// 渲染文件列表页面。
pub async fn list_files(Extension(service): Extension<Arc<FileService>>) -> Html<String> {
    let files = service.list_files().await;
    debug!(count = files.len(), "list files");
    Html(render_file_list(&files))
}

/// 以 JSON 返回文件列表。
pub async fn list_files_json(
    Extension(service): Extension<Arc<FileService>>,
) -> JsonResponse<Vec<FileEntry>> {
    let files = service.list_files().await;
    debug!(count = files.len(), "list files");
    JsonResponse(files.into_iter().map(FileEntry::from).collect())
}

/// 接收 multipart 表单中的 `file` 字段并保存。
pub async fn upload_file(
    Extension(service): Extension<Arc<FileService>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("file name is required".into()))?;
        let contents = field.bytes().await.map_err(multipart_error)?;
        service.upload(&name, &contents).await?;
        return Ok((StatusCode::OK, UPLOAD_SUCCESS_MESSAGE).into_response());
    }
    Err(ApiError::BadRequest(format!(
        "multipart field `{UPLOAD_FIELD}` is required"
    )))
}

/// 下载文件，附带 attachment 与禁止缓存的响应头。
pub async fn download_file(
    Path(file_name): Path<String>,
    Extension(service): Extension<Arc<FileService>>,
) -> Result<Response, ApiError> {
    let download = service.download(&file_name).await?;
    let headers = attachment_headers(&download.name, download.length)?;
    info!(name = download.name, size = download.length, "download file");
    let stream = ReaderStream::new(download.file);
    Ok((StatusCode::OK, headers, AxumBody::from_stream(stream)).into_response())
}

/// 返回版本与存储状态。
pub async fn status(Extension(service): Extension<Arc<FileService>>) -> JsonResponse<StatusInfo> {
    JsonResponse(StatusInfo {
        version: crate::build::PKG_VERSION,
        build_time: crate::build::BUILD_TIME,
        build_env: format!(
            "{},{}",
            crate::build::RUST_VERSION,
            crate::build::RUST_CHANNEL
        ),
        storage_root: service.storage().root_path().display().to_string(),
        tracked_files: service.registry().len().await,
    })
}

/// `Content-Disposition` value carrying the percent-encoded name in both the
/// plain and the RFC 5987 parameter.
pub fn content_disposition(file_name: &str) -> String {
    let encoded = urlencoding::encode(file_name);
    format!("attachment; filename=\"{encoded}\"; filename*=UTF-8''{encoded}")
}

fn attachment_headers(file_name: &str, length: u64) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(file_name))
            .map_err(|_| ApiError::Internal("响应头构建失败".into()))?,
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache,no-store,must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(headers)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
