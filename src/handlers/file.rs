use crate::config::upload::UploadConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthContext;
use crate::models::{AttachmentModel, FileType};
use crate::response::ApiResponse;
use crate::services::attachment::{AttachmentService, IncomingFile, ServedFile};
use crate::services::board::BoardScope;
use axum::{
    extract::{Multipart, Path, Query},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const DEFAULT_LIST_LIMIT: u64 = 20;
const MAX_LIST_LIMIT: u64 = 100;

#[derive(Debug, Serialize, ToSchema)]
pub struct AttachmentResponse {
    pub id: i32,
    pub post_id: i32,
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_type: FileType,
    pub image_width: Option<i32>,
    pub image_height: Option<i32>,
    pub download_count: i32,
    pub display_order: i32,
    /// Download URL
    pub url: String,
    pub created_at: String,
}

impl From<AttachmentModel> for AttachmentResponse {
    fn from(a: AttachmentModel) -> Self {
        Self {
            url: format!("/api/v1/files/{}", a.id),
            id: a.id,
            post_id: a.post_id,
            original_name: a.original_name,
            file_size: a.file_size,
            mime_type: a.mime_type,
            file_type: a.file_type,
            image_width: a.image_width,
            image_height: a.image_height,
            download_count: a.download_count,
            display_order: a.display_order,
            created_at: a.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FailedUploadResponse {
    pub original_name: String,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub uploaded: Vec<AttachmentResponse>,
    /// Files skipped in a multi-file upload
    pub failed: Vec<FailedUploadResponse>,
}

/// `filename="..."` needs ASCII; the real name goes into `filename*`.
fn content_disposition(served: &ServedFile) -> String {
    let fallback: String = served
        .file_name
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        served.disposition.as_str(),
        fallback,
        urlencoding::encode(&served.file_name)
    )
}

fn file_response(served: ServedFile) -> Response {
    let disposition = content_disposition(&served);
    (
        [
            (header::CONTENT_TYPE, served.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, served.data.len().to_string()),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000".to_string(),
            ),
            (
                header::HeaderName::from_static("cross-origin-resource-policy"),
                "cross-origin".to_string(),
            ),
        ],
        served.data,
    )
        .into_response()
}

/// Editors can fetch any file, including drafts and hidden boards.
fn reader_scope(auth: Option<&AuthContext>) -> BoardScope {
    match auth {
        Some(auth) if auth.can_edit() => BoardScope::All,
        other => super::visitor_scope(other),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/upload",
    security(("jwt_token" = [])),
    request_body(content_type = "multipart/form-data", description = "Text field `post_id` plus one or more file fields"),
    responses(
        (status = 200, description = "Stored attachments; with several files, the ones that failed", body = UploadResponse),
        (status = 400, description = "Too large, disallowed type or name too long", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "files"
)]
pub async fn upload(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;

    let mut post_id: Option<i32> = None;
    let mut files: Vec<IncomingFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(original_name) => {
                let incoming = match field.bytes().await {
                    Ok(data) => IncomingFile::new(original_name, data.to_vec()),
                    Err(e) => IncomingFile::failed(original_name, e.to_string()),
                };
                files.push(incoming);
            }
            None if name == "post_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read post_id: {}", e)))?;
                let parsed = raw
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| AppError::Validation("post_id must be an integer".to_string()))?;
                post_id = Some(parsed);
            }
            None => {}
        }
    }

    let post_id = post_id.ok_or_else(|| AppError::Validation("post_id is required".to_string()))?;
    let service = AttachmentService::new(db, &config);

    let response = match files.len() {
        0 => return Err(AppError::Validation("No file provided".to_string())),
        1 => {
            let file = files.remove(0);
            let saved = service.upload(post_id, file).await?;
            UploadResponse {
                uploaded: vec![AttachmentResponse::from(saved)],
                failed: Vec::new(),
            }
        }
        _ => {
            let batch = service.upload_many(post_id, files).await?;
            UploadResponse {
                uploaded: batch
                    .uploaded
                    .into_iter()
                    .map(AttachmentResponse::from)
                    .collect(),
                failed: batch
                    .failed
                    .into_iter()
                    .map(|f| FailedUploadResponse {
                        original_name: f.original_name,
                        reason: f.reason,
                    })
                    .collect(),
            }
        }
    };

    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/attachments/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Attachment ID")),
    responses(
        (status = 200, description = "Attachment and its file deleted"),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Attachment not found", body = AppError),
    ),
    tag = "files"
)]
pub async fn delete_attachment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    AttachmentService::new(db, &config).delete(id).await?;
    Ok(ApiResponse::with_message((), "Attachment deleted".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    params(("id" = i32, Path, description = "Attachment ID")),
    responses(
        (status = 200, description = "File bytes; images inline, everything else as a download"),
        (status = 401, description = "Board requires sign-in", body = AppError),
        (status = 404, description = "Attachment or file missing", body = AppError),
    ),
    tag = "files"
)]
pub async fn serve_file(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth: Option<AuthContext>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let served = AttachmentService::new(db, &config)
        .serve(id, reader_scope(auth.as_ref()))
        .await?;
    Ok(file_response(served))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/path/{path}",
    params(("path" = String, Path, description = "Path relative to the upload root, e.g. 2025/05/<name>.jpg")),
    responses(
        (status = 200, description = "File bytes"),
        (status = 400, description = "Empty path", body = AppError),
        (status = 401, description = "Board requires sign-in", body = AppError),
        (status = 404, description = "No such file", body = AppError),
    ),
    tag = "files"
)]
pub async fn serve_by_path(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth: Option<AuthContext>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let served = AttachmentService::new(db, &config)
        .serve_by_relative_path(&path, reader_scope(auth.as_ref()))
        .await?;
    Ok(file_response(served))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachmentListQuery {
    pub file_type: Option<FileType>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/attachments",
    security(("jwt_token" = [])),
    params(
        ("file_type" = Option<FileType>, Query, description = "image, document, video, audio or other; omit for most downloaded"),
        ("limit" = Option<u64>, Query, description = "Number of rows (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Newest attachments of a type, or the most downloaded overall", body = Vec<AttachmentResponse>),
    ),
    tag = "files"
)]
pub async fn list_attachments(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    _auth: AuthContext,
    Query(params): Query<AttachmentListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let service = AttachmentService::new(db, &config);
    let attachments = match params.file_type {
        Some(file_type) => service.list_by_type(file_type, limit).await?,
        None => service.most_downloaded(limit).await?,
    };
    let response: Vec<AttachmentResponse> = attachments
        .into_iter()
        .map(AttachmentResponse::from)
        .collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/posts/{id}/attachments",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Attachments in display order", body = Vec<AttachmentResponse>),
    ),
    tag = "files"
)]
pub async fn list_post_attachments(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    _auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let attachments = AttachmentService::new(db, &config).list_by_post(id).await?;
    let response: Vec<AttachmentResponse> = attachments
        .into_iter()
        .map(AttachmentResponse::from)
        .collect();
    Ok(ApiResponse::ok(response))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DisplayOrderRequest {
    pub display_order: i32,
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/attachments/{id}/order",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Attachment ID")),
    request_body = DisplayOrderRequest,
    responses(
        (status = 200, description = "Display order changed", body = AttachmentResponse),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Attachment not found", body = AppError),
    ),
    tag = "files"
)]
pub async fn set_attachment_order(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(payload): Json<DisplayOrderRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    let updated = AttachmentService::new(db, &config)
        .set_display_order(id, payload.display_order)
        .await?;
    Ok(ApiResponse::ok(AttachmentResponse::from(updated)))
}
