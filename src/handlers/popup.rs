use crate::error::{AppError, AppResult};
use crate::handlers::double_option;
use crate::middleware::auth::AuthContext;
use crate::models::PopupModel;
use crate::response::ApiResponse;
use crate::services::popup::{NewPopup, PopupChanges, PopupService};
use crate::utils::dates::parse_optional_datetime;
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePopupRequest {
    /// Popup title (1-200 characters)
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// HTML body
    pub content: String,
    /// First moment the popup may show; omit for no lower bound
    pub start_date: Option<String>,
    /// Last moment the popup may show; omit for no upper bound
    pub end_date: Option<String>,
    /// Activating a popup deactivates every other one
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePopupRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub content: Option<String>,
    /// Absent keeps the date, `null` or `""` clears it
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub start_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub end_date: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PopupResponse {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PopupModel> for PopupResponse {
    fn from(p: PopupModel) -> Self {
        Self {
            id: p.id,
            title: p.title,
            content: p.content,
            start_date: p.start_date.map(|d| d.to_string()),
            end_date: p.end_date.map(|d| d.to_string()),
            is_active: p.is_active,
            created_at: p.created_at.to_string(),
            updated_at: p.updated_at.to_string(),
        }
    }
}

/// Outer `None` leaves the stored date untouched.
fn parse_date_change(
    raw: Option<Option<String>>,
) -> AppResult<Option<Option<chrono::NaiveDateTime>>> {
    raw.map(|value| parse_optional_datetime(value.as_deref()))
        .transpose()
}

#[utoipa::path(
    get,
    path = "/api/v1/popup/active",
    responses(
        (status = 200, description = "The popup to show now, or null", body = Option<PopupResponse>),
    ),
    tag = "popups"
)]
pub async fn active_popup(
    Extension(db): Extension<DatabaseConnection>,
) -> AppResult<impl IntoResponse> {
    let popup = PopupService::new(db).active().await?;
    Ok(ApiResponse::ok(popup.map(PopupResponse::from)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/popups",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "All popups, newest first", body = Vec<PopupResponse>),
    ),
    tag = "admin"
)]
pub async fn list_popups(
    Extension(db): Extension<DatabaseConnection>,
    _auth: AuthContext,
) -> AppResult<impl IntoResponse> {
    let popups = PopupService::new(db).list_all().await?;
    let response: Vec<PopupResponse> = popups.into_iter().map(PopupResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/popups/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Popup ID")),
    responses(
        (status = 200, description = "Popup details", body = PopupResponse),
        (status = 404, description = "Popup not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn get_popup(
    Extension(db): Extension<DatabaseConnection>,
    _auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let popup = PopupService::new(db).get_by_id(id).await?;
    Ok(ApiResponse::ok(PopupResponse::from(popup)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/popups",
    security(("jwt_token" = [])),
    request_body = CreatePopupRequest,
    responses(
        (status = 200, description = "Popup created", body = PopupResponse),
        (status = 400, description = "Validation error or malformed date", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_popup(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Json(payload): Json<CreatePopupRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let popup = PopupService::new(db)
        .create(NewPopup {
            title: payload.title,
            content: payload.content,
            start_date: parse_optional_datetime(payload.start_date.as_deref())?,
            end_date: parse_optional_datetime(payload.end_date.as_deref())?,
            is_active: payload.is_active,
        })
        .await?;

    Ok(ApiResponse::ok(PopupResponse::from(popup)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/popups/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Popup ID")),
    request_body = UpdatePopupRequest,
    responses(
        (status = 200, description = "Popup updated", body = PopupResponse),
        (status = 400, description = "Validation error or malformed date", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Popup not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_popup(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePopupRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let popup = PopupService::new(db)
        .update(
            id,
            PopupChanges {
                title: payload.title,
                content: payload.content,
                start_date: parse_date_change(payload.start_date)?,
                end_date: parse_date_change(payload.end_date)?,
                is_active: payload.is_active,
            },
        )
        .await?;

    Ok(ApiResponse::ok(PopupResponse::from(popup)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/popups/{id}/toggle",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Popup ID")),
    responses(
        (status = 200, description = "Popup switched on (others off) or off", body = PopupResponse),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Popup not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn toggle_popup(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    let popup = PopupService::new(db).toggle(id).await?;
    Ok(ApiResponse::ok(PopupResponse::from(popup)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/popups/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Popup ID")),
    responses(
        (status = 200, description = "Popup deleted"),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Popup not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_popup(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    PopupService::new(db).delete(id).await?;
    Ok(ApiResponse::with_message((), "Popup deleted".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_changes_keep_clear_or_set() {
        assert_eq!(parse_date_change(None).unwrap(), None);
        assert_eq!(parse_date_change(Some(None)).unwrap(), Some(None));
        assert_eq!(parse_date_change(Some(Some(String::new()))).unwrap(), Some(None));
        assert!(parse_date_change(Some(Some("2025-05-01".into())))
            .unwrap()
            .is_some_and(|d| d.is_some()));
        assert!(parse_date_change(Some(Some("soon".into()))).is_err());
    }
}
