use crate::config::upload::UploadConfig;
use crate::error::AppResult;
use crate::handlers::board::BoardResponse;
use crate::handlers::post::PostSummary;
use crate::middleware::auth::AuthContext;
use crate::response::ApiResponse;
use crate::services::admin::AdminService;
use axum::{response::IntoResponse, Extension};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardStats {
    pub board: BoardResponse,
    pub published_posts: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentPostEntry {
    pub post: PostSummary,
    pub board_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    /// Visible boards with their published post counts
    pub boards: Vec<BoardStats>,
    pub total_posts: u64,
    pub visible_boards: u64,
    pub total_attachments: u64,
    /// Bytes on disk across all attachments
    pub total_attachment_bytes: i64,
    pub total_menus: u64,
    pub recent_posts: Vec<RecentPostEntry>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardResponse),
        (status = 401, description = "Not signed in", body = crate::error::AppError),
    ),
    tag = "admin"
)]
pub async fn get_stats(
    Extension(db): Extension<DatabaseConnection>,
    Extension(upload): Extension<UploadConfig>,
    _auth: AuthContext,
) -> AppResult<impl IntoResponse> {
    let stats = AdminService::new(db, upload).dashboard().await?;

    Ok(ApiResponse::ok(DashboardResponse {
        boards: stats
            .boards
            .into_iter()
            .map(|b| BoardStats {
                board: BoardResponse::from(b.board),
                published_posts: b.published_posts,
            })
            .collect(),
        total_posts: stats.total_posts,
        visible_boards: stats.visible_boards,
        total_attachments: stats.total_attachments,
        total_attachment_bytes: stats.total_attachment_bytes,
        total_menus: stats.total_menus,
        recent_posts: stats
            .recent_posts
            .into_iter()
            .map(|r| RecentPostEntry {
                post: PostSummary::from(r.post),
                board_name: r.board_name,
            })
            .collect(),
    }))
}
