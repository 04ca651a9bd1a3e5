use crate::config::upload::UploadConfig;
use crate::error::{AppError, AppResult};
use crate::handlers::file::AttachmentResponse;
use crate::middleware::auth::AuthContext;
use crate::models::{BoardModel, PostModel};
use crate::response::{clamp_page, ApiResponse, PaginatedResponse, PaginationQuery};
use crate::services::attachment::AttachmentService;
use crate::services::board::{BoardScope, BoardService};
use crate::services::post::{resolve_per_page, NewPost, PostChanges, PostService};
use crate::services::storage::FileStore;
use crate::utils::dates::parse_optional_datetime;
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

const DEFAULT_LIST_LIMIT: u64 = 5;
const MAX_LIST_LIMIT: u64 = 50;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePostRequest {
    /// Owning board ID
    pub board_id: i32,
    /// Post title (1-200 characters)
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// HTML body as produced by the editor
    pub content: String,
    /// Shown as the author, defaults to "관리자" (max 100 characters)
    #[validate(length(max = 100))]
    pub author_name: Option<String>,
    /// Pin above the regular listing
    pub is_notice: Option<bool>,
    /// Defaults to true
    pub is_published: Option<bool>,
    /// RFC 3339 or `YYYY-MM-DD HH:MM:SS`; defaults to now when published
    pub published_at: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub content: Option<String>,
    #[validate(length(max = 100))]
    pub author_name: Option<String>,
    pub is_notice: Option<bool>,
    pub is_published: Option<bool>,
    pub published_at: Option<String>,
}

/// Listing row, without the body.
#[derive(Debug, Serialize, ToSchema)]
pub struct PostSummary {
    pub id: i32,
    pub board_id: i32,
    pub title: String,
    pub author_name: String,
    pub view_count: i32,
    pub is_notice: bool,
    pub is_published: bool,
    pub published_at: Option<String>,
    pub created_at: String,
}

impl From<PostModel> for PostSummary {
    fn from(p: PostModel) -> Self {
        Self {
            id: p.id,
            board_id: p.board_id,
            title: p.title,
            author_name: p.author_name,
            view_count: p.view_count,
            is_notice: p.is_notice,
            is_published: p.is_published,
            published_at: p.published_at.map(|t| t.to_string()),
            created_at: p.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostResponse {
    pub id: i32,
    pub board_id: i32,
    pub title: String,
    pub content: String,
    pub author_name: String,
    pub user_id: Option<String>,
    pub view_count: i32,
    pub is_notice: bool,
    pub is_published: bool,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PostModel> for PostResponse {
    fn from(p: PostModel) -> Self {
        Self {
            id: p.id,
            board_id: p.board_id,
            title: p.title,
            content: p.content,
            author_name: p.author_name,
            user_id: p.user_id,
            view_count: p.view_count,
            is_notice: p.is_notice,
            is_published: p.is_published,
            published_at: p.published_at.map(|t| t.to_string()),
            created_at: p.created_at.to_string(),
            updated_at: p.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardRef {
    pub id: i32,
    pub code: String,
    pub name: String,
}

impl From<BoardModel> for BoardRef {
    fn from(b: BoardModel) -> Self {
        Self {
            id: b.id,
            code: b.code,
            name: b.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostLink {
    pub id: i32,
    pub title: String,
}

impl From<PostModel> for PostLink {
    fn from(p: PostModel) -> Self {
        Self {
            id: p.id,
            title: p.title,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostDetailResponse {
    pub post: PostResponse,
    pub board: BoardRef,
    pub attachments: Vec<AttachmentResponse>,
    /// Older neighbour in the same board
    pub prev: Option<PostLink>,
    /// Newer neighbour in the same board
    pub next: Option<PostLink>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostListQuery {
    pub limit: Option<u64>,
    /// Restrict to one board by code
    pub board: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post with attachments and neighbours", body = PostDetailResponse),
        (status = 401, description = "Board requires sign-in", body = AppError),
        (status = 404, description = "Post not found or unpublished", body = AppError),
    ),
    tag = "posts"
)]
pub async fn get_post(
    Extension(db): Extension<DatabaseConnection>,
    auth: Option<AuthContext>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let view = PostService::new(db)
        .view(id, super::visitor_scope(auth.as_ref()))
        .await?;

    Ok(ApiResponse::ok(PostDetailResponse {
        post: PostResponse::from(view.post),
        board: BoardRef::from(view.board),
        attachments: view
            .attachments
            .into_iter()
            .map(AttachmentResponse::from)
            .collect(),
        prev: view.adjacent.prev.map(PostLink::from),
        next: view.adjacent.next.map(PostLink::from),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/images",
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Image attachments of a published post", body = Vec<AttachmentResponse>),
        (status = 401, description = "Board requires sign-in", body = AppError),
        (status = 404, description = "Post not found or unpublished", body = AppError),
    ),
    tag = "posts"
)]
pub async fn get_post_images(
    Extension(db): Extension<DatabaseConnection>,
    Extension(upload): Extension<UploadConfig>,
    auth: Option<AuthContext>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let (post, _) = PostService::new(db.clone())
        .get_readable(id, super::visitor_scope(auth.as_ref()))
        .await?;
    let images = AttachmentService::new(db, &upload)
        .images_by_post(post.id)
        .await?;
    let response: Vec<AttachmentResponse> =
        images.into_iter().map(AttachmentResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

async fn board_filter(
    db: &DatabaseConnection,
    code: Option<&str>,
    scope: BoardScope,
) -> AppResult<Option<i32>> {
    let Some(code) = code else {
        return Ok(None);
    };
    let board = BoardService::new(db.clone()).get_by_code(code).await?;
    scope.check(&board)?;
    Ok(Some(board.id))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/recent",
    params(
        ("limit" = Option<u64>, Query, description = "Number of posts (default 5, max 50)"),
        ("board" = Option<String>, Query, description = "Board code"),
    ),
    responses(
        (status = 200, description = "Latest published posts", body = Vec<PostSummary>),
    ),
    tag = "posts"
)]
pub async fn recent_posts(
    Extension(db): Extension<DatabaseConnection>,
    auth: Option<AuthContext>,
    Query(params): Query<PostListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let scope = super::visitor_scope(auth.as_ref());
    let board_id = board_filter(&db, params.board.as_deref(), scope).await?;
    let posts = PostService::new(db).recent(limit, board_id, scope).await?;
    let response: Vec<PostSummary> = posts.into_iter().map(PostSummary::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/popular",
    params(
        ("limit" = Option<u64>, Query, description = "Number of posts (default 5, max 50)"),
        ("board" = Option<String>, Query, description = "Board code"),
    ),
    responses(
        (status = 200, description = "Most viewed published posts", body = Vec<PostSummary>),
    ),
    tag = "posts"
)]
pub async fn popular_posts(
    Extension(db): Extension<DatabaseConnection>,
    auth: Option<AuthContext>,
    Query(params): Query<PostListQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let scope = super::visitor_scope(auth.as_ref());
    let board_id = board_filter(&db, params.board.as_deref(), scope).await?;
    let posts = PostService::new(db).popular(limit, board_id, scope).await?;
    let response: Vec<PostSummary> = posts.into_iter().map(PostSummary::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/boards/{code}/posts",
    security(("jwt_token" = [])),
    params(
        ("code" = String, Path, description = "Board code"),
        ("page" = Option<u64>, Query, description = "Page number"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
    ),
    responses(
        (status = 200, description = "All posts of the board, drafts included", body = PaginatedResponse<PostSummary>),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn admin_list_posts(
    Extension(db): Extension<DatabaseConnection>,
    _auth: AuthContext,
    Path(code): Path<String>,
    Query(params): Query<PaginationQuery>,
) -> AppResult<impl IntoResponse> {
    let board = BoardService::new(db.clone()).get_by_code(&code).await?;
    let per_page = resolve_per_page(&board, params.per_page);
    let page = clamp_page(params.page.unwrap_or(1), per_page);

    let (posts, total) = PostService::new(db)
        .list_for_editor(board.id, page, per_page)
        .await?;
    let items = posts.into_iter().map(PostSummary::from).collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(
        items, total, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/posts/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post regardless of publication state", body = PostResponse),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn admin_get_post(
    Extension(db): Extension<DatabaseConnection>,
    _auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let post = PostService::new(db).find(id).await?;
    Ok(ApiResponse::ok(PostResponse::from(post)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/posts",
    security(("jwt_token" = [])),
    request_body = CreatePostRequest,
    responses(
        (status = 200, description = "Post created", body = PostResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_post(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let published_at = parse_optional_datetime(payload.published_at.as_deref())?;
    let post = PostService::new(db)
        .create(
            payload.board_id,
            NewPost {
                title: payload.title,
                content: payload.content,
                author_name: payload.author_name,
                user_id: Some(auth.user_id),
                is_notice: payload.is_notice,
                is_published: payload.is_published,
                published_at,
            },
        )
        .await?;

    Ok(ApiResponse::ok(PostResponse::from(post)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/posts/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_post(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let published_at = parse_optional_datetime(payload.published_at.as_deref())?;
    let post = PostService::new(db)
        .update(
            id,
            PostChanges {
                title: payload.title,
                content: payload.content,
                author_name: payload.author_name,
                is_notice: payload.is_notice,
                is_published: payload.is_published,
                published_at,
            },
        )
        .await?;

    Ok(ApiResponse::ok(PostResponse::from(post)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/posts/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post and its attachments deleted"),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_post(
    Extension(db): Extension<DatabaseConnection>,
    Extension(upload): Extension<UploadConfig>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    PostService::new(db)
        .delete(id, &FileStore::new(upload.upload_dir))
        .await?;
    Ok(ApiResponse::with_message((), "Post deleted".to_string()))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/posts/{id}/publish",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Publication flag flipped", body = PostResponse),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn toggle_publish(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    let post = PostService::new(db).toggle_publish(id).await?;
    Ok(ApiResponse::ok(PostResponse::from(post)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/posts/{id}/notice",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Notice flag flipped", body = PostResponse),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn toggle_notice(
    Extension(db): Extension<DatabaseConnection>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    let post = PostService::new(db).toggle_notice(id).await?;
    Ok(ApiResponse::ok(PostResponse::from(post)))
}
