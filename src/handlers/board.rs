use crate::error::{AppError, AppResult};
use crate::handlers::post::PostSummary;
use crate::handlers::menu::MenuResponse;
use crate::middleware::auth::AuthContext;
use crate::models::{BoardModel, BoardType};
use crate::response::{clamp_page, page_count, ApiResponse};
use crate::services::board::{BoardChanges, BoardService, NewBoard};
use crate::services::cache::CacheService;
use crate::services::menu::MenuService;
use crate::services::post::{resolve_per_page, PostService};
use crate::services::storage::FileStore;
use crate::config::upload::UploadConfig;
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

fn validate_board_code(code: &str) -> Result<(), ValidationError> {
    let ok = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("board_code"))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBoardRequest {
    /// Unique code used in URLs (1-50 characters: letters, digits, `_`, `-`)
    #[validate(length(min = 1, max = 50), custom(function = "validate_board_code"))]
    pub code: String,
    /// Display name (1-100 characters)
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub board_type: BoardType,
    pub description: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    /// 1-100, defaults to 20
    #[validate(range(min = 1, max = 100))]
    pub posts_per_page: Option<i32>,
    pub allow_attachment: Option<bool>,
    pub require_auth: Option<bool>,
}

/// Every field optional. The code cannot be changed.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBoardRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub board_type: Option<BoardType>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    #[validate(range(min = 1, max = 100))]
    pub posts_per_page: Option<i32>,
    pub allow_attachment: Option<bool>,
    pub require_auth: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardResponse {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub board_type: BoardType,
    pub description: Option<String>,
    pub display_order: i32,
    pub is_visible: bool,
    pub posts_per_page: i32,
    pub allow_attachment: bool,
    pub require_auth: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<BoardModel> for BoardResponse {
    fn from(b: BoardModel) -> Self {
        Self {
            id: b.id,
            code: b.code,
            name: b.name,
            board_type: b.board_type,
            description: b.description,
            display_order: b.display_order,
            is_visible: b.is_visible,
            posts_per_page: b.posts_per_page,
            allow_attachment: b.allow_attachment,
            require_auth: b.require_auth,
            created_at: b.created_at.to_string(),
            updated_at: b.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BoardPostsQuery {
    /// 1-based page, defaults to 1
    pub page: Option<u64>,
    /// Defaults to the board's own page size
    pub per_page: Option<u64>,
    /// Case-insensitive search over title, content and author
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardPostsResponse {
    pub board: BoardResponse,
    /// Every published notice, independent of the page. Empty for searches.
    pub notices: Vec<PostSummary>,
    pub posts: Vec<PostSummary>,
    pub total: u64,
    pub pages: u64,
    pub page: u64,
    pub per_page: u64,
    pub keyword: Option<String>,
}

fn make_board_service(db: DatabaseConnection, cache: Option<CacheService>) -> BoardService {
    let service = BoardService::new(db);
    match cache {
        Some(c) => service.with_cache(c),
        None => service,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/boards",
    responses(
        (status = 200, description = "Visible boards in display order", body = Vec<BoardResponse>),
    ),
    tag = "boards"
)]
pub async fn list_boards(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
) -> AppResult<impl IntoResponse> {
    let service = make_board_service(db, cache.map(|c| c.0));
    let boards = service.list_visible().await?;
    let response: Vec<BoardResponse> = boards.into_iter().map(BoardResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/boards/{code}",
    params(("code" = String, Path, description = "Board code")),
    responses(
        (status = 200, description = "Board details", body = BoardResponse),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "boards"
)]
pub async fn get_board(
    Extension(db): Extension<DatabaseConnection>,
    auth: Option<AuthContext>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let board = BoardService::new(db).get_by_code(&code).await?;
    super::visitor_scope(auth.as_ref()).check(&board)?;
    Ok(ApiResponse::ok(BoardResponse::from(board)))
}

#[utoipa::path(
    get,
    path = "/api/v1/boards/{code}/posts",
    params(
        ("code" = String, Path, description = "Board code"),
        ("page" = Option<u64>, Query, description = "Page number"),
        ("per_page" = Option<u64>, Query, description = "Items per page, defaults to the board setting"),
        ("keyword" = Option<String>, Query, description = "Search title, content and author"),
    ),
    responses(
        (status = 200, description = "Notices plus one page of posts", body = BoardPostsResponse),
        (status = 401, description = "Board requires sign-in", body = AppError),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "boards"
)]
pub async fn list_board_posts(
    Extension(db): Extension<DatabaseConnection>,
    auth: Option<AuthContext>,
    Path(code): Path<String>,
    Query(query): Query<BoardPostsQuery>,
) -> AppResult<impl IntoResponse> {
    let board = BoardService::new(db.clone()).get_by_code(&code).await?;
    super::visitor_scope(auth.as_ref()).check(&board)?;

    let service = PostService::new(db);
    let page = query.page.unwrap_or(1);
    let keyword = query
        .keyword
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    let response = match keyword {
        Some(keyword) => {
            let per_page = resolve_per_page(&board, query.per_page);
            let page = clamp_page(page, per_page);
            let (posts, total) = service.search(&board, &keyword, page, per_page).await?;
            BoardPostsResponse {
                board: BoardResponse::from(board),
                notices: Vec::new(),
                posts: posts.into_iter().map(PostSummary::from).collect(),
                total,
                pages: page_count(total, per_page),
                page,
                per_page,
                keyword: Some(keyword),
            }
        }
        None => {
            let listing = service.list_by_board(&board, page, query.per_page).await?;
            BoardPostsResponse {
                board: BoardResponse::from(board),
                notices: listing.notices.into_iter().map(PostSummary::from).collect(),
                posts: listing.posts.into_iter().map(PostSummary::from).collect(),
                total: listing.total,
                pages: listing.pages,
                page: listing.page,
                per_page: listing.per_page,
                keyword: None,
            }
        }
    };

    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/boards/{code}/menu",
    params(("code" = String, Path, description = "Board code")),
    responses(
        (status = 200, description = "First visible menu that opens this board, or null", body = Option<MenuResponse>),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "boards"
)]
pub async fn get_board_menu(
    Extension(db): Extension<DatabaseConnection>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let board = BoardService::new(db.clone()).get_by_code(&code).await?;
    let menu = MenuService::new(db).by_board(board.id).await?;
    Ok(ApiResponse::ok(menu.map(MenuResponse::from)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminBoardsQuery {
    /// Only visible boards of this type
    pub board_type: Option<BoardType>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/boards",
    security(("jwt_token" = [])),
    params(("board_type" = Option<BoardType>, Query, description = "Only visible boards of this type")),
    responses(
        (status = 200, description = "All boards including hidden ones", body = Vec<BoardResponse>),
        (status = 401, description = "Not signed in", body = AppError),
    ),
    tag = "admin"
)]
pub async fn admin_list_boards(
    Extension(db): Extension<DatabaseConnection>,
    _auth: AuthContext,
    Query(query): Query<AdminBoardsQuery>,
) -> AppResult<impl IntoResponse> {
    let service = BoardService::new(db);
    let boards = match query.board_type {
        Some(board_type) => service.list_by_type(board_type).await?,
        None => service.list_all().await?,
    };
    let response: Vec<BoardResponse> = boards.into_iter().map(BoardResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/boards",
    security(("jwt_token" = [])),
    request_body = CreateBoardRequest,
    responses(
        (status = 200, description = "Board created", body = BoardResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 409, description = "Code already taken", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_board(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Json(payload): Json<CreateBoardRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let service = make_board_service(db, cache.map(|c| c.0));
    let board = service
        .create(NewBoard {
            code: payload.code,
            name: payload.name,
            board_type: payload.board_type,
            description: payload.description,
            display_order: payload.display_order,
            is_visible: payload.is_visible,
            posts_per_page: payload.posts_per_page,
            allow_attachment: payload.allow_attachment,
            require_auth: payload.require_auth,
        })
        .await?;

    Ok(ApiResponse::ok(BoardResponse::from(board)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/boards/{code}",
    security(("jwt_token" = [])),
    params(("code" = String, Path, description = "Board code")),
    request_body = UpdateBoardRequest,
    responses(
        (status = 200, description = "Board updated", body = BoardResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_board(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Path(code): Path<String>,
    Json(payload): Json<UpdateBoardRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let service = make_board_service(db, cache.map(|c| c.0));
    let board = service
        .update(
            &code,
            BoardChanges {
                name: payload.name,
                board_type: payload.board_type,
                description: payload.description,
                display_order: payload.display_order,
                is_visible: payload.is_visible,
                posts_per_page: payload.posts_per_page,
                allow_attachment: payload.allow_attachment,
                require_auth: payload.require_auth,
            },
        )
        .await?;

    Ok(ApiResponse::ok(BoardResponse::from(board)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/boards/{code}",
    security(("jwt_token" = [])),
    params(("code" = String, Path, description = "Board code")),
    responses(
        (status = 200, description = "Board, its posts and their files deleted"),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Board not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_board(
    Extension(db): Extension<DatabaseConnection>,
    Extension(upload): Extension<UploadConfig>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;

    let service = make_board_service(db, cache.map(|c| c.0));
    service
        .delete(&code, &FileStore::new(upload.upload_dir))
        .await?;

    Ok(ApiResponse::with_message((), "Board deleted".to_string()))
}
