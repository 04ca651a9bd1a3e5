use crate::error::{AppError, AppResult};
use crate::handlers::double_option;
use crate::middleware::auth::AuthContext;
use crate::models::{MenuModel, MenuType};
use crate::response::ApiResponse;
use crate::services::cache::CacheService;
use crate::services::menu::{MenuChanges, MenuService, NavBoard, NavNode, NewMenu};
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMenuRequest {
    /// Parent menu, omitted for a top-level entry
    pub parent_id: Option<i32>,
    /// Menu label (1-100 characters)
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub menu_type: MenuType,
    /// Required for `board` menus
    pub board_id: Option<i32>,
    /// Required for `external` menus
    #[validate(length(max = 500), url)]
    pub external_url: Option<String>,
    /// Initial HTML for `html` menus
    pub content: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateMenuRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub menu_type: Option<MenuType>,
    pub board_id: Option<i32>,
    #[validate(length(max = 500), url)]
    pub external_url: Option<String>,
    pub display_order: Option<i32>,
    pub is_visible: Option<bool>,
    /// Absent keeps the parent, `null` moves the menu to the top level
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub parent_id: Option<Option<i32>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MenuContentRequest {
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MenuResponse {
    pub id: i32,
    pub parent_id: Option<i32>,
    pub name: String,
    pub menu_type: MenuType,
    pub board_id: Option<i32>,
    pub external_url: Option<String>,
    pub display_order: i32,
    pub depth: i32,
    pub is_visible: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MenuModel> for MenuResponse {
    fn from(m: MenuModel) -> Self {
        Self {
            id: m.id,
            parent_id: m.parent_id,
            name: m.name,
            menu_type: m.menu_type,
            board_id: m.board_id,
            external_url: m.external_url,
            display_order: m.display_order,
            depth: m.depth,
            is_visible: m.is_visible,
            created_at: m.created_at.to_string(),
            updated_at: m.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Breadcrumb {
    pub id: i32,
    pub name: String,
}

/// Public node view; only the field matching `menu_type` is filled in.
#[derive(Debug, Serialize, ToSchema)]
pub struct MenuDetailResponse {
    pub id: i32,
    pub name: String,
    pub menu_type: MenuType,
    pub depth: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<NavBoard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Raw HTML of an `html` menu
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Root first, this menu last
    pub path: Vec<Breadcrumb>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminMenusQuery {
    pub depth: Option<i32>,
    pub menu_type: Option<MenuType>,
}

fn make_menu_service(db: DatabaseConnection, cache: Option<CacheService>) -> MenuService {
    let service = MenuService::new(db);
    match cache {
        Some(c) => service.with_cache(c),
        None => service,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/menus",
    responses(
        (status = 200, description = "Visible navigation tree", body = Vec<NavNode>),
    ),
    tag = "menus"
)]
pub async fn navigation(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
) -> AppResult<impl IntoResponse> {
    let service = make_menu_service(db, cache.map(|c| c.0));
    Ok(ApiResponse::ok(service.navigation().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/menus/{id}",
    params(("id" = i32, Path, description = "Menu ID")),
    responses(
        (status = 200, description = "Menu with breadcrumb path", body = MenuDetailResponse),
        (status = 404, description = "Menu not found or hidden", body = AppError),
    ),
    tag = "menus"
)]
pub async fn get_menu(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let detail = MenuService::new(db).detail(id).await?;
    let menu = detail.menu;

    let url = match menu.menu_type {
        MenuType::External => menu.external_url,
        _ => None,
    };

    Ok(ApiResponse::ok(MenuDetailResponse {
        id: menu.id,
        name: menu.name,
        menu_type: menu.menu_type,
        depth: menu.depth,
        board: detail.board,
        url,
        content: detail.content,
        path: detail
            .path
            .into_iter()
            .map(|m| Breadcrumb {
                id: m.id,
                name: m.name,
            })
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/menus",
    security(("jwt_token" = [])),
    params(
        ("depth" = Option<i32>, Query, description = "Only visible menus at this depth"),
        ("menu_type" = Option<MenuType>, Query, description = "Only visible menus of this type"),
    ),
    responses(
        (status = 200, description = "Flat menu list, hidden ones included unless filtered", body = Vec<MenuResponse>),
    ),
    tag = "admin"
)]
pub async fn admin_list_menus(
    Extension(db): Extension<DatabaseConnection>,
    _auth: AuthContext,
    Query(params): Query<AdminMenusQuery>,
) -> AppResult<impl IntoResponse> {
    let service = MenuService::new(db);
    let menus = match (params.depth, params.menu_type) {
        (Some(depth), _) => service.by_depth(depth).await?,
        (None, Some(menu_type)) => service.by_type(menu_type).await?,
        (None, None) => service.list_all().await?,
    };
    let response: Vec<MenuResponse> = menus.into_iter().map(MenuResponse::from).collect();
    Ok(ApiResponse::ok(response))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/menus",
    security(("jwt_token" = [])),
    request_body = CreateMenuRequest,
    responses(
        (status = 200, description = "Menu created", body = MenuResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Parent or board not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_menu(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Json(payload): Json<CreateMenuRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let service = make_menu_service(db, cache.map(|c| c.0));
    let menu = service
        .create(NewMenu {
            parent_id: payload.parent_id,
            name: payload.name,
            menu_type: payload.menu_type,
            board_id: payload.board_id,
            external_url: payload.external_url,
            content: payload.content,
            display_order: payload.display_order,
            is_visible: payload.is_visible,
        })
        .await?;

    Ok(ApiResponse::ok(MenuResponse::from(menu)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/menus/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Menu ID")),
    request_body = UpdateMenuRequest,
    responses(
        (status = 200, description = "Menu updated; moving it re-levels the whole subtree", body = MenuResponse),
        (status = 400, description = "Validation error or the move would create a cycle", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Menu, parent or board not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_menu(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateMenuRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    auth.require_editor()?;

    let service = make_menu_service(db, cache.map(|c| c.0));
    let menu = service
        .update(
            id,
            MenuChanges {
                name: payload.name,
                menu_type: payload.menu_type,
                board_id: payload.board_id,
                external_url: payload.external_url,
                display_order: payload.display_order,
                is_visible: payload.is_visible,
                parent_id: payload.parent_id,
            },
        )
        .await?;

    Ok(ApiResponse::ok(MenuResponse::from(menu)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/menus/{id}/content",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Menu ID")),
    request_body = MenuContentRequest,
    responses(
        (status = 200, description = "HTML content saved"),
        (status = 400, description = "Menu is not an html menu", body = AppError),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Menu not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn set_menu_content(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(payload): Json<MenuContentRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    let service = make_menu_service(db, cache.map(|c| c.0));
    service.set_content(id, payload.content).await?;
    Ok(ApiResponse::with_message((), "Content saved".to_string()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/menus/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Menu ID")),
    responses(
        (status = 200, description = "Menu and its whole subtree deleted"),
        (status = 403, description = "Editors only", body = AppError),
        (status = 404, description = "Menu not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_menu(
    Extension(db): Extension<DatabaseConnection>,
    cache: Option<Extension<CacheService>>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth.require_editor()?;
    let service = make_menu_service(db, cache.map(|c| c.0));
    service.delete(id).await?;
    Ok(ApiResponse::with_message((), "Menu deleted".to_string()))
}
