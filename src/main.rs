use axum::{extract::Extension, middleware, response::IntoResponse, routing::get, Json, Router};
use church_cms::config::upload::UploadConfig;
use church_cms::services::cache::CacheService;
use church_cms::{config, migration, routes, utils};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use std::env;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        // Boards
        church_cms::handlers::board::list_boards,
        church_cms::handlers::board::get_board,
        church_cms::handlers::board::list_board_posts,
        church_cms::handlers::board::get_board_menu,
        church_cms::handlers::board::admin_list_boards,
        church_cms::handlers::board::create_board,
        church_cms::handlers::board::update_board,
        church_cms::handlers::board::delete_board,
        // Posts
        church_cms::handlers::post::get_post,
        church_cms::handlers::post::get_post_images,
        church_cms::handlers::post::recent_posts,
        church_cms::handlers::post::popular_posts,
        church_cms::handlers::post::admin_list_posts,
        church_cms::handlers::post::admin_get_post,
        church_cms::handlers::post::create_post,
        church_cms::handlers::post::update_post,
        church_cms::handlers::post::delete_post,
        church_cms::handlers::post::toggle_publish,
        church_cms::handlers::post::toggle_notice,
        // Files
        church_cms::handlers::file::upload,
        church_cms::handlers::file::delete_attachment,
        church_cms::handlers::file::serve_file,
        church_cms::handlers::file::serve_by_path,
        church_cms::handlers::file::list_attachments,
        church_cms::handlers::file::list_post_attachments,
        church_cms::handlers::file::set_attachment_order,
        // Menus
        church_cms::handlers::menu::navigation,
        church_cms::handlers::menu::get_menu,
        church_cms::handlers::menu::admin_list_menus,
        church_cms::handlers::menu::create_menu,
        church_cms::handlers::menu::update_menu,
        church_cms::handlers::menu::set_menu_content,
        church_cms::handlers::menu::delete_menu,
        // Popups
        church_cms::handlers::popup::active_popup,
        church_cms::handlers::popup::list_popups,
        church_cms::handlers::popup::get_popup,
        church_cms::handlers::popup::create_popup,
        church_cms::handlers::popup::update_popup,
        church_cms::handlers::popup::toggle_popup,
        church_cms::handlers::popup::delete_popup,
        // Admin
        church_cms::handlers::admin::get_stats,
    ),
    components(
        schemas(
            church_cms::response::ApiResponse<serde_json::Value>,
            church_cms::response::PaginatedResponse<serde_json::Value>,
            church_cms::response::PaginationQuery,
            church_cms::error::AppError,
            church_cms::models::BoardType,
            church_cms::models::MenuType,
            church_cms::models::FileType,
            // Boards
            church_cms::handlers::board::BoardResponse,
            church_cms::handlers::board::CreateBoardRequest,
            church_cms::handlers::board::UpdateBoardRequest,
            church_cms::handlers::board::BoardPostsQuery,
            church_cms::handlers::board::BoardPostsResponse,
            church_cms::handlers::board::AdminBoardsQuery,
            // Posts
            church_cms::handlers::post::PostSummary,
            church_cms::handlers::post::PostResponse,
            church_cms::handlers::post::PostDetailResponse,
            church_cms::handlers::post::BoardRef,
            church_cms::handlers::post::PostLink,
            church_cms::handlers::post::PostListQuery,
            church_cms::handlers::post::CreatePostRequest,
            church_cms::handlers::post::UpdatePostRequest,
            // Files
            church_cms::handlers::file::AttachmentResponse,
            church_cms::handlers::file::UploadResponse,
            church_cms::handlers::file::FailedUploadResponse,
            church_cms::handlers::file::AttachmentListQuery,
            church_cms::handlers::file::DisplayOrderRequest,
            // Menus
            church_cms::services::menu::NavNode,
            church_cms::services::menu::NavBoard,
            church_cms::handlers::menu::MenuResponse,
            church_cms::handlers::menu::MenuDetailResponse,
            church_cms::handlers::menu::Breadcrumb,
            church_cms::handlers::menu::CreateMenuRequest,
            church_cms::handlers::menu::UpdateMenuRequest,
            church_cms::handlers::menu::MenuContentRequest,
            church_cms::handlers::menu::AdminMenusQuery,
            // Popups
            church_cms::handlers::popup::PopupResponse,
            church_cms::handlers::popup::CreatePopupRequest,
            church_cms::handlers::popup::UpdatePopupRequest,
            // Admin
            church_cms::handlers::admin::DashboardResponse,
            church_cms::handlers::admin::BoardStats,
            church_cms::handlers::admin::RecentPostEntry,
        )
    ),
    tags(
        (name = "boards", description = "Board catalogue and board listings"),
        (name = "posts", description = "Published posts"),
        (name = "files", description = "Attachment upload and download"),
        (name = "menus", description = "Site navigation"),
        (name = "popups", description = "Promotional popups"),
        (name = "admin", description = "Editor panel"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let json_logs = config::json_logs_from_env();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "church_cms=debug,tower_http=debug,axum=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // Fail fast on bad configuration
    let (jwt_config, upload_config) = validate_config()?;
    utils::jwt::init_jwt_config(jwt_config)?;

    tracing::info!("Starting church CMS API v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database().await?;
    tracing::info!("Database connected successfully");

    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    // Cache is optional; the database answers everything on its own
    let cache = match config::redis::get_redis().await {
        Ok(Some(conn)) => {
            tracing::info!("Redis connected successfully");
            Some(CacheService::new(conn))
        }
        Ok(None) => {
            tracing::info!("REDIS_URL not set, running without cache");
            None
        }
        Err(e) => {
            tracing::warn!("Redis unavailable, running without cache: {}", e);
            None
        }
    };

    tracing::info!(
        "Uploads stored under {} (max {} bytes per file, thumbnails: {})",
        upload_config.upload_dir.display(),
        upload_config.max_file_size,
        upload_config.thumbnails
    );

    let mut app = create_app()
        .layer(Extension(db))
        .layer(Extension(upload_config));

    if let Some(cache) = cache {
        app = app.layer(Extension(cache));
    }

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Everything that must be right before the first connection is opened.
fn validate_config() -> anyhow::Result<(config::jwt::JwtConfig, UploadConfig)> {
    let jwt_config = config::jwt::JwtConfig::from_env()?;

    if env::var("DATABASE_URL").is_err() {
        return Err(anyhow::anyhow!(
            "DATABASE_URL environment variable must be set"
        ));
    }

    let upload_config = UploadConfig::from_env()?;
    std::fs::create_dir_all(&upload_config.upload_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create upload directory '{}': {}",
            upload_config.upload_dir.display(),
            e
        )
    })?;

    Ok((jwt_config, upload_config))
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{header, HeaderValue, Method};

    let origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    if origins_str == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

fn create_app() -> Router {
    Router::new()
        .route("/", get(health_check))
        .merge(routes::create_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(
            church_cms::middleware::security::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(Extension(db): Extension<DatabaseConnection>) -> impl IntoResponse {
    let backend = db.get_database_backend();
    let db_ok = db
        .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "Church CMS API",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}
