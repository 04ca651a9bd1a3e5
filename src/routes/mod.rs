use crate::config::rate_limit::{RateLimitConfig, RateLimitRule};
use crate::handlers;
use crate::middleware::auth::{auth_middleware, optional_auth_middleware};
use axum::{extract::DefaultBodyLimit, middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Whole multipart body of one upload request; each file is still held to
/// the configured per-file maximum.
const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

pub fn create_routes() -> Router {
    Router::new().nest("/api/v1", api_routes())
}

fn api_routes() -> Router {
    let rate_limit_config = RateLimitConfig::from_env();

    let public_read = public_read_routes(&rate_limit_config)
        .layer(middleware::from_fn(optional_auth_middleware));
    let files =
        file_routes(&rate_limit_config).layer(middleware::from_fn(optional_auth_middleware));
    let admin = admin_routes(&rate_limit_config).layer(middleware::from_fn(auth_middleware));

    public_read.merge(files).merge(admin)
}

/// Visitor-facing reads. A valid token unlocks boards that require sign-in.
fn public_read_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        // Boards
        .route("/boards", routing::get(handlers::board::list_boards))
        .route("/boards/{code}", routing::get(handlers::board::get_board))
        .route(
            "/boards/{code}/posts",
            routing::get(handlers::board::list_board_posts),
        )
        .route(
            "/boards/{code}/menu",
            routing::get(handlers::board::get_board_menu),
        )
        // Posts
        .route("/posts/recent", routing::get(handlers::post::recent_posts))
        .route("/posts/popular", routing::get(handlers::post::popular_posts))
        .route("/posts/{id}", routing::get(handlers::post::get_post))
        .route(
            "/posts/{id}/images",
            routing::get(handlers::post::get_post_images),
        )
        // Menus
        .route("/menus", routing::get(handlers::menu::navigation))
        .route("/menus/{id}", routing::get(handlers::menu::get_menu))
        // Popup
        .route("/popup/active", routing::get(handlers::popup::active_popup));

    with_optional_rate_limit(router, config.enabled, config.public_read)
}

fn file_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/files/{id}", routing::get(handlers::file::serve_file))
        .route(
            "/files/path/{*path}",
            routing::get(handlers::file::serve_by_path),
        );

    with_optional_rate_limit(router, config.enabled, config.files)
}

/// Editor panel. Every route needs a valid token; writes also need the editor role.
fn admin_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/admin/stats", routing::get(handlers::admin::get_stats))
        // Boards
        .route(
            "/admin/boards",
            routing::get(handlers::board::admin_list_boards).post(handlers::board::create_board),
        )
        .route(
            "/admin/boards/{code}",
            routing::put(handlers::board::update_board).delete(handlers::board::delete_board),
        )
        .route(
            "/admin/boards/{code}/posts",
            routing::get(handlers::post::admin_list_posts),
        )
        // Posts
        .route("/admin/posts", routing::post(handlers::post::create_post))
        .route(
            "/admin/posts/{id}",
            routing::get(handlers::post::admin_get_post)
                .put(handlers::post::update_post)
                .delete(handlers::post::delete_post),
        )
        .route(
            "/admin/posts/{id}/publish",
            routing::put(handlers::post::toggle_publish),
        )
        .route(
            "/admin/posts/{id}/notice",
            routing::put(handlers::post::toggle_notice),
        )
        .route(
            "/admin/posts/{id}/attachments",
            routing::get(handlers::file::list_post_attachments),
        )
        // Attachments
        .route(
            "/admin/upload",
            routing::post(handlers::file::upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/admin/attachments",
            routing::get(handlers::file::list_attachments),
        )
        .route(
            "/admin/attachments/{id}",
            routing::delete(handlers::file::delete_attachment),
        )
        .route(
            "/admin/attachments/{id}/order",
            routing::put(handlers::file::set_attachment_order),
        )
        // Menus
        .route(
            "/admin/menus",
            routing::get(handlers::menu::admin_list_menus).post(handlers::menu::create_menu),
        )
        .route(
            "/admin/menus/{id}",
            routing::put(handlers::menu::update_menu).delete(handlers::menu::delete_menu),
        )
        .route(
            "/admin/menus/{id}/content",
            routing::put(handlers::menu::set_menu_content),
        )
        // Popups
        .route(
            "/admin/popups",
            routing::get(handlers::popup::list_popups).post(handlers::popup::create_popup),
        )
        .route(
            "/admin/popups/{id}",
            routing::get(handlers::popup::get_popup)
                .put(handlers::popup::update_popup)
                .delete(handlers::popup::delete_popup),
        )
        .route(
            "/admin/popups/{id}/toggle",
            routing::post(handlers::popup::toggle_popup),
        );

    with_optional_rate_limit(router, config.enabled, config.admin)
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    match GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
    {
        Some(governor_conf) => router.layer(GovernorLayer::new(governor_conf)),
        None => {
            tracing::warn!(
                "Rate limit {}/s burst {} rejected, serving without a limit",
                rule.per_second,
                rule.burst_size
            );
            router
        }
    }
}
