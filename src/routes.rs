// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::MAX_UPLOAD_BYTES,
    handlers::{ads, dashboard, organizes, posts, sponsors, user_details},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public reads and authenticated writes are separate routers merged per resource.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, file store, config).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let post_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/{id}", get(posts::get_post))
        .route("/user/{user_id}", get(posts::list_posts_by_user))
        .merge(
            Router::new()
                .route("/", post(posts::create_post))
                .route("/{id}", put(posts::update_post).delete(posts::delete_post))
                .route("/{id}/review", patch(posts::review_post))
                .route_layer(auth()),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let organize_routes = Router::new()
        .route("/", get(organizes::list_organized))
        .route("/{id}", get(organizes::get_organized))
        .merge(
            Router::new()
                .route("/", post(organizes::create_organized))
                .route(
                    "/{id}",
                    put(organizes::update_organized).delete(organizes::delete_organized),
                )
                .route("/{id}/sub-editor", patch(organizes::sub_editor_decision))
                .route("/{id}/editor", patch(organizes::editor_decision))
                .route("/{id}/daily-top-news", patch(organizes::daily_top_news))
                .route("/{id}/category-top-news", patch(organizes::category_top_news))
                .route_layer(auth()),
        );

    let dashboard_routes = Router::new()
        .route(
            "/user",
            get(dashboard::get_user_financials).post(dashboard::recompute_user_financials),
        )
        .route("/user/payment-request", post(dashboard::request_payment))
        .route("/all-requests", get(dashboard::all_requests))
        .route("/payment-given/{id}", put(dashboard::payment_given))
        .route_layer(auth());

    let user_detail_routes = Router::new()
        .route(
            "/",
            get(user_details::list_user_details).post(user_details::create_user_details),
        )
        .route(
            "/{id}",
            get(user_details::get_user_details)
                .put(user_details::update_user_details)
                .delete(user_details::delete_user_details),
        )
        .route(
            "/{id}/sponsors",
            get(user_details::list_sponsor_proposals).post(user_details::add_sponsor_proposal),
        )
        .route("/sub-editor-sponsor/{id}", put(user_details::update_sponsor_status))
        .route("/{id}/delete-sponsor", put(user_details::delete_sponsor_proposal))
        .route_layer(auth());

    let sponsor_routes = Router::new()
        .route("/", get(sponsors::list_sponsors))
        .route("/{id}", get(sponsors::get_sponsor))
        .merge(
            Router::new()
                .route("/", post(sponsors::create_sponsor))
                .route(
                    "/{id}",
                    put(sponsors::update_sponsor).delete(sponsors::delete_sponsor),
                )
                .route_layer(auth()),
        );

    let ads_routes = Router::new()
        .route("/", get(ads::list_rate_cards))
        .route("/{id}", get(ads::get_rate_card))
        .merge(
            Router::new()
                .route("/", post(ads::create_rate_card))
                .route("/{id}", put(ads::update_rate_card).delete(ads::delete_rate_card))
                // Auth first, then the admin check
                .route_layer(middleware::from_fn(admin_middleware))
                .route_layer(auth()),
        );

    Router::new()
        .nest("/api/posts", post_routes)
        .nest("/api/organizes", organize_routes)
        .nest("/api/dashboard", dashboard_routes)
        .nest("/api/user-details", user_detail_routes)
        .nest("/api/sponsors", sponsor_routes)
        .nest("/api/ads", ads_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
