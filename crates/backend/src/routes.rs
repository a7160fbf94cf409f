use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, system};

/// All application routes
pub fn configure_routes() -> Router {
    let auth = || middleware::from_fn(system::auth::middleware::require_auth);
    let admin = || middleware::from_fn(system::auth::middleware::require_admin);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // PUBLIC TOKEN ROUTES (no account)
        // ========================================
        .route(
            "/api/public/cash_register/:token",
            get(handlers::a002_cash_register_token::info),
        )
        .route(
            "/api/public/cash_register/:token/pin",
            post(handlers::a002_cash_register_token::check_pin),
        )
        .route(
            "/api/public/cash_register/:token/submit",
            post(handlers::a002_cash_register_token::submit),
        )
        // ========================================
        // BACK OFFICE (auth)
        // ========================================
        // A001 Cash register entries
        .route(
            "/api/cash_registers",
            get(handlers::a001_cash_register::list)
                .post(handlers::a001_cash_register::create)
                .layer(auth()),
        )
        .route(
            "/api/cash_registers/:id",
            get(handlers::a001_cash_register::get_by_id)
                .put(handlers::a001_cash_register::update)
                .delete(handlers::a001_cash_register::delete)
                .layer(auth()),
        )
        .route(
            "/api/cash_registers/:id/confirm",
            post(handlers::a001_cash_register::confirm).layer(auth()),
        )
        // P900 Cash register summaries
        .route(
            "/api/cash_register_summaries",
            get(handlers::p900_cash_register_summary::list).layer(auth()),
        )
        .route(
            "/api/cash_register_summaries/:company_id/rebuild",
            post(handlers::p900_cash_register_summary::rebuild).layer(admin()),
        )
        // ========================================
        // ADMIN
        // ========================================
        // A002 Access tokens
        .route(
            "/api/cash_register_tokens",
            get(handlers::a002_cash_register_token::list)
                .post(handlers::a002_cash_register_token::issue)
                .layer(admin()),
        )
        .route(
            "/api/cash_register_tokens/:id/deactivate",
            post(handlers::a002_cash_register_token::deactivate).layer(admin()),
        )
}
