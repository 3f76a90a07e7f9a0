//! Router configuration.

use crate::api::{books, borrow, loans, members, penalties};
use crate::health::{health_check, metrics, readiness_check};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use libris_web::correlation_id_layer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Health, readiness and metrics are public; everything under `/api` needs a
/// bearer session. Each request runs inside a correlation-id span.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Catalog
        .route("/books", get(books::list_books))
        .route("/books/search", get(books::search_books))
        .route("/books/filter", get(books::filter_books))
        .route("/books/autocomplete", get(books::autocomplete))
        .route("/books/:id", get(books::get_book).put(books::update_book))
        .route("/streams", get(books::list_streams))
        // Members
        .route("/members", get(members::list_members))
        // Borrow lifecycle
        .route("/borrow-requests", post(borrow::create_borrow_request))
        .route("/borrow-requests/pending", get(borrow::pending_requests))
        .route("/borrow-requests/:id/approve", post(borrow::approve_request))
        .route("/borrow-requests/:id/reject", post(borrow::reject_request))
        // Loans
        .route("/loans", get(loans::list_loans))
        .route("/loans/due", get(loans::due_within))
        .route("/loans/due/tomorrow", get(loans::due_tomorrow))
        .route("/loans/due/today", get(loans::due_today))
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/users/:id/loans", get(loans::user_loans))
        .route("/users/:id/history", get(loans::user_history))
        // Penalties
        .route("/penalties", get(penalties::list_penalties));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
