//! Catalog endpoints.
//!
//! - GET /api/books - Whole catalog
//! - GET /api/books/:id - Book with recommendations
//! - PUT /api/books/:id - Edit catalog fields (admin)
//! - GET /api/books/search?query= - Title or author search
//! - GET /api/books/filter?subject=&query= - Subject plus author/title filter
//! - GET /api/books/autocomplete?q= - Title suggestions
//! - GET /api/streams - Distinct streams
//!
//! None of these touch stock counters.

use crate::auth::{RequireAdmin, SessionUser};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use libris_core::types::{Book, BookDetails, BookId, BookUpdate, BookWithAuthors};
use libris_web::{AppError, non_empty};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Catalog listing.
#[derive(Debug, Serialize)]
pub struct BooksResponse<T> {
    /// Matching books
    pub books: Vec<T>,
    /// Number of books returned
    pub count: usize,
}

impl<T> BooksResponse<T> {
    fn new(books: Vec<T>) -> Self {
        Self {
            count: books.len(),
            books,
        }
    }
}

/// `?query=` of the search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Text matched against titles and author names
    #[serde(default)]
    pub query: String,
}

/// `?subject=&query=` of the filter endpoint.
#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    /// Exact subject name
    pub subject: Option<String>,
    /// Author name, or title text when no author matches
    pub query: Option<String>,
}

/// `?q=` of the autocomplete endpoint.
#[derive(Debug, Deserialize)]
pub struct AutocompleteQuery {
    /// Title fragment
    #[serde(default)]
    pub q: String,
}

/// Autocomplete suggestions.
#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    /// Matching titles
    pub suggestions: Vec<String>,
}

/// Distinct streams.
#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    /// Stream names
    pub streams: Vec<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

/// List the catalog. 404 when it is empty.
pub async fn list_books(
    _session: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<BooksResponse<Book>>, AppError> {
    let books = non_empty(state.store().list_books().await?, "No books found")?;
    Ok(Json(BooksResponse::new(books)))
}

/// One book plus other titles to suggest.
pub async fn get_book(
    _session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookDetails>, AppError> {
    let details = state
        .store()
        .book_details(BookId::from_uuid(id), state.lending.recommendation_limit)
        .await?;
    Ok(Json(details))
}

/// Edit catalog fields. Stock counters are not accepted here.
pub async fn update_book(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<BookUpdate>,
) -> Result<Json<Book>, AppError> {
    update.validate()?;
    let book = state
        .store()
        .update_book(BookId::from_uuid(id), &update)
        .await?;

    tracing::info!(book_id = %book.id, admin = %admin.user.user_code, "Book updated");
    Ok(Json(book))
}

/// Case-insensitive search over titles and author names.
///
/// 400 for a blank query; no match is an empty list.
pub async fn search_books(
    _session: SessionUser,
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<BooksResponse<BookWithAuthors>>, AppError> {
    let query = non_blank(Some(&params.query))
        .ok_or_else(|| AppError::bad_request("Search query is required"))?;

    let books = state.store().search_books(query).await?;
    Ok(Json(BooksResponse::new(books)))
}

/// Filter by subject and/or author (title when no author matches).
///
/// 400 when both parameters are blank, 404 for an unknown subject; no match
/// is an empty list.
pub async fn filter_books(
    _session: SessionUser,
    State(state): State<AppState>,
    Query(params): Query<FilterQuery>,
) -> Result<Json<BooksResponse<BookWithAuthors>>, AppError> {
    let subject = non_blank(params.subject.as_deref());
    let query = non_blank(params.query.as_deref());
    if subject.is_none() && query.is_none() {
        return Err(AppError::bad_request("Provide a subject or a query"));
    }

    let books = state.store().filter_books(subject, query).await?;
    Ok(Json(BooksResponse::new(books)))
}

/// Title suggestions for a search box.
pub async fn autocomplete(
    _session: SessionUser,
    State(state): State<AppState>,
    Query(params): Query<AutocompleteQuery>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let fragment = non_blank(Some(&params.q))
        .ok_or_else(|| AppError::bad_request("Query parameter 'q' is required"))?;

    let suggestions = non_empty(
        state
            .store()
            .autocomplete_titles(fragment, state.lending.autocomplete_limit)
            .await?,
        "No suggestions found",
    )?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// Distinct streams the catalog is shelved under.
pub async fn list_streams(
    _session: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<StreamsResponse>, AppError> {
    let streams = non_empty(state.store().list_streams().await?, "No streams found")?;
    Ok(Json(StreamsResponse { streams }))
}
