use crate::{services::PageRequest, ApiResponse, AppState, ListQuery, PaginatedResponse};
use axum::{http::StatusCode, Json};
use serde::Deserialize;

/// JSON body of a 200 response
pub type Ok200<T> = Json<ApiResponse<T>>;
/// JSON body of a 201 response
pub type Created<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn ok<T>(data: T) -> Ok200<T> {
    Json(ApiResponse::success(data))
}

pub fn created<T>(data: T) -> Created<T> {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// Resolves list query paging against the configured page sizes.
pub fn page_request(state: &AppState, query: &ListQuery) -> PageRequest {
    let default_limit = u64::from(state.config.api_default_page_size);
    PageRequest::new(
        query.page,
        query.limit.unwrap_or(default_limit),
        u64::from(state.config.api_max_page_size),
    )
}

pub fn paginated<T>(items: Vec<T>, total: u64, page: PageRequest) -> PaginatedResponse<T> {
    PaginatedResponse {
        items,
        total,
        page: page.page,
        limit: page.limit,
        total_pages: page.total_pages(total),
    }
}

/// Body of the `.../status` routes
#[derive(Debug, Deserialize)]
pub struct StatusChange<S> {
    pub status: S,
}
