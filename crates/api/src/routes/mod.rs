//! HTTP route handlers.

pub mod customers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::str::FromStr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use domain::Page;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Optional `limit` / `offset` query parameters accepted by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<Pagination> for Page {
    fn from(p: Pagination) -> Self {
        Page::new(p.limit, p.offset)
    }
}

/// JSON request body whose rejection is reported through [`ApiError`].
type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Parses a UUID-backed id, reporting malformed input as a bad request.
fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}

/// A 201 response with a `Location` header.
fn created<T: Serialize>(location: String, body: T) -> impl IntoResponse {
    (StatusCode::CREATED, [(header::LOCATION, location)], Json(body))
}
