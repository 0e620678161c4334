//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use domain::{Lifecycle, Money, NewProduct, Product, ProductId, ProductReplacement, Version};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{JsonBody, Pagination, created, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub stock: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceProductRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub stock: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub version: i64,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub stock: i32,
    pub category: String,
    pub brand: String,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name,
            description: p.description,
            price_cents: p.price.cents(),
            stock: p.stock,
            category: p.category,
            brand: p.brand,
            lifecycle: p.lifecycle,
            created_at: p.created_at,
            updated_at: p.updated_at,
            version: p.version.as_i64(),
        }
    }
}

fn respond_all(products: Vec<Product>) -> Json<Vec<ProductResponse>> {
    Json(products.into_iter().map(ProductResponse::from).collect())
}

// -- Handlers --

/// GET /api/products: active products ordered by name.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.list_active(page.into()).await?;
    Ok(respond_all(products))
}

/// GET /api/products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id, "product id")?;
    let product = state.catalog.get_active(id).await?;
    Ok(Json(product.into()))
}

/// GET /api/products/category/{category}
#[tracing::instrument(skip(state))]
pub async fn by_category<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(category): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.by_category(&category, page.into()).await?;
    Ok(respond_all(products))
}

/// GET /api/products/low-stock: lowest stock first.
#[tracing::instrument(skip(state))]
pub async fn low_stock<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.low_stock(page.into()).await?;
    Ok(respond_all(products))
}

/// POST /api/products
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: JsonBody<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let product = state
        .catalog
        .create(NewProduct {
            name: req.name,
            description: req.description,
            price: Money::from_cents(req.price_cents),
            stock: req.stock,
            category: req.category,
            brand: req.brand,
        })
        .await?;

    let location = format!("/api/products/{}", product.id);
    Ok(created(location, ProductResponse::from(product)))
}

/// PUT /api/products/{id}
#[tracing::instrument(skip(state, body))]
pub async fn replace<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: JsonBody<ReplaceProductRequest>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    let id: ProductId = parse_id(&id, "product id")?;
    let body_id: ProductId = parse_id(&req.id, "product id")?;

    state
        .catalog
        .replace(
            id,
            ProductReplacement {
                id: body_id,
                name: req.name,
                description: req.description,
                price: Money::from_cents(req.price_cents),
                stock: req.stock,
                category: req.category,
                brand: req.brand,
                lifecycle: req.lifecycle,
                version: Version::new(req.version),
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/products/{id}: soft delete.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ProductId = parse_id(&id, "product id")?;
    state.catalog.deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
