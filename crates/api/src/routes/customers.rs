//! Customer directory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use domain::{
    Customer, CustomerId, CustomerReplacement, CustomerWithOrders, Lifecycle, NewCustomer, Version,
};
use serde::{Deserialize, Serialize};
use store::Store;

use super::orders::OrderResponse;
use super::{JsonBody, Pagination, created, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceCustomerRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub version: i64,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id.to_string(),
            name: c.name,
            email: c.email,
            phone: c.phone,
            address: c.address,
            city: c.city,
            state: c.state,
            postal_code: c.postal_code,
            lifecycle: c.lifecycle,
            created_at: c.created_at,
            updated_at: c.updated_at,
            version: c.version.as_i64(),
        }
    }
}

/// A customer with its orders, newest first.
#[derive(Debug, Serialize)]
pub struct CustomerDetailResponse {
    #[serde(flatten)]
    pub customer: CustomerResponse,
    pub orders: Vec<OrderResponse>,
}

impl From<CustomerWithOrders> for CustomerDetailResponse {
    fn from(c: CustomerWithOrders) -> Self {
        Self {
            customer: c.customer.into(),
            orders: c.orders.into_iter().map(OrderResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// GET /api/customers: active customers ordered by name.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<CustomerResponse>>, ApiError> {
    let customers = state.directory.list_active(page.into()).await?;
    Ok(Json(
        customers.into_iter().map(CustomerResponse::from).collect(),
    ))
}

/// GET /api/customers/{id}: the customer with its orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CustomerDetailResponse>, ApiError> {
    let id: CustomerId = parse_id(&id, "customer id")?;
    let customer = state.directory.get_active_with_orders(id).await?;
    Ok(Json(customer.into()))
}

/// POST /api/customers
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: JsonBody<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let customer = state
        .directory
        .create(NewCustomer {
            name: req.name,
            email: req.email,
            phone: req.phone,
            address: req.address,
            city: req.city,
            state: req.state,
            postal_code: req.postal_code,
        })
        .await?;

    let location = format!("/api/customers/{}", customer.id);
    Ok(created(location, CustomerResponse::from(customer)))
}

/// PUT /api/customers/{id}
#[tracing::instrument(skip(state, body))]
pub async fn replace<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: JsonBody<ReplaceCustomerRequest>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    let id: CustomerId = parse_id(&id, "customer id")?;
    let body_id: CustomerId = parse_id(&req.id, "customer id")?;

    state
        .directory
        .replace(
            id,
            CustomerReplacement {
                id: body_id,
                name: req.name,
                email: req.email,
                phone: req.phone,
                address: req.address,
                city: req.city,
                state: req.state,
                postal_code: req.postal_code,
                lifecycle: req.lifecycle,
                version: Version::new(req.version),
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/customers/{id}: soft if the customer has orders, hard otherwise.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: CustomerId = parse_id(&id, "customer id")?;
    state.directory.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
