//! Order workflow endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use domain::{
    CreateOrder, CustomerId, Order, OrderDetails, OrderId, OrderItem, OrderLine,
    OrderReplacement, OrderStatus, Product, ProductId, Version,
};
use serde::{Deserialize, Serialize};
use store::Store;

use super::customers::CustomerResponse;
use super::{JsonBody, Pagination, created, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub notes: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceOrderRequest {
    pub id: String,
    pub customer_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub notes: String,
    pub shipped_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub version: i64,
}

// -- Response types --

/// Product fields shown on an order line.
#[derive(Debug, Serialize)]
pub struct OrderProductResponse {
    pub id: String,
    pub name: String,
    pub category: String,
    pub brand: String,
    pub price_cents: i64,
}

impl From<Product> for OrderProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name,
            category: p.category,
            brand: p.brand,
            price_cents: p.price.cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<OrderProductResponse>,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            total_cents: item.total().cents(),
            product: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub order_date: DateTime<Utc>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub sub_total_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub shipping_address: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub items: Vec<OrderItemResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerResponse>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id.to_string(),
            customer_id: o.customer_id.to_string(),
            order_date: o.order_date,
            shipped_date: o.shipped_date,
            delivered_date: o.delivered_date,
            status: o.status,
            sub_total_cents: o.sub_total.cents(),
            tax_cents: o.tax.cents(),
            total_cents: o.total.cents(),
            shipping_address: o.shipping_address,
            notes: o.notes,
            created_at: o.created_at,
            updated_at: o.updated_at,
            version: o.version.as_i64(),
            items: o.items.iter().map(OrderItemResponse::from).collect(),
            customer: None,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        let items = details
            .lines
            .into_iter()
            .map(|line| OrderItemResponse {
                product: line.product.map(OrderProductResponse::from),
                ..OrderItemResponse::from(&line.item)
            })
            .collect();
        Self {
            items,
            customer: details.customer.map(CustomerResponse::from),
            ..OrderResponse::from(details.order)
        }
    }
}

// -- Handlers --

/// GET /api/orders: newest first, with customer and product details.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_orders(page.into()).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /api/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id, "order id")?;
    let details = state.orders.get_order(id).await?;
    Ok(Json(details.into()))
}

/// GET /api/orders/customer/{customer_id}
#[tracing::instrument(skip(state))]
pub async fn for_customer<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id: CustomerId = parse_id(&customer_id, "customer id")?;
    let orders = state
        .orders
        .customer_orders(customer_id, page.into())
        .await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// POST /api/orders: places an order and decrements stock.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: JsonBody<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let customer_id: CustomerId = parse_id(&req.customer_id, "customer_id")?;
    let items = req
        .items
        .iter()
        .map(|item| {
            let product_id: ProductId = parse_id(&item.product_id, "product_id")?;
            Ok(OrderLine::new(product_id, item.quantity))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let cmd = CreateOrder::new(customer_id, items)
        .shipping_address(req.shipping_address)
        .notes(req.notes);
    let order = state.orders.create_order(cmd).await?;

    let location = format!("/api/orders/{}", order.id);
    Ok(created(location, OrderResponse::from(order)))
}

/// PUT /api/orders/{id}: replaces header fields only.
#[tracing::instrument(skip(state, body))]
pub async fn replace<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: JsonBody<ReplaceOrderRequest>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    let id: OrderId = parse_id(&id, "order id")?;
    let body_id: OrderId = parse_id(&req.id, "order id")?;
    let customer_id: CustomerId = parse_id(&req.customer_id, "customer_id")?;

    state
        .orders
        .replace_order(
            id,
            OrderReplacement {
                id: body_id,
                customer_id,
                status: req.status,
                shipping_address: req.shipping_address,
                notes: req.notes,
                shipped_date: req.shipped_date,
                delivered_date: req.delivered_date,
                version: Version::new(req.version),
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/orders/{id}/status
#[tracing::instrument(skip(state, body))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: JsonBody<UpdateStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    let id: OrderId = parse_id(&id, "order id")?;
    let status = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state.orders.update_status(id, status).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/orders/{id}: pending orders only; stock is restored.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: OrderId = parse_id(&id, "order id")?;
    state.orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
