//! HTTP API server with observability for the order-management backend.
//!
//! Provides REST endpoints for products, customers and orders, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch};
use domain::{CatalogService, DirectoryService, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub catalog: CatalogService<S>,
    pub directory: DirectoryService<S>,
    pub orders: OrderService<S>,
}

/// Creates the application state with every service sharing one store.
pub fn create_state<S: Store + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        catalog: CatalogService::new(store.clone()),
        directory: DirectoryService::new(store.clone()),
        orders: OrderService::new(store),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/api/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route("/api/products/low-stock", get(routes::products::low_stock::<S>))
        .route(
            "/api/products/category/{category}",
            get(routes::products::by_category::<S>),
        )
        .route(
            "/api/products/{id}",
            get(routes::products::get::<S>)
                .put(routes::products::replace::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route(
            "/api/customers",
            get(routes::customers::list::<S>).post(routes::customers::create::<S>),
        )
        .route(
            "/api/customers/{id}",
            get(routes::customers::get::<S>)
                .put(routes::customers::replace::<S>)
                .delete(routes::customers::delete::<S>),
        )
        .route(
            "/api/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route(
            "/api/orders/customer/{customer_id}",
            get(routes::orders::for_customer::<S>),
        )
        .route(
            "/api/orders/{id}",
            get(routes::orders::get::<S>)
                .put(routes::orders::replace::<S>)
                .delete(routes::orders::delete::<S>),
        )
        .route(
            "/api/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
