//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_state(InMemoryStore::new());
    api::create_app(state, get_metrics_handle())
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    json: Value,
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Reply {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    Reply {
        status,
        headers,
        json,
    }
}

async fn create_product(app: &axum::Router, name: &str, price_cents: i64, stock: i32) -> Value {
    let reply = send(
        app,
        "POST",
        "/api/products",
        Some(json!({
            "name": name,
            "price_cents": price_cents,
            "stock": stock,
            "category": "Granos",
            "brand": "Don Pepe"
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json
}

async fn create_customer(app: &axum::Router, name: &str, email: &str) -> Value {
    let reply = send(
        app,
        "POST",
        "/api/customers",
        Some(json!({ "name": name, "email": email })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json
}

async fn place_order(app: &axum::Router, customer: &Value, lines: &[(&Value, i32)]) -> Reply {
    let items: Vec<Value> = lines
        .iter()
        .map(|(product, quantity)| json!({ "product_id": product["id"], "quantity": quantity }))
        .collect();
    send(
        app,
        "POST",
        "/api/orders",
        Some(json!({
            "customer_id": customer["id"],
            "shipping_address": "Avenida Central 456",
            "items": items
        })),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let reply = send(&app, "GET", "/health", None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

mod products {
    use super::*;

    #[tokio::test]
    async fn create_returns_location() {
        let app = setup();
        let reply = send(
            &app,
            "POST",
            "/api/products",
            Some(json!({ "name": "Arroz Premium", "price_cents": 250, "stock": 100 })),
        )
        .await;

        assert_eq!(reply.status, StatusCode::CREATED);
        let id = reply.json["id"].as_str().unwrap();
        assert_eq!(
            reply.headers[header::LOCATION].to_str().unwrap(),
            format!("/api/products/{id}")
        );
        assert_eq!(reply.json["lifecycle"], "Active");
        assert_eq!(reply.json["version"], 1);

        let fetched = send(&app, "GET", &format!("/api/products/{id}"), None).await;
        assert_eq!(fetched.status, StatusCode::OK);
        assert_eq!(fetched.json["price_cents"], 250);
    }

    #[tokio::test]
    async fn validation_and_bad_ids() {
        let app = setup();

        let reply = send(
            &app,
            "POST",
            "/api/products",
            Some(json!({ "name": "", "price_cents": 250, "stock": 1 })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "ValidationFailed");

        let reply = send(&app, "GET", "/api/products/not-a-uuid", None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::new_v4();
        let reply = send(&app, "GET", &format!("/api/products/{missing}"), None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.json["kind"], "NotFound");
    }

    #[tokio::test]
    async fn delete_hides_product() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let uri = format!("/api/products/{}", product["id"].as_str().unwrap());

        let reply = send(&app, "DELETE", &uri, None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        let reply = send(&app, "GET", &uri, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);

        let reply = send(&app, "GET", "/api/products", None).await;
        assert_eq!(reply.json.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn category_low_stock_and_paging() {
        let app = setup();
        create_product(&app, "Arroz Premium", 250, 100).await;
        create_product(&app, "Frijoles Negros", 180, 15).await;
        create_product(&app, "Azúcar", 150, 3).await;

        let reply = send(&app, "GET", "/api/products/category/granos", None).await;
        assert_eq!(reply.json.as_array().unwrap().len(), 3);

        let reply = send(&app, "GET", "/api/products/low-stock", None).await;
        let stocks: Vec<_> = reply
            .json
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["stock"].as_i64().unwrap())
            .collect();
        assert_eq!(stocks, vec![3, 15]);

        let reply = send(&app, "GET", "/api/products?limit=1&offset=1", None).await;
        let page = reply.json.as_array().unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["name"], "Azúcar");
    }

    #[tokio::test]
    async fn replace_checks_version() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let id = product["id"].as_str().unwrap();
        let uri = format!("/api/products/{id}");
        let body = json!({
            "id": id,
            "name": "Arroz Premium",
            "price_cents": 275,
            "stock": 90,
            "version": 1
        });

        let reply = send(&app, "PUT", &uri, Some(body.clone())).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        let reply = send(&app, "PUT", &uri, Some(body)).await;
        assert_eq!(reply.status, StatusCode::CONFLICT);
        assert_eq!(reply.json["kind"], "ConcurrencyConflict");

        let other = uuid::Uuid::new_v4();
        let reply = send(
            &app,
            "PUT",
            &uri,
            Some(json!({
                "id": other.to_string(),
                "name": "Arroz Premium",
                "price_cents": 275,
                "stock": 90,
                "version": 2
            })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }
}

mod customers {
    use super::*;

    #[tokio::test]
    async fn duplicate_active_email_conflicts() {
        let app = setup();
        create_customer(&app, "María García", "maria.garcia@email.com").await;

        let reply = send(
            &app,
            "POST",
            "/api/customers",
            Some(json!({ "name": "María G.", "email": "maria.garcia@email.com" })),
        )
        .await;

        assert_eq!(reply.status, StatusCode::CONFLICT);
        assert_eq!(reply.json["kind"], "DuplicateEmail");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = setup();
        let reply = send(
            &app,
            "POST",
            "/api/customers",
            Some(json!({ "name": "María García" })),
        )
        .await;

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "ValidationFailed");
        assert!(reply.json["error"].as_str().unwrap().contains("email"));
    }

    #[tokio::test]
    async fn get_includes_orders() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;
        place_order(&app, &customer, &[(&product, 2)]).await;

        let uri = format!("/api/customers/{}", customer["id"].as_str().unwrap());
        let reply = send(&app, "GET", &uri, None).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json["email"], "juan.perez@email.com");
        assert_eq!(reply.json["orders"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_soft_with_orders_hard_without() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let maria = create_customer(&app, "María García", "maria.garcia@email.com").await;
        let juan = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;
        place_order(&app, &maria, &[(&product, 1)]).await;

        for customer in [&maria, &juan] {
            let uri = format!("/api/customers/{}", customer["id"].as_str().unwrap());
            let reply = send(&app, "DELETE", &uri, None).await;
            assert_eq!(reply.status, StatusCode::NO_CONTENT);
        }

        let reply = send(&app, "GET", "/api/customers", None).await;
        assert_eq!(reply.json.as_array().unwrap().len(), 0);

        // The soft-deleted customer still shows on its orders.
        let reply = send(&app, "GET", "/api/orders", None).await;
        assert_eq!(reply.json[0]["customer"]["lifecycle"], "Deactivated");

        // Her email is free again.
        create_customer(&app, "María García", "maria.garcia@email.com").await;
    }
}

mod orders {
    use super::*;

    #[tokio::test]
    async fn create_computes_totals_and_decrements_stock() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;

        let reply = place_order(&app, &customer, &[(&product, 5)]).await;

        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.json["status"], "Pending");
        assert_eq!(reply.json["sub_total_cents"], 1250);
        assert_eq!(reply.json["tax_cents"], 163);
        assert_eq!(reply.json["total_cents"], 1413);
        let id = reply.json["id"].as_str().unwrap();
        assert_eq!(
            reply.headers[header::LOCATION].to_str().unwrap(),
            format!("/api/orders/{id}")
        );

        let uri = format!("/api/products/{}", product["id"].as_str().unwrap());
        let reply = send(&app, "GET", &uri, None).await;
        assert_eq!(reply.json["stock"], 95);
    }

    #[tokio::test]
    async fn rejected_orders_change_nothing() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 4).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;

        let reply = place_order(&app, &customer, &[(&product, 5)]).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "InsufficientStock");

        let ghost = json!({ "id": uuid::Uuid::new_v4().to_string() });
        let reply = place_order(&app, &customer, &[(&product, 1), (&ghost, 1)]).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "InvalidReference");

        let reply = place_order(&app, &ghost, &[(&product, 1)]).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "InvalidReference");

        let reply = place_order(&app, &customer, &[]).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/products/{}", product["id"].as_str().unwrap());
        let reply = send(&app, "GET", &uri, None).await;
        assert_eq!(reply.json["stock"], 4);
        let reply = send(&app, "GET", "/api/orders", None).await;
        assert_eq!(reply.json.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn malformed_order_body_is_bad_request() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;

        let reply = send(
            &app,
            "POST",
            "/api/orders",
            Some(json!({
                "customer_id": customer["id"],
                "items": [{ "product_id": product["id"], "quantity": "five" }]
            })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "ValidationFailed");

        let uri = format!("/api/orders/{}/status", uuid::Uuid::new_v4());
        let reply = send(&app, "PATCH", &uri, Some(json!({ "state": "Shipped" }))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "ValidationFailed");
    }

    #[tokio::test]
    async fn order_total_overflow_is_bad_request() {
        let app = setup();
        let product = create_product(&app, "Lingote", 100_000_000_000_000_000, 10).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;

        let reply = place_order(&app, &customer, &[(&product, 8)]).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "ValidationFailed");

        let uri = format!("/api/products/{}", product["id"].as_str().unwrap());
        let reply = send(&app, "GET", &uri, None).await;
        assert_eq!(reply.json["stock"], 10);
    }

    #[tokio::test]
    async fn status_patch_stamps_shipped_date_once() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;
        let order = place_order(&app, &customer, &[(&product, 1)]).await.json;
        let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());
        let status_uri = format!("{uri}/status");

        let reply = send(&app, "PATCH", &status_uri, Some(json!({ "status": "Shipped" }))).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
        let first = send(&app, "GET", &uri, None).await.json["shipped_date"].clone();
        assert!(first.is_string());

        send(&app, "PATCH", &status_uri, Some(json!({ "status": "Shipped" }))).await;
        let second = send(&app, "GET", &uri, None).await.json;
        assert_eq!(second["shipped_date"], first);
        assert_eq!(second["status"], "Shipped");

        let reply = send(&app, "PATCH", &status_uri, Some(json!({ "status": "Lost" }))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_only_pending() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;
        let product_uri = format!("/api/products/{}", product["id"].as_str().unwrap());

        let pending = place_order(&app, &customer, &[(&product, 10)]).await.json;
        let shipped = place_order(&app, &customer, &[(&product, 20)]).await.json;
        let shipped_uri = format!("/api/orders/{}", shipped["id"].as_str().unwrap());
        send(
            &app,
            "PATCH",
            &format!("{shipped_uri}/status"),
            Some(json!({ "status": "Shipped" })),
        )
        .await;

        let reply = send(&app, "DELETE", &shipped_uri, None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.json["kind"], "InvalidState");

        let pending_uri = format!("/api/orders/{}", pending["id"].as_str().unwrap());
        let reply = send(&app, "DELETE", &pending_uri, None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        let reply = send(&app, "GET", &product_uri, None).await;
        assert_eq!(reply.json["stock"], 80);
        let reply = send(&app, "GET", &pending_uri, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_includes_details() {
        let app = setup();
        let rice = create_product(&app, "Arroz Premium", 250, 100).await;
        let beans = create_product(&app, "Frijoles Negros", 180, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;
        place_order(&app, &customer, &[(&rice, 1), (&beans, 2)]).await;

        let uri = format!(
            "/api/orders/customer/{}",
            customer["id"].as_str().unwrap()
        );
        let reply = send(&app, "GET", &uri, None).await;

        assert_eq!(reply.status, StatusCode::OK);
        let order = &reply.json[0];
        assert_eq!(order["customer"]["name"], "Juan Pérez");
        assert_eq!(order["items"][0]["product"]["name"], "Arroz Premium");
        assert_eq!(order["items"][1]["total_cents"], 360);
    }

    #[tokio::test]
    async fn replace_header() {
        let app = setup();
        let product = create_product(&app, "Arroz Premium", 250, 100).await;
        let customer = create_customer(&app, "Juan Pérez", "juan.perez@email.com").await;
        let order = place_order(&app, &customer, &[(&product, 1)]).await.json;
        let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());

        let reply = send(
            &app,
            "PUT",
            &uri,
            Some(json!({
                "id": order["id"],
                "customer_id": customer["id"],
                "status": "Confirmed",
                "shipping_address": "Calle Principal 123",
                "notes": "Call before delivery",
                "shipped_date": null,
                "delivered_date": null,
                "version": 1
            })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        let reply = send(&app, "GET", &uri, None).await;
        assert_eq!(reply.json["status"], "Confirmed");
        assert_eq!(reply.json["notes"], "Call before delivery");
        assert_eq!(reply.json["total_cents"], order["total_cents"]);
        assert_eq!(reply.json["version"], 2);
    }
}
