//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AddressId, BuyerId, ProductId};
use domain::{Address, Buyer, Money, Product, Weight};
use engine::EngineConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryOrderStore;
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

/// Buyers 1 and 2 with one address each; product 1 (10.00, 5 in stock)
/// and product 2 (5.00, 1 in stock).
fn setup() -> (Router, InMemoryOrderStore) {
    let store = InMemoryOrderStore::new();
    for id in 1..=2 {
        store.add_buyer(Buyer {
            id: BuyerId::new(id),
            name: format!("Buyer {id}"),
        });
        store.add_address(Address {
            id: AddressId::new(id),
            buyer_id: BuyerId::new(id),
            recipient_name: format!("Buyer {id}"),
            detail: format!("Street {id}"),
        });
    }
    for (id, price, stock) in [(1, 1000, 5), (2, 500, 1)] {
        store.put_product(Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: format!("Description {id}"),
            price: Money::from_cents(price),
            stock,
            weight: Weight::from_grams(250),
            images: vec![format!("{id}.jpg")],
        });
    }

    let state = api::create_state(
        Arc::new(store.clone()),
        "memory",
        EngineConfig::default(),
    );
    (api::create_app(state, get_metrics_handle()), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str, buyer: i64) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-buyer-id", buyer.to_string())
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, buyer: Option<i64>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(buyer) = buyer {
        builder = builder.header("x-buyer-id", buyer.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn order_body(address_id: i64, items: Value) -> Value {
    json!({
        "address_id": address_id,
        "shipping_cost_cents": 500,
        "payment_method": "bank_transfer",
        "shipping_courier": "jne",
        "items": items,
    })
}

async fn place_order(app: &Router, buyer: i64, quantity: u32) -> String {
    let (status, json) = send(
        app,
        post(
            "/orders",
            Some(buyer),
            order_body(
                buyer,
                json!([{ "product_id": 1, "quantity": quantity, "unit_price_cents": 1000 }]),
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["order_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/health", 1)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_create_order() {
    let (app, store) = setup();

    let (status, json) = send(
        &app,
        post(
            "/orders",
            Some(1),
            order_body(
                1,
                json!([{ "product_id": 1, "quantity": 2, "unit_price_cents": 1000 }]),
            ),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["total_cents"], 2500);
    assert_eq!(json["status"], "pending");
    assert!(json["invoice_number"].as_str().unwrap().starts_with("INV-"));
    assert!(json["order_id"].as_str().is_some());
    assert_eq!(store.product(ProductId::new(1)).unwrap().stock, 3);
}

#[tokio::test]
async fn test_create_order_requires_buyer_identity() {
    let (app, store) = setup();
    let body = order_body(
        1,
        json!([{ "product_id": 1, "quantity": 1, "unit_price_cents": 1000 }]),
    );

    let (status, _) = send(&app, post("/orders", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-buyer-id", "not-a-number")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    assert_eq!(store.order_count(), 0);
}

#[tokio::test]
async fn test_insufficient_stock_leaves_stock_untouched() {
    let (app, store) = setup();

    let (status, json) = send(
        &app,
        post(
            "/orders",
            Some(1),
            order_body(
                1,
                json!([
                    { "product_id": 1, "quantity": 2, "unit_price_cents": 1000 },
                    { "product_id": 2, "quantity": 2, "unit_price_cents": 500 },
                ]),
            ),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("stock"));
    assert_eq!(store.product(ProductId::new(1)).unwrap().stock, 5);
    assert_eq!(store.product(ProductId::new(2)).unwrap().stock, 1);
    assert_eq!(store.order_count(), 0);
}

#[tokio::test]
async fn test_unknown_product_and_foreign_address_are_not_found() {
    let (app, _) = setup();

    let (status, _) = send(
        &app,
        post(
            "/orders",
            Some(1),
            order_body(
                1,
                json!([{ "product_id": 99, "quantity": 1, "unit_price_cents": 1000 }]),
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        post(
            "/orders",
            Some(1),
            order_body(
                2,
                json!([{ "product_id": 1, "quantity": 1, "unit_price_cents": 1000 }]),
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "address not found");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let (app, _) = setup();

    let (status, _) = send(&app, post("/orders", Some(1), order_body(1, json!([])))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post(
            "/orders",
            Some(1),
            order_body(
                1,
                json!([{ "product_id": 1, "quantity": 0, "unit_price_cents": 1000 }]),
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-buyer-id", "1")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_get_order_is_scoped_to_its_buyer() {
    let (app, _) = setup();
    let order_id = place_order(&app, 1, 1).await;

    let (status, json) = send(&app, get(&format!("/orders/{order_id}"), 1)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], order_id.as_str());
    assert_eq!(json["buyer_id"], 1);
    assert_eq!(json["shipping_courier"], "jne");
    assert_eq!(json["lines"][0]["quantity"], 1);
    assert_eq!(json["lines"][0]["snapshot"]["product_name"], "Product 1");
    assert_eq!(json["lines"][0]["snapshot"]["price_cents"], 1000);
    assert!(json["confirmed_at"].is_null());

    let (status, _) = send(&app, get(&format!("/orders/{order_id}"), 2)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/orders/not-a-uuid", 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_orders_filters_and_paginates() {
    let (app, _) = setup();
    for _ in 0..3 {
        place_order(&app, 1, 1).await;
    }
    place_order(&app, 2, 1).await;

    let (status, json) = send(&app, get("/orders?limit=2", 1)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["page"], 1);
    assert_eq!(json["page_size"], 2);
    assert_eq!(json["page_count"], 2);
    assert_eq!(json["orders"].as_array().unwrap().len(), 2);

    let (_, json) = send(&app, get("/orders?limit=2&page=2", 1)).await;
    assert_eq!(json["orders"].as_array().unwrap().len(), 1);

    let (_, json) = send(&app, get("/orders?status=cancelled", 1)).await;
    assert_eq!(json["total"], 0);

    let (_, json) = send(&app, get("/orders?payment_method=credit_card", 1)).await;
    assert_eq!(json["total"], 0);

    let (_, json) = send(&app, get("/orders?payment_method=%20bank_transfer%20", 1)).await;
    assert_eq!(json["total"], 3);

    let (status, _) = send(&app, get("/orders?status=lost", 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/orders?page=abc", 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_buyer_cancels_order_once() {
    let (app, store) = setup();
    let order_id = place_order(&app, 1, 2).await;
    let uri = format!("/orders/{order_id}/cancel");

    let (status, _) = send(&app, post(&uri, Some(2), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(&app, post(&uri, Some(1), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
    assert!(json["cancelled_at"].is_string());
    assert_eq!(store.product(ProductId::new(1)).unwrap().stock, 3);

    let (status, _) = send(&app, post(&uri, Some(1), json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_operator_moves_order_through_lifecycle() {
    let (app, _) = setup();
    let order_id = place_order(&app, 1, 1).await;
    let uri = format!("/internal/orders/{order_id}/status");

    let (status, _) = send(&app, post(&uri, None, json!({ "status": "shipped" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    for target in ["confirmed", "paid"] {
        let (status, json) = send(&app, post(&uri, None, json!({ "status": target }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], target);
    }

    let (status, json) = send(
        &app,
        post(
            &uri,
            None,
            json!({ "status": "shipped", "tracking_number": "JNE-123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["shipping_tracking"], "JNE-123");
    assert!(json["shipped_at"].is_string());

    let (status, _) = send(&app, post(&uri, None, json!({ "status": "unknown" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    place_order(&app, 1, 1).await;

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
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}
