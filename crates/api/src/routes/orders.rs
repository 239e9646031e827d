//! Order placement, lookup, listing and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Money, Order, OrderLine, OrderStatus, PlaceOrder, ProductSnapshot};
use engine::{OrderAssembler, OrderLifecycleService, OrderQueries};
use serde::{Deserialize, Serialize};
use store::{OrderFilter, OrderPage, OrderScope, OrderStore};

use super::auth::AuthenticatedBuyer;
use crate::error::ApiError;

/// Store handle shared by every engine service.
pub type SharedStore = Arc<dyn OrderStore>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub assembler: OrderAssembler<SharedStore>,
    pub queries: OrderQueries<SharedStore>,
    pub lifecycle: OrderLifecycleService<SharedStore>,
    /// Name of the configured store backend, reported by `/health`.
    pub backend: &'static str,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub address_id: i64,
    #[serde(default)]
    pub shipping_cost_cents: i64,
    pub payment_method: String,
    pub shipping_courier: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl CreateOrderRequest {
    fn into_command(self, buyer: AuthenticatedBuyer) -> PlaceOrder {
        let mut command = PlaceOrder::new(
            buyer.0,
            self.address_id,
            Money::from_cents(self.shipping_cost_cents),
            self.payment_method,
        );
        if let Some(courier) = self.shipping_courier {
            command = command.with_courier(courier);
        }
        self.items.into_iter().fold(command, |command, item| {
            command.with_item(
                item.product_id,
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        })
    }
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub invoice_number: String,
    pub total_cents: i64,
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub invoice_number: String,
    pub buyer_id: i64,
    pub address_id: i64,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub shipping_cost_cents: i64,
    pub payment_method: String,
    pub shipping_courier: Option<String>,
    pub shipping_tracking: Option<String>,
    pub lines: Vec<OrderLineResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub snapshot: SnapshotResponse,
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub product_name: String,
    pub description: String,
    pub price_cents: i64,
    pub weight_grams: u32,
    pub images: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub page_count: u64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let lifecycle = order.lifecycle();
        Self {
            id: order.id().to_string(),
            invoice_number: order.invoice_number().to_string(),
            buyer_id: order.buyer_id().as_i64(),
            address_id: order.address_id().as_i64(),
            status: order.status(),
            total_cents: order.total_amount().cents(),
            shipping_cost_cents: order.shipping_cost().cents(),
            payment_method: order.payment_method().to_string(),
            shipping_courier: order.shipping_courier().map(String::from),
            shipping_tracking: order.shipping_tracking().map(String::from),
            lines: order.lines().iter().map(OrderLineResponse::from).collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            confirmed_at: lifecycle.confirmed_at(),
            paid_at: lifecycle.paid_at(),
            shipped_at: lifecycle.shipped_at(),
            completed_at: lifecycle.completed_at(),
            cancelled_at: lifecycle.cancelled_at(),
        }
    }
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.as_i64(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            snapshot: SnapshotResponse::from(&line.snapshot),
        }
    }
}

impl From<&ProductSnapshot> for SnapshotResponse {
    fn from(snapshot: &ProductSnapshot) -> Self {
        Self {
            product_name: snapshot.product_name.clone(),
            description: snapshot.description.clone(),
            price_cents: snapshot.price.cents(),
            weight_grams: snapshot.weight.grams(),
            images: snapshot.images.clone(),
            captured_at: snapshot.captured_at,
        }
    }
}

impl From<OrderPage> for OrderListResponse {
    fn from(page: OrderPage) -> Self {
        Self {
            orders: page.orders.iter().map(OrderResponse::from).collect(),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            page_count: page.page_count(),
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for the authenticated buyer.
#[tracing::instrument(skip(state, payload), fields(buyer_id = %buyer.0))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    buyer: AuthenticatedBuyer,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(req) = payload?;
    let order = state.assembler.create_order(req.into_command(buyer)).await?;

    let response = OrderCreatedResponse {
        order_id: order.id().to_string(),
        invoice_number: order.invoice_number().to_string(),
        total_cents: order.total_amount().cents(),
        status: order.status(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id}: one of the buyer's orders with lines and snapshots.
#[tracing::instrument(skip(state), fields(buyer_id = %buyer.0))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    buyer: AuthenticatedBuyer,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.queries.get(order_id, buyer.0).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders: the buyer's orders, newest first.
#[tracing::instrument(skip(state, query), fields(buyer_id = %buyer.0))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    buyer: AuthenticatedBuyer,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let Query(query) = query?;

    let mut filter = OrderFilter::for_buyer(buyer.0);
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        filter = filter.status(parse_status(status)?);
    }
    if let Some(method) = query.payment_method.filter(|m| !m.trim().is_empty()) {
        filter = filter.payment_method(method);
    }
    if let Some(page) = query.page {
        filter = filter.page(page);
    }
    if let Some(limit) = query.limit {
        filter = filter.page_size(limit);
    }

    let page = state.queries.list(&filter).await?;
    Ok(Json(OrderListResponse::from(page)))
}

/// POST /orders/{id}/cancel: the buyer cancels one of their orders.
#[tracing::instrument(skip(state), fields(buyer_id = %buyer.0))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    buyer: AuthenticatedBuyer,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.lifecycle.cancel(order_id, buyer.0).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /internal/orders/{id}/status: operator status change.
///
/// Only reachable from inside the trusted network; no buyer scope applies.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload?;
    let target = parse_status(&req.status)?;

    let order = state
        .lifecycle
        .transition(order_id, OrderScope::Operator, target, req.tracking_number)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

fn parse_status(status: &str) -> Result<OrderStatus, ApiError> {
    status
        .parse()
        .map_err(|e: domain::OrderError| ApiError::BadRequest(e.to_string()))
}
