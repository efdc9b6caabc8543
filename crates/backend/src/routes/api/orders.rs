//! Order API route handlers.
//!
//! ```text
//! GET  /api/orders/               - All orders (staff)
//! POST /api/orders/add/           - Place order (201)
//! GET  /api/orders/myorders/      - Caller's orders
//! GET  /api/orders/{id}/          - Order detail (owner or staff)
//! PUT  /api/orders/{id}/pay/      - Mark paid (owner or staff)
//! PUT  /api/orders/{id}/deliver/  - Mark delivered (staff)
//! ```
//!
//! Marking an order paid only records the fact; no payment provider is
//! involved.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use cheap_electra_core::{Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::{ApiJson, ApiPath, existing_user};
use crate::db::RepositoryError;
use crate::db::orders::OrderRepository;
use crate::error::{AppError, FieldErrors, Result, add_breadcrumb};
use crate::middleware::{RequireAuth, RequireStaff};
use crate::models::{
    CurrentUser, NewOrder, NewOrderItem, NewShippingAddress, Order, OrderDetails, OrderItem,
    ShippingAddress,
};
use crate::routes::assets::media_url_prefix;
use crate::state::AppState;

const BLANK: &str = "This field may not be blank.";

// =============================================================================
// Views
// =============================================================================

/// Order as serialized by the API.
///
/// Listings leave out `orderItems` and `shippingAddress`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: OrderId,
    pub user: Option<UserId>,
    pub payment_method: String,
    pub tax_price: Money,
    pub shipping_price: Money,
    pub total_price: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_items: Option<Vec<OrderItemView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddressView>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user: order.user_id,
            payment_method: order.payment_method.clone(),
            tax_price: order.tax_price,
            shipping_price: order.shipping_price,
            total_price: order.total_price,
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
            status: order.status(),
            order_items: None,
            shipping_address: None,
        }
    }
}

impl OrderView {
    fn with_details(details: &OrderDetails, media_prefix: &str) -> Self {
        Self {
            order_items: Some(
                details
                    .items
                    .iter()
                    .map(|item| OrderItemView::new(item, media_prefix))
                    .collect(),
            ),
            shipping_address: details
                .shipping_address
                .as_ref()
                .map(ShippingAddressView::from),
            ..Self::from(&details.order)
        }
    }
}

/// Line item as serialized by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: OrderItemId,
    pub product: Option<ProductId>,
    pub name: String,
    pub qty: i32,
    pub price: Money,
    pub image: Option<String>,
}

impl OrderItemView {
    fn new(item: &OrderItem, media_prefix: &str) -> Self {
        Self {
            id: item.id,
            product: item.product_id,
            name: item.name.clone(),
            qty: item.qty,
            price: item.price,
            image: item.image.as_ref().map(|path| format!("{media_prefix}{path}")),
        }
    }
}

/// Shipping address as serialized by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressView {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub shipping_price: Option<Money>,
}

impl From<&ShippingAddress> for ShippingAddressView {
    fn from(address: &ShippingAddress) -> Self {
        Self {
            address: address.address.clone(),
            city: address.city.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
            shipping_price: address.shipping_price,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Order placement body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub order_items: Vec<OrderItemRequest>,
    pub shipping_address: Option<ShippingAddressRequest>,
    pub payment_method: Option<String>,
    pub tax_price: Option<Decimal>,
    pub shipping_price: Option<Decimal>,
    pub total_price: Option<Decimal>,
}

/// A requested line item. Other keys sent by clients (name, price) are ignored.
#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product: ProductId,
    pub qty: i64,
}

/// Shipping address body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressRequest {
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

fn required_text(errors: &mut FieldErrors, field: &str, value: Option<String>) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value,
        Some(_) => {
            errors.add(field, BLANK);
            String::new()
        }
        None => {
            errors.add(field, "This field is required.");
            String::new()
        }
    }
}

fn amount(errors: &mut FieldErrors, field: &str, value: Option<Decimal>) -> Money {
    match value.map(Money::new) {
        None => Money::ZERO,
        Some(Ok(money)) => money,
        Some(Err(e)) => {
            errors.add(field, e.to_string());
            Money::ZERO
        }
    }
}

impl OrderRequest {
    /// Validate into a new order for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest("No order items")` for an empty item list, checked
    /// before anything else, then field errors for the remaining fields.
    pub fn into_new_order(self, user_id: UserId) -> Result<NewOrder> {
        if self.order_items.is_empty() {
            return Err(AppError::BadRequest("No order items".to_string()));
        }

        let mut errors = FieldErrors::new();

        let items: Vec<NewOrderItem> = self
            .order_items
            .iter()
            .filter_map(|item| match i32::try_from(item.qty) {
                Ok(qty) if qty >= 1 => Some(NewOrderItem {
                    product_id: item.product,
                    qty,
                }),
                _ => {
                    errors.add(
                        "orderItems",
                        format!("Invalid quantity for product {}.", item.product),
                    );
                    None
                }
            })
            .collect();

        let address = self.shipping_address.unwrap_or_default();
        let shipping_address = NewShippingAddress {
            address: required_text(&mut errors, "shippingAddress.address", address.address),
            city: required_text(&mut errors, "shippingAddress.city", address.city),
            postal_code: required_text(
                &mut errors,
                "shippingAddress.postalCode",
                address.postal_code,
            ),
            country: required_text(&mut errors, "shippingAddress.country", address.country),
        };

        let payment_method = required_text(&mut errors, "paymentMethod", self.payment_method);
        let tax_price = amount(&mut errors, "taxPrice", self.tax_price);
        let shipping_price = amount(&mut errors, "shippingPrice", self.shipping_price);
        let total_price = amount(&mut errors, "totalPrice", self.total_price);

        errors.into_result()?;

        Ok(NewOrder {
            user_id,
            payment_method,
            tax_price,
            shipping_price,
            total_price,
            items,
            shipping_address,
        })
    }
}

fn order_not_found() -> AppError {
    AppError::NotFound("Order not found".to_string())
}

fn can_access(order: &Order, user: &CurrentUser) -> bool {
    user.is_staff || order.is_owned_by(user.id)
}

// =============================================================================
// Handlers
// =============================================================================

/// Place an order. Stock is taken in the same transaction.
#[instrument(skip(state, current, req), fields(user_id = %current.id))]
pub async fn add_order(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(req): ApiJson<OrderRequest>,
) -> Result<(StatusCode, Json<OrderView>)> {
    let new_order = req.into_new_order(current.id)?;
    existing_user(&state, current.id).await?;

    let details = OrderRepository::new(state.pool())
        .create(&new_order)
        .await?;

    tracing::info!(
        order_id = %details.order.id,
        items = details.items.len(),
        total = %details.order.total_price,
        "Order placed"
    );

    let config = state.config();
    let prefix = media_url_prefix(config.debug, &config.assets);
    Ok((
        StatusCode::CREATED,
        Json(OrderView::with_details(&details, &prefix)),
    ))
}

/// The caller's orders.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn my_orders(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Vec<OrderView>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(current.id)
        .await?;
    Ok(Json(orders.iter().map(OrderView::from).collect()))
}

/// All orders.
#[instrument(skip(state, _staff))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
) -> Result<Json<Vec<OrderView>>> {
    let orders = OrderRepository::new(state.pool()).list_all().await?;
    Ok(Json(orders.iter().map(OrderView::from).collect()))
}

/// One order with items and shipping address.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn get_order(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderView>> {
    let details = OrderRepository::new(state.pool())
        .get_details(id)
        .await?
        .ok_or_else(order_not_found)?;

    if !can_access(&details.order, &current) {
        return Err(AppError::Forbidden(
            "Not authorized to view this order".to_string(),
        ));
    }

    let config = state.config();
    let prefix = media_url_prefix(config.debug, &config.assets);
    Ok(Json(OrderView::with_details(&details, &prefix)))
}

/// Record payment. Paying twice keeps the first timestamp.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn pay_order(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderView>> {
    let orders = OrderRepository::new(state.pool());

    let order = orders.get_by_id(id).await?.ok_or_else(order_not_found)?;
    if !can_access(&order, &current) {
        return Err(AppError::Forbidden(
            "Not authorized to pay for this order".to_string(),
        ));
    }

    let order = orders.mark_paid(id).await?;

    let order_id = id.to_string();
    add_breadcrumb("order", "Order marked paid", Some(&[("order_id", order_id.as_str())]));
    tracing::info!(order_id = %id, "Order marked paid");

    Ok(Json(OrderView::from(&order)))
}

/// Record delivery.
#[instrument(skip(state, staff), fields(staff_id = %staff.id))]
pub async fn deliver_order(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderView>> {
    let order = OrderRepository::new(state.pool())
        .mark_delivered(id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => order_not_found(),
            other => AppError::Database(other),
        })?;

    let order_id = id.to_string();
    add_breadcrumb("order", "Order marked delivered", Some(&[("order_id", order_id.as_str())]));
    tracing::info!(order_id = %id, "Order marked delivered");

    Ok(Json(OrderView::from(&order)))
}

/// Create the order routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders/", get(list_orders))
        .route("/api/orders/add/", post(add_order))
        .route("/api/orders/myorders/", get(my_orders))
        .route("/api/orders/{id}/", get(get_order))
        .route("/api/orders/{id}/pay/", put(pay_order))
        .route("/api/orders/{id}/deliver/", put(deliver_order))
}
