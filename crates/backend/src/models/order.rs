//! Order domain types.

use chrono::{DateTime, Utc};

use cheap_electra_core::{Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

/// A customer order (domain type).
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    /// Owner; `None` once the owning user has been deleted.
    pub user_id: Option<UserId>,
    pub payment_method: String,
    pub tax_price: Money,
    pub shipping_price: Money,
    pub total_price: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Lifecycle status derived from the paid/delivered flags.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        OrderStatus::from_flags(self.is_paid, self.is_delivered)
    }

    /// Whether `user_id` owns this order.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }
}

/// A line item, holding a snapshot of the product at order time.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the product has been deleted.
    pub product_id: Option<ProductId>,
    pub name: String,
    pub qty: i32,
    pub price: Money,
    pub image: Option<String>,
}

/// Where an order ships to.
#[derive(Debug, Clone)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub shipping_price: Option<Money>,
}

/// An order with its items and shipping address.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipping_address: Option<ShippingAddress>,
}

/// Validated input for placing an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_method: String,
    pub tax_price: Money,
    pub shipping_price: Money,
    pub total_price: Money,
    pub items: Vec<NewOrderItem>,
    pub shipping_address: NewShippingAddress,
}

/// A requested line item. Name, price and image are copied from the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub qty: i32,
}

/// Shipping address as submitted with an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}
