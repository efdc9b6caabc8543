//! Order repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use cheap_electra_core::{Money, OrderId, OrderItemId, ProductId, UserId};

use super::RepositoryError;
use crate::models::order::{NewOrder, Order, OrderDetails, OrderItem, ShippingAddress};

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.payment_method, o.tax_price, o.shipping_price, \
                             o.total_price, o.is_paid, o.paid_at, o.is_delivered, \
                             o.delivered_at, o.created_at";

const ITEM_COLUMNS: &str = "i.id, i.order_id, i.product_id, i.name, i.qty, i.price, i.image";

const ADDRESS_COLUMNS: &str =
    "a.order_id, a.address, a.city, a.postal_code, a.country, a.shipping_price";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: Option<i32>,
    payment_method: String,
    tax_price: Decimal,
    shipping_price: Decimal,
    total_price: Decimal,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let money = |field: &str, value: Decimal| {
            Money::new(value).map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid {field} for order {}: {e}", row.id))
            })
        };

        Ok(Self {
            id: OrderId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            tax_price: money("tax_price", row.tax_price)?,
            shipping_price: money("shipping_price", row.shipping_price)?,
            total_price: money("total_price", row.total_price)?,
            payment_method: row.payment_method,
            is_paid: row.is_paid,
            paid_at: row.paid_at,
            is_delivered: row.is_delivered,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: Option<i32>,
    name: String,
    qty: i32,
    price: Decimal,
    image: Option<String>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let price = Money::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for order item {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: row.product_id.map(ProductId::new),
            name: row.name,
            qty: row.qty,
            price,
            image: row.image,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShippingAddressRow {
    order_id: i32,
    address: String,
    city: String,
    postal_code: String,
    country: String,
    shipping_price: Option<Decimal>,
}

impl TryFrom<ShippingAddressRow> for ShippingAddress {
    type Error = RepositoryError;

    fn try_from(row: ShippingAddressRow) -> Result<Self, Self::Error> {
        let shipping_price = row.shipping_price.map(Money::new).transpose().map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "invalid shipping price for order {}: {e}",
                row.order_id
            ))
        })?;

        Ok(Self {
            address: row.address,
            city: row.city,
            postal_code: row.postal_code,
            country: row.country,
            shipping_price,
        })
    }
}

/// Product fields copied onto an order item.
#[derive(Debug, sqlx::FromRow)]
struct ProductSnapshotRow {
    name: String,
    price: Decimal,
    image: Option<String>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order.
    ///
    /// In one transaction: inserts the order, snapshots each product's name,
    /// price and image onto its line item, decrements product stock by the
    /// ordered quantity and stores the shipping address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a product doesn't exist or has
    /// too little stock. Returns `RepositoryError::Database` for other
    /// database errors. Nothing is written on error.
    pub async fn create(&self, new_order: &NewOrder) -> Result<OrderDetails, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO shop.order AS o
                (user_id, payment_method, tax_price, shipping_price, total_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(new_order.user_id)
        .bind(&new_order.payment_method)
        .bind(new_order.tax_price.amount())
        .bind(new_order.shipping_price.amount())
        .bind(new_order.total_price.amount())
        .fetch_one(&mut *tx)
        .await?;

        let order = Order::try_from(order_row)?;
        let mut items = Vec::with_capacity(new_order.items.len());

        for item in &new_order.items {
            let snapshot: Option<ProductSnapshotRow> =
                sqlx::query_as("SELECT name, price, image FROM shop.product WHERE id = $1")
                    .bind(item.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(snapshot) = snapshot else {
                return Err(RepositoryError::Conflict(format!(
                    "Product {} does not exist",
                    item.product_id
                )));
            };

            let row: OrderItemRow = sqlx::query_as(&format!(
                r"
                INSERT INTO shop.order_item AS i (order_id, product_id, name, qty, price, image)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {ITEM_COLUMNS}
                "
            ))
            .bind(order.id)
            .bind(item.product_id)
            .bind(&snapshot.name)
            .bind(item.qty)
            .bind(snapshot.price)
            .bind(snapshot.image.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "invalid order item"))?;
            items.push(OrderItem::try_from(row)?);

            sqlx::query(
                "UPDATE shop.product SET count_in_stock = count_in_stock - $2 WHERE id = $1",
            )
            .bind(item.product_id)
            .bind(item.qty)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                RepositoryError::from_constraint(
                    e,
                    &format!("Not enough stock for {}", snapshot.name),
                )
            })?;
        }

        let address = &new_order.shipping_address;
        let address_row: ShippingAddressRow = sqlx::query_as(&format!(
            r"
            INSERT INTO shop.shipping_address AS a
                (order_id, address, city, postal_code, country, shipping_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ADDRESS_COLUMNS}
            "
        ))
        .bind(order.id)
        .bind(&address.address)
        .bind(&address.city)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(new_order.shipping_price.amount())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(OrderDetails {
            order,
            items,
            shipping_address: Some(address_row.try_into()?),
        })
    }

    /// All orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order o ORDER BY o.created_at DESC, o.id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Orders placed by one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM shop.order o
            WHERE o.user_id = $1
            ORDER BY o.created_at DESC, o.id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get an order by ID, without items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order o WHERE o.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get an order with its items and shipping address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_details(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let Some(order) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM shop.order_item i WHERE i.order_id = $1 ORDER BY i.id"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let address_row: Option<ShippingAddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM shop.shipping_address a WHERE a.order_id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(Some(OrderDetails {
            order,
            items: item_rows
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
            shipping_address: address_row.map(TryInto::try_into).transpose()?,
        }))
    }

    /// Record payment. Marking an already paid order keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn mark_paid(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE shop.order AS o
            SET is_paid = TRUE,
                paid_at = COALESCE(o.paid_at, NOW())
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Record delivery. Marking an already delivered order keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn mark_delivered(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE shop.order AS o
            SET is_delivered = TRUE,
                delivered_at = COALESCE(o.delivered_at, NOW())
            WHERE o.id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Every order with its items and address, by order ID (for export).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_all_details(
        conn: &mut PgConnection,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        let order_rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.order o ORDER BY o.id ASC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM shop.order_item i ORDER BY i.id ASC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        let address_rows: Vec<ShippingAddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM shop.shipping_address a"
        ))
        .fetch_all(&mut *conn)
        .await?;

        let mut items_by_order: HashMap<i32, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items_by_order
                .entry(row.order_id)
                .or_default()
                .push(row.try_into()?);
        }

        let mut addresses: HashMap<i32, ShippingAddress> = HashMap::new();
        for row in address_rows {
            addresses.insert(row.order_id, row.try_into()?);
        }

        order_rows
            .into_iter()
            .map(|row| {
                let key = row.id;
                Ok(OrderDetails {
                    order: row.try_into()?,
                    items: items_by_order.remove(&key).unwrap_or_default(),
                    shipping_address: addresses.remove(&key),
                })
            })
            .collect()
    }

    /// Count all orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shop.order")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
