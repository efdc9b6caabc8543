//! Whole-database export in fixture form.
//!
//! The output is a JSON array of records:
//!
//! ```json
//! [
//!   {"model": "auth.user", "fields": {"username": "admin", ...}},
//!   {"model": "base.product", "pk": 1, "fields": {"user": ["admin"], ...}}
//! ]
//! ```
//!
//! Users are identified by their natural key: they are written without a
//! `pk` and referenced from other records as `["<username>"]`, so a dump can
//! be loaded into a database whose user IDs differ.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use thiserror::Error;

use cheap_electra_core::UserId;

use crate::db::RepositoryError;
use crate::db::orders::OrderRepository;
use crate::db::products::ProductRepository;
use crate::db::users::UserRepository;
use crate::models::{OrderDetails, Product, Review, User};

/// Default output file, relative to the working directory.
pub const DEFAULT_OUTPUT: &str = "data_dump.json";

/// Labels excluded unless the caller overrides them.
pub const DEFAULT_EXCLUDES: [&str; 2] = ["contenttypes", "auth.permission"];

pub const USER_MODEL: &str = "auth.user";
pub const PRODUCT_MODEL: &str = "base.product";
pub const REVIEW_MODEL: &str = "base.review";
pub const ORDER_MODEL: &str = "base.order";
pub const ORDER_ITEM_MODEL: &str = "base.orderitem";
pub const SHIPPING_ADDRESS_MODEL: &str = "base.shippingaddress";

/// Errors that can occur during an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureRecord {
    pub model: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pk: Option<i32>,
    pub fields: Value,
}

/// Model labels to leave out of an export.
///
/// A label is either a whole app (`contenttypes`) or one model
/// (`auth.permission`). Matching ignores case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusions {
    apps: HashSet<String>,
    models: HashSet<String>,
}

impl Exclusions {
    /// Build from a list of labels.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut apps = HashSet::new();
        let mut models = HashSet::new();
        for label in labels {
            let label = label.as_ref().trim().to_ascii_lowercase();
            if label.is_empty() {
                continue;
            }
            if label.contains('.') {
                models.insert(label);
            } else {
                apps.insert(label);
            }
        }
        Self { apps, models }
    }

    /// Whether records of `model` (an `app.model` label) are left out.
    #[must_use]
    pub fn excludes(&self, model: &str) -> bool {
        let model = model.to_ascii_lowercase();
        let app = model.split_once('.').map_or(model.as_str(), |(app, _)| app);
        self.apps.contains(app) || self.models.contains(&model)
    }
}

impl Default for Exclusions {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDES)
    }
}

/// Everything in the database, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Users with their password hash, if one is set.
    pub users: Vec<(User, Option<String>)>,
    pub products: Vec<Product>,
    pub reviews: Vec<Review>,
    pub orders: Vec<OrderDetails>,
}

impl Snapshot {
    /// Read all tables from one consistent view of the database.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Repository` if a query fails.
    pub async fn load(pool: &PgPool) -> Result<Self, ExportError> {
        let mut tx = pool.begin().await.map_err(RepositoryError::from)?;

        // Later statements see the snapshot taken by the first query
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        let snapshot = Self {
            users: UserRepository::list_with_password_hashes(&mut *tx).await?,
            products: ProductRepository::list_all(&mut *tx).await?,
            reviews: ProductRepository::list_all_reviews(&mut *tx).await?,
            orders: OrderRepository::list_all_details(&mut *tx).await?,
        };

        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(snapshot)
    }

    /// Convert to fixture records, users first so references resolve on load.
    #[must_use]
    pub fn to_fixtures(&self, exclusions: &Exclusions) -> Vec<FixtureRecord> {
        let usernames: HashMap<UserId, &str> = self
            .users
            .iter()
            .map(|(user, _)| (user.id, user.username.as_str()))
            .collect();
        let user_key = |id: Option<UserId>| -> Value {
            id.and_then(|id| usernames.get(&id))
                .map_or(Value::Null, |username| json!([username]))
        };

        let mut records = Vec::new();

        if !exclusions.excludes(USER_MODEL) {
            records.extend(self.users.iter().map(|(user, password_hash)| FixtureRecord {
                model: USER_MODEL,
                pk: None,
                fields: json!({
                    "password": password_hash.as_deref().unwrap_or_default(),
                    "last_login": user.last_login,
                    "username": user.username.as_str(),
                    "first_name": user.first_name,
                    "email": user.email.as_ref().map_or("", |e| e.as_str()),
                    "is_staff": user.is_staff,
                    "is_active": user.is_active,
                    "date_joined": user.date_joined,
                }),
            }));
        }

        if !exclusions.excludes(PRODUCT_MODEL) {
            records.extend(self.products.iter().map(|product| FixtureRecord {
                model: PRODUCT_MODEL,
                pk: Some(product.id.as_i32()),
                fields: json!({
                    "user": user_key(product.user_id),
                    "name": product.name,
                    "image": product.image,
                    "brand": product.brand,
                    "category": product.category,
                    "description": product.description,
                    "rating": product.rating,
                    "num_reviews": product.num_reviews,
                    "price": product.price,
                    "count_in_stock": product.count_in_stock,
                    "created_at": product.created_at,
                }),
            }));
        }

        if !exclusions.excludes(REVIEW_MODEL) {
            records.extend(self.reviews.iter().map(|review| FixtureRecord {
                model: REVIEW_MODEL,
                pk: Some(review.id.as_i32()),
                fields: json!({
                    "product": review.product_id,
                    "user": user_key(review.user_id),
                    "name": review.name,
                    "rating": review.rating,
                    "comment": review.comment,
                    "created_at": review.created_at,
                }),
            }));
        }

        for details in &self.orders {
            let order = &details.order;

            if !exclusions.excludes(ORDER_MODEL) {
                records.push(FixtureRecord {
                    model: ORDER_MODEL,
                    pk: Some(order.id.as_i32()),
                    fields: json!({
                        "user": user_key(order.user_id),
                        "payment_method": order.payment_method,
                        "tax_price": order.tax_price,
                        "shipping_price": order.shipping_price,
                        "total_price": order.total_price,
                        "is_paid": order.is_paid,
                        "paid_at": order.paid_at,
                        "is_delivered": order.is_delivered,
                        "delivered_at": order.delivered_at,
                        "created_at": order.created_at,
                    }),
                });
            }

            if !exclusions.excludes(ORDER_ITEM_MODEL) {
                records.extend(details.items.iter().map(|item| FixtureRecord {
                    model: ORDER_ITEM_MODEL,
                    pk: Some(item.id.as_i32()),
                    fields: json!({
                        "product": item.product_id,
                        "order": item.order_id,
                        "name": item.name,
                        "qty": item.qty,
                        "price": item.price,
                        "image": item.image,
                    }),
                }));
            }

            if let Some(address) = &details.shipping_address
                && !exclusions.excludes(SHIPPING_ADDRESS_MODEL)
            {
                records.push(FixtureRecord {
                    model: SHIPPING_ADDRESS_MODEL,
                    pk: Some(order.id.as_i32()),
                    fields: json!({
                        "order": order.id,
                        "address": address.address,
                        "city": address.city,
                        "postal_code": address.postal_code,
                        "country": address.country,
                        "shipping_price": address.shipping_price,
                    }),
                });
            }
        }

        records
    }
}

/// Write records to `path`, replacing whatever the file held before.
///
/// # Errors
///
/// Returns `ExportError::Io` if the file cannot be written.
pub fn write_snapshot(path: &Path, records: &[FixtureRecord]) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Export the database to `path`. Returns the number of records written.
///
/// # Errors
///
/// Returns `ExportError` if reading the database or writing the file fails.
pub async fn dump(
    pool: &PgPool,
    path: &Path,
    exclusions: &Exclusions,
) -> Result<usize, ExportError> {
    let records = Snapshot::load(pool).await?.to_fixtures(exclusions);
    write_snapshot(path, &records)?;

    tracing::info!(path = %path.display(), records = records.len(), "Database exported");

    Ok(records.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use cheap_electra_core::{Email, Money, OrderId, OrderItemId, ProductId, ReviewId, Username};

    use super::*;
    use crate::models::{Order, OrderItem, ShippingAddress};

    fn snapshot() -> Snapshot {
        let now = Utc::now();
        let user = User {
            id: UserId::new(41),
            username: Username::parse("admin").unwrap(),
            email: Some(Email::parse("admin@example.com").unwrap()),
            first_name: "Admin".to_string(),
            is_staff: true,
            is_active: true,
            last_login: None,
            date_joined: now,
        };
        let product = Product {
            id: ProductId::new(1),
            user_id: Some(UserId::new(41)),
            name: "Airpods".to_string(),
            image: Some("airpods.jpg".to_string()),
            brand: "Apple".to_string(),
            category: "Electronics".to_string(),
            description: String::new(),
            rating: Decimal::new(4, 0),
            num_reviews: 1,
            price: Money::new(Decimal::new(8999, 2)).unwrap(),
            count_in_stock: 10,
            created_at: now,
        };
        let review = Review {
            id: ReviewId::new(5),
            product_id: ProductId::new(1),
            user_id: None,
            name: "Gone".to_string(),
            rating: 4,
            comment: "Fine".to_string(),
            created_at: now,
        };
        let order = OrderDetails {
            order: Order {
                id: OrderId::new(7),
                user_id: Some(UserId::new(41)),
                payment_method: "PayPal".to_string(),
                tax_price: Money::ZERO,
                shipping_price: Money::ZERO,
                total_price: Money::new(Decimal::new(8999, 2)).unwrap(),
                is_paid: false,
                paid_at: None,
                is_delivered: false,
                delivered_at: None,
                created_at: now,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(3),
                order_id: OrderId::new(7),
                product_id: Some(ProductId::new(1)),
                name: "Airpods".to_string(),
                qty: 1,
                price: Money::new(Decimal::new(8999, 2)).unwrap(),
                image: None,
            }],
            shipping_address: Some(ShippingAddress {
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
                shipping_price: None,
            }),
        };

        Snapshot {
            users: vec![(user, Some("$argon2id$v=19$hash".to_string()))],
            products: vec![product],
            reviews: vec![review],
            orders: vec![order],
        }
    }

    #[test]
    fn test_default_exclusions() {
        let exclusions = Exclusions::default();
        assert!(exclusions.excludes("contenttypes.contenttype"));
        assert!(exclusions.excludes("auth.permission"));
        assert!(exclusions.excludes("Auth.Permission"));
        assert!(!exclusions.excludes(USER_MODEL));
        assert!(!exclusions.excludes(PRODUCT_MODEL));
    }

    #[test]
    fn test_app_exclusion_covers_all_models() {
        let exclusions = Exclusions::new(["BASE", " "]);
        let records = snapshot().to_fixtures(&exclusions);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, USER_MODEL);
    }

    #[test]
    fn test_fixture_labels_and_order() {
        let records = snapshot().to_fixtures(&Exclusions::default());
        let models: Vec<&str> = records.iter().map(|r| r.model).collect();
        assert_eq!(
            models,
            vec![
                USER_MODEL,
                PRODUCT_MODEL,
                REVIEW_MODEL,
                ORDER_MODEL,
                ORDER_ITEM_MODEL,
                SHIPPING_ADDRESS_MODEL,
            ]
        );
    }

    #[test]
    fn test_users_use_natural_keys() {
        let records = snapshot().to_fixtures(&Exclusions::default());
        let json = serde_json::to_value(&records).unwrap();

        assert!(json[0].get("pk").is_none());
        assert_eq!(json[0]["fields"]["username"], "admin");
        assert_eq!(json[0]["fields"]["password"], "$argon2id$v=19$hash");

        assert_eq!(json[1]["pk"], 1);
        assert_eq!(json[1]["fields"]["user"], json!(["admin"]));
        assert_eq!(json[1]["fields"]["price"], "89.99");
        assert!(json[2]["fields"]["user"].is_null());
        assert_eq!(json[3]["fields"]["user"], json!(["admin"]));
        assert_eq!(json[5]["pk"], 7);
    }

    #[test]
    fn test_excluding_one_model() {
        let exclusions = Exclusions::new(["base.orderitem"]);
        let records = snapshot().to_fixtures(&exclusions);
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.model != ORDER_ITEM_MODEL));
    }

    #[test]
    fn test_write_snapshot_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_OUTPUT);
        std::fs::write(&path, "x".repeat(100_000)).unwrap();

        let records = snapshot().to_fixtures(&Exclusions::default());
        write_snapshot(&path, &records).unwrap();

        let written: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.len(), records.len());

        write_snapshot(&path, &[]).unwrap();
        let written: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.is_empty());
    }
}
