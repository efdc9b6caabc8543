//! Catalog domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use cheap_electra_core::{Money, ProductId, ReviewId, UserId};

/// A catalog product (domain type).
///
/// Text fields are kept exactly as submitted: surrounding whitespace in
/// `name`, `brand` or `description` is significant and never trimmed.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    /// User who created the product, if still present.
    pub user_id: Option<UserId>,
    pub name: String,
    /// Media-relative path of the product image.
    pub image: Option<String>,
    pub brand: String,
    pub category: String,
    pub description: String,
    /// Mean review rating, 0 when there are no reviews.
    pub rating: Decimal,
    pub num_reviews: i32,
    pub price: Money,
    pub count_in_stock: i32,
    pub created_at: DateTime<Utc>,
}

/// A product together with its reviews.
#[derive(Debug, Clone)]
pub struct ProductDetails {
    pub product: Product,
    pub reviews: Vec<Review>,
}

/// A product review.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: Option<UserId>,
    /// Reviewer's display name at the time of review.
    pub name: String,
    /// 1 to 5.
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub brand: String,
    pub count_in_stock: i32,
    pub category: String,
    pub description: String,
}

impl NewProduct {
    /// The placeholder product created when no fields are supplied.
    ///
    /// Staff create a placeholder and then fill it in with an update.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            name: "Sample Name".to_string(),
            price: Money::ZERO,
            brand: "Sample Brand".to_string(),
            count_in_stock: 0,
            category: "Sample Category".to_string(),
            description: String::new(),
        }
    }
}

/// Partial update of a product. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub brand: Option<String>,
    pub count_in_stock: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Validated input for a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub rating: i32,
    pub comment: String,
}
