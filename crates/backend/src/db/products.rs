//! Product and review repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use cheap_electra_core::{Money, ProductId, ReviewId, UserId};

use super::RepositoryError;
use crate::models::product::{
    NewProduct, NewReview, Product, ProductChanges, ProductDetails, Review,
};

const PRODUCT_COLUMNS: &str = "p.id, p.user_id, p.name, p.image, p.brand, p.category, \
                               p.description, p.rating, p.num_reviews, p.price, \
                               p.count_in_stock, p.created_at";

const REVIEW_COLUMNS: &str = "r.id, r.product_id, r.user_id, r.name, r.rating, r.comment, \
                              r.created_at";

/// Number of products returned by [`ProductRepository::top`].
pub const TOP_PRODUCTS_LIMIT: i64 = 5;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    user_id: Option<i32>,
    name: String,
    image: Option<String>,
    brand: String,
    category: String,
    description: String,
    rating: Decimal,
    num_reviews: i32,
    price: Decimal,
    count_in_stock: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Money::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for product {}: {e}", row.id))
        })?;

        Ok(Self {
            id: ProductId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            name: row.name,
            image: row.image.filter(|i| !i.is_empty()),
            brand: row.brand,
            category: row.category,
            description: row.description,
            rating: row.rating,
            num_reviews: row.num_reviews,
            price,
            count_in_stock: row.count_in_stock,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    product_id: i32,
    user_id: Option<i32>,
    name: String,
    rating: i32,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: ReviewId::new(row.id),
            product_id: ProductId::new(row.product_id),
            user_id: row.user_id.map(UserId::new),
            name: row.name,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product and review database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products, newest first.
    ///
    /// With a keyword, only products whose name contains it
    /// (case-insensitively) are returned. A blank keyword matches everything.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, keyword: Option<&str>) -> Result<Vec<Product>, RepositoryError> {
        let keyword = keyword.filter(|k| !k.is_empty());

        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}
            FROM shop.product p
            WHERE $1::TEXT IS NULL OR strpos(lower(p.name), lower($1)) > 0
            ORDER BY p.created_at DESC, p.id DESC
            "
        ))
        .bind(keyword)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// The highest rated products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}
            FROM shop.product p
            ORDER BY p.rating DESC, p.num_reviews DESC, p.id ASC
            LIMIT $1
            "
        ))
        .bind(TOP_PRODUCTS_LIMIT)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a product together with its reviews (oldest review first).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_details(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductDetails>, RepositoryError> {
        let Some(product) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let reviews: Vec<ReviewRow> = sqlx::query_as(&format!(
            r"
            SELECT {REVIEW_COLUMNS}
            FROM shop.review r
            WHERE r.product_id = $1
            ORDER BY r.created_at ASC, r.id ASC
            "
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(ProductDetails {
            product,
            reviews: reviews.into_iter().map(Into::into).collect(),
        }))
    }

    /// Create a product owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a column constraint rejects the values.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        user_id: Option<UserId>,
        new_product: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        let row: ProductRow = sqlx::query_as(&format!(
            r"
            INSERT INTO shop.product AS p
                (user_id, name, price, brand, count_in_stock, category, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(&new_product.name)
        .bind(new_product.price.amount())
        .bind(&new_product.brand)
        .bind(new_product.count_in_stock)
        .bind(&new_product.category)
        .bind(&new_product.description)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "invalid product values"))?;

        row.try_into()
    }

    /// Apply a partial update to a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if a column constraint rejects the values.
    pub async fn update(
        &self,
        id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            r"
            UPDATE shop.product AS p
            SET name = COALESCE($2, p.name),
                price = COALESCE($3, p.price),
                brand = COALESCE($4, p.brand),
                count_in_stock = COALESCE($5, p.count_in_stock),
                category = COALESCE($6, p.category),
                description = COALESCE($7, p.description)
            WHERE p.id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.price.map(|p| p.amount()))
        .bind(changes.brand.as_deref())
        .bind(changes.count_in_stock)
        .bind(changes.category.as_deref())
        .bind(changes.description.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "invalid product values"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Point a product at a newly uploaded image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn set_image(&self, id: ProductId, image: &str) -> Result<Product, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            r"
            UPDATE shop.product AS p
            SET image = $2
            WHERE p.id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(image)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Delete a product and its reviews. Order items keep their snapshot.
    ///
    /// Returns `true` if the product was deleted, `false` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a review and recompute the product's rating and review count.
    ///
    /// Both writes happen in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the user already reviewed it.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_review(
        &self,
        product_id: ProductId,
        user_id: UserId,
        reviewer_name: &str,
        review: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i32,)> = sqlx::query_as("SELECT id FROM shop.product WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let row: ReviewRow = sqlx::query_as(&format!(
            r"
            INSERT INTO shop.review AS r (product_id, user_id, name, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REVIEW_COLUMNS}
            "
        ))
        .bind(product_id)
        .bind(user_id)
        .bind(reviewer_name)
        .bind(review.rating)
        .bind(&review.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "Product already reviewed"))?;

        sqlx::query(
            r"
            UPDATE shop.product
            SET num_reviews = stats.num_reviews,
                rating = stats.rating
            FROM (
                SELECT COUNT(*)::INTEGER AS num_reviews,
                       COALESCE(ROUND(AVG(rating), 2), 0) AS rating
                FROM shop.review
                WHERE product_id = $1
            ) AS stats
            WHERE id = $1
            ",
        )
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    /// All products, by ID (for export).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product p ORDER BY p.id ASC"
        ))
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// All reviews, by ID (for export).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all_reviews(conn: &mut PgConnection) -> Result<Vec<Review>, RepositoryError> {
        let rows: Vec<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {REVIEW_COLUMNS} FROM shop.review r ORDER BY r.id ASC"
        ))
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Count all products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shop.product")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
