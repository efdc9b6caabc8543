//! Product API route handlers.
//!
//! ```text
//! GET    /api/products/               - List products (?keyword=)
//! GET    /api/products/top/           - Top rated products
//! POST   /api/products/create/        - Create product (authenticated)
//! POST   /api/products/upload/        - Upload product image (staff, multipart)
//! GET    /api/products/{id}/          - Product with reviews
//! POST   /api/products/{id}/reviews/  - Review product (authenticated)
//! PUT    /api/products/update/{id}/   - Update product (staff)
//! DELETE /api/products/delete/{id}/   - Delete product (staff)
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartRejection},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::instrument;
use uuid::Uuid;

use cheap_electra_core::{Money, MoneyError, ProductId, ReviewId, UserId};

use super::{ApiJson, ApiPath, existing_user};
use crate::db::RepositoryError;
use crate::db::products::ProductRepository;
use crate::error::{AppError, FieldErrors, Result};
use crate::middleware::{RequireAuth, RequireStaff};
use crate::models::{NewProduct, NewReview, Product, ProductChanges, ProductDetails, Review};
use crate::routes::assets::{media_dir, media_url_prefix};
use crate::state::AppState;

/// Largest accepted image upload.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

const NOT_NEGATIVE: &str = "Ensure this value is greater than or equal to 0.";

// =============================================================================
// Views
// =============================================================================

/// Product as serialized by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: ProductId,
    /// Creator.
    pub user: Option<UserId>,
    pub name: String,
    /// Public URL of the image.
    pub image: Option<String>,
    pub brand: String,
    pub category: String,
    pub description: String,
    pub rating: Decimal,
    pub num_reviews: i32,
    pub price: Money,
    pub count_in_stock: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<ReviewView>>,
}

impl ProductView {
    fn new(product: &Product, media_prefix: &str) -> Self {
        Self {
            id: product.id,
            user: product.user_id,
            name: product.name.clone(),
            image: product
                .image
                .as_ref()
                .map(|path| format!("{media_prefix}{path}")),
            brand: product.brand.clone(),
            category: product.category.clone(),
            description: product.description.clone(),
            rating: product.rating,
            num_reviews: product.num_reviews,
            price: product.price,
            count_in_stock: product.count_in_stock,
            created_at: product.created_at,
            reviews: None,
        }
    }

    fn with_reviews(details: &ProductDetails, media_prefix: &str) -> Self {
        Self {
            reviews: Some(details.reviews.iter().map(ReviewView::from).collect()),
            ..Self::new(&details.product, media_prefix)
        }
    }
}

/// Review as serialized by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: ReviewId,
    pub user: Option<UserId>,
    pub name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Review> for ReviewView {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id,
            user: review.user_id,
            name: review.name.clone(),
            rating: review.rating,
            comment: review.comment.clone(),
            created_at: review.created_at,
        }
    }
}

fn media_prefix(state: &AppState) -> String {
    let config = state.config();
    media_url_prefix(config.debug, &config.assets)
}

// =============================================================================
// Requests
// =============================================================================

/// Listing filter.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub keyword: Option<String>,
}

/// Product fields for create and update. Every field is optional.
///
/// Strings are taken verbatim, surrounding whitespace included.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub brand: Option<String>,
    pub count_in_stock: Option<i64>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl ProductRequest {
    /// Validate the numeric fields, collecting errors for both.
    fn validate_numbers(&self) -> std::result::Result<(Option<Money>, Option<i32>), FieldErrors> {
        let mut errors = FieldErrors::new();

        let price = self.price.and_then(|value| match Money::new(value) {
            Ok(money) => Some(money),
            Err(MoneyError::Negative) => {
                errors.add("price", NOT_NEGATIVE);
                None
            }
            Err(e @ MoneyError::TooLarge { .. }) => {
                errors.add("price", e.to_string());
                None
            }
        });

        let count_in_stock = self.count_in_stock.and_then(|value| {
            if value < 0 {
                errors.add("countInStock", NOT_NEGATIVE);
                return None;
            }
            i32::try_from(value).map_or_else(
                |_| {
                    errors.add(
                        "countInStock",
                        format!("Ensure this value is less than or equal to {}.", i32::MAX),
                    );
                    None
                },
                Some,
            )
        });

        errors.into_result()?;
        Ok((price, count_in_stock))
    }

    /// Build a new product; fields left out take their placeholder values.
    ///
    /// # Errors
    ///
    /// Returns field errors for a negative or oversized price or stock.
    pub fn into_new_product(self) -> std::result::Result<NewProduct, FieldErrors> {
        let (price, count_in_stock) = self.validate_numbers()?;
        let placeholder = NewProduct::placeholder();

        Ok(NewProduct {
            name: self.name.unwrap_or(placeholder.name),
            price: price.unwrap_or(placeholder.price),
            brand: self.brand.unwrap_or(placeholder.brand),
            count_in_stock: count_in_stock.unwrap_or(placeholder.count_in_stock),
            category: self.category.unwrap_or(placeholder.category),
            description: self.description.unwrap_or(placeholder.description),
        })
    }

    /// Build a partial update.
    ///
    /// # Errors
    ///
    /// Returns field errors for a negative or oversized price or stock.
    pub fn into_changes(self) -> std::result::Result<ProductChanges, FieldErrors> {
        let (price, count_in_stock) = self.validate_numbers()?;

        Ok(ProductChanges {
            name: self.name,
            price,
            brand: self.brand,
            count_in_stock,
            category: self.category,
            description: self.description,
        })
    }
}

/// Review request body.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

impl ReviewRequest {
    fn into_new_review(self) -> Result<NewReview> {
        match self.rating {
            None | Some(0) => Err(AppError::BadRequest("Please select a rating".to_string())),
            Some(rating @ 1..=5) => Ok(NewReview {
                rating,
                comment: self.comment.unwrap_or_default(),
            }),
            Some(_) => Err(AppError::BadRequest(
                "Rating must be between 1 and 5".to_string(),
            )),
        }
    }
}

/// Parse a JSON body that may be empty. An empty body yields the default value.
fn parse_optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))
}

/// Lowercased file extension if it names an accepted image type.
fn image_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn product_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Product not found".to_string()),
        other => AppError::Database(other),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List products, newest first, optionally filtered by name.
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<ProductView>>> {
    let products = ProductRepository::new(state.pool())
        .list(query.keyword.as_deref())
        .await?;

    let prefix = media_prefix(&state);
    Ok(Json(
        products
            .iter()
            .map(|p| ProductView::new(p, &prefix))
            .collect(),
    ))
}

/// The highest rated products.
#[instrument(skip(state))]
pub async fn top_products(State(state): State<AppState>) -> Result<Json<Vec<ProductView>>> {
    let products = ProductRepository::new(state.pool()).top().await?;

    let prefix = media_prefix(&state);
    Ok(Json(
        products
            .iter()
            .map(|p| ProductView::new(p, &prefix))
            .collect(),
    ))
}

/// One product with its reviews.
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<ProductView>> {
    let details = ProductRepository::new(state.pool())
        .get_details(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(ProductView::with_reviews(&details, &media_prefix(&state))))
}

/// Create a product.
///
/// The body is optional: without one a placeholder product is created for
/// staff to fill in with an update.
#[instrument(skip(state, current, body), fields(user_id = %current.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    body: Bytes,
) -> Result<Json<ProductView>> {
    let new_product = parse_optional_json::<ProductRequest>(&body)?.into_new_product()?;
    let owner = existing_user(&state, current.id).await?;

    let product = ProductRepository::new(state.pool())
        .create(Some(owner.id), &new_product)
        .await?;

    tracing::info!(product_id = %product.id, "Product created");

    Ok(Json(ProductView::new(&product, &media_prefix(&state))))
}

/// Update a product.
#[instrument(skip(state, staff, req), fields(staff_id = %staff.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ProductRequest>,
) -> Result<Json<ProductView>> {
    let changes = req.into_changes()?;

    let product = ProductRepository::new(state.pool())
        .update(id, &changes)
        .await
        .map_err(product_not_found)?;

    Ok(Json(ProductView::new(&product, &media_prefix(&state))))
}

/// Delete a product.
#[instrument(skip(state, staff), fields(staff_id = %staff.id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    if !ProductRepository::new(state.pool()).delete(id).await? {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    tracing::info!(product_id = %id, "Product deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Upload a product image.
///
/// Multipart fields: `product_id` and `image`. The file is stored under the
/// media directory with a generated name.
#[instrument(skip(state, staff, multipart), fields(staff_id = %staff.id))]
pub async fn upload_image(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<ProductView>> {
    let mut multipart = multipart?;
    let mut errors = FieldErrors::new();
    let mut product_id = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);

        match name.as_deref() {
            Some("product_id") => {
                let text = field.text().await?;
                match text.trim().parse::<i32>() {
                    Ok(id) => product_id = Some(ProductId::new(id)),
                    Err(_) => errors.add("product_id", "A valid integer is required."),
                }
            }
            Some("image") => match file_name.as_deref().and_then(image_extension) {
                Some(ext) => image = Some((ext, field.bytes().await?)),
                None => errors.add("image", "Upload a valid image."),
            },
            _ => {}
        }
    }

    if product_id.is_none() && errors.get("product_id").is_none() {
        errors.add("product_id", "This field is required.");
    }
    if image.is_none() && errors.get("image").is_none() {
        errors.add("image", "No file was submitted.");
    }
    errors.into_result()?;

    let (Some(product_id), Some((ext, data))) = (product_id, image) else {
        return Err(AppError::BadRequest("Invalid upload".to_string()));
    };

    let products = ProductRepository::new(state.pool());
    if products.get_by_id(product_id).await?.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    let config = state.config();
    let dir = media_dir(config.debug, &config.assets);
    let file_name = format!("{}.{ext}", Uuid::new_v4());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(format!("create media dir {}: {e}", dir.display())))?;
    tokio::fs::write(dir.join(&file_name), &data)
        .await
        .map_err(|e| AppError::Internal(format!("write upload {file_name}: {e}")))?;

    let product = products
        .set_image(product_id, &file_name)
        .await
        .map_err(product_not_found)?;

    tracing::info!(product_id = %product_id, file = %file_name, bytes = data.len(), "Product image uploaded");

    Ok(Json(ProductView::new(&product, &media_prefix(&state))))
}

/// Review a product. One review per user per product.
#[instrument(skip(state, current, req), fields(user_id = %current.id))]
pub async fn create_review(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<(StatusCode, Json<ReviewView>)> {
    let review = req.into_new_review()?;

    let reviewer = existing_user(&state, current.id).await?;

    let review = ProductRepository::new(state.pool())
        .create_review(id, reviewer.id, reviewer.display_name(), &review)
        .await
        .map_err(product_not_found)?;

    tracing::info!(product_id = %id, rating = review.rating, "Review added");

    Ok((StatusCode::CREATED, Json(ReviewView::from(&review))))
}

/// Create the product routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products/", get(list_products))
        .route("/api/products/top/", get(top_products))
        .route("/api/products/create/", post(create_product))
        .route(
            "/api/products/upload/",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/api/products/{id}/", get(get_product))
        .route("/api/products/{id}/reviews/", post(create_review))
        .route("/api/products/update/{id}/", put(update_product))
        .route("/api/products/delete/{id}/", delete(delete_product))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: ProductId::new(3),
            user_id: Some(UserId::new(1)),
            name: " Product Name ".to_string(),
            image: Some("sample.jpg".to_string()),
            brand: "Sample brand ".to_string(),
            category: "Sample category".to_string(),
            description: " ".to_string(),
            rating: Decimal::new(450, 2),
            num_reviews: 2,
            price: Money::new(Decimal::new(8999, 2)).unwrap(),
            count_in_stock: 4,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_body_creates_placeholder() {
        let req: ProductRequest = parse_optional_json(b"").unwrap();
        assert_eq!(req.into_new_product().unwrap(), NewProduct::placeholder());

        let req: ProductRequest = parse_optional_json(b"  \n").unwrap();
        assert_eq!(req.into_new_product().unwrap(), NewProduct::placeholder());
    }

    #[test]
    fn test_strings_kept_verbatim() {
        let req: ProductRequest =
            parse_optional_json(br#"{"name": " Product Name ", "description": " "}"#).unwrap();
        let new_product = req.into_new_product().unwrap();
        assert_eq!(new_product.name, " Product Name ");
        assert_eq!(new_product.description, " ");
        assert_eq!(new_product.brand, "Sample Brand");
    }

    #[test]
    fn test_negative_values_rejected() {
        let req: ProductRequest =
            parse_optional_json(br#"{"price": "-1.00", "countInStock": -2}"#).unwrap();
        let errors = req.into_new_product().unwrap_err();
        assert_eq!(errors.get("price").unwrap(), &[NOT_NEGATIVE.to_string()]);
        assert_eq!(errors.get("countInStock").unwrap(), &[NOT_NEGATIVE.to_string()]);
    }

    #[test]
    fn test_zero_allowed() {
        let req: ProductRequest = parse_optional_json(br#"{"price": 0, "countInStock": 0}"#).unwrap();
        let changes = req.into_changes().unwrap();
        assert_eq!(changes.price, Some(Money::ZERO));
        assert_eq!(changes.count_in_stock, Some(0));
        assert!(changes.name.is_none());
    }

    #[test]
    fn test_stock_overflow_rejected() {
        let req = ProductRequest {
            count_in_stock: Some(i64::from(i32::MAX) + 1),
            ..ProductRequest::default()
        };
        assert!(req.into_changes().unwrap_err().get("countInStock").is_some());
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let result = parse_optional_json::<ProductRequest>(b"{not json");
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_review_rating_bounds() {
        for rating in [None, Some(0), Some(6), Some(-1)] {
            let req = ReviewRequest {
                rating,
                comment: None,
            };
            assert!(matches!(req.into_new_review(), Err(AppError::BadRequest(_))));
        }

        let review = ReviewRequest {
            rating: Some(5),
            comment: Some("Great".to_string()),
        }
        .into_new_review()
        .unwrap();
        assert_eq!(review.rating, 5);
        assert_eq!(review.comment, "Great");
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(image_extension("a.b.webp").as_deref(), Some("webp"));
        assert_eq!(image_extension("script.sh"), None);
        assert_eq!(image_extension("noext"), None);
    }

    #[test]
    fn test_product_view_json() {
        let json = serde_json::to_value(ProductView::new(&product(), "/images/")).unwrap();
        assert_eq!(json["name"], " Product Name ");
        assert_eq!(json["image"], "/images/sample.jpg");
        assert_eq!(json["price"], "89.99");
        assert_eq!(json["rating"], "4.50");
        assert_eq!(json["numReviews"], 2);
        assert_eq!(json["countInStock"], 4);
        assert_eq!(json["user"], 1);
        assert!(json.get("reviews").is_none());
    }

    #[test]
    fn test_product_view_with_reviews() {
        let details = ProductDetails {
            product: product(),
            reviews: vec![Review {
                id: ReviewId::new(1),
                product_id: ProductId::new(3),
                user_id: None,
                name: "Former customer".to_string(),
                rating: 4,
                comment: String::new(),
                created_at: Utc::now(),
            }],
        };
        let json = serde_json::to_value(ProductView::with_reviews(&details, "/media/")).unwrap();
        assert_eq!(json["reviews"][0]["name"], "Former customer");
        assert!(json["reviews"][0]["user"].is_null());
    }
}
