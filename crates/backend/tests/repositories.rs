//! Repository tests against a real database.
//!
//! Each test gets a fresh database with the migrations applied. They need
//! `DATABASE_URL` pointing at a `PostgreSQL` server the user may create
//! databases on:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/postgres cargo test -p cheap-electra-backend -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;
use sqlx::PgPool;

use cheap_electra_backend::db::RepositoryError;
use cheap_electra_backend::db::orders::OrderRepository;
use cheap_electra_backend::db::products::ProductRepository;
use cheap_electra_backend::db::users::UserRepository;
use cheap_electra_backend::export::{Exclusions, Snapshot};
use cheap_electra_backend::models::{
    NewOrder, NewOrderItem, NewProduct, NewReview, NewShippingAddress, ProductChanges, User,
};
use cheap_electra_backend::services::auth::{AuthError, AuthService, ProfileUpdate, Registration};
use cheap_electra_core::{Money, OrderStatus, ProductId, UserId};

fn registration(username: &str) -> Registration {
    Registration {
        username: Some(username.to_string()),
        email: Some(format!("{username}@example.com")),
        password: Some("long-enough-password".to_string()),
        name: None,
    }
}

async fn user(pool: &PgPool, username: &str) -> User {
    AuthService::new(pool)
        .register(&registration(username), false)
        .await
        .unwrap()
}

fn money(cents: i64) -> Money {
    Money::new(Decimal::new(cents, 2)).unwrap()
}

async fn product(pool: &PgPool, owner: UserId, name: &str, stock: i32) -> ProductId {
    let new_product = NewProduct {
        name: name.to_string(),
        price: money(1000),
        count_in_stock: stock,
        ..NewProduct::placeholder()
    };
    ProductRepository::new(pool)
        .create(Some(owner), &new_product)
        .await
        .unwrap()
        .id
}

fn order(user_id: UserId, items: Vec<NewOrderItem>) -> NewOrder {
    NewOrder {
        user_id,
        payment_method: "PayPal".to_string(),
        tax_price: Money::ZERO,
        shipping_price: Money::ZERO,
        total_price: money(2000),
        items,
        shipping_address: NewShippingAddress {
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
        },
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_register_and_login(pool: PgPool) {
    let auth = AuthService::new(&pool);
    let registered = user(&pool, "alice").await;

    let logged_in = auth.login("alice", "long-enough-password").await.unwrap();
    assert_eq!(logged_in.id, registered.id);
    assert!(logged_in.last_login.is_some());

    let err = auth.login("alice", "wrong-password").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let err = auth
        .register(&registration("alice"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UsernameTaken));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_profile_update_with_password(pool: PgPool) {
    let auth = AuthService::new(&pool);
    let alice = user(&pool, "alice").await;

    let updated = auth
        .update_profile(
            alice.id,
            &ProfileUpdate {
                name: Some("Alice".to_string()),
                email: None,
                password: Some("another-long-password".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.first_name, "Alice");

    let logged_in = auth.login("alice", "another-long-password").await.unwrap();
    assert_eq!(logged_in.first_name, "Alice");
    assert!(auth.login("alice", "long-enough-password").await.is_err());

    // Nothing is written for a user that no longer exists
    UserRepository::new(&pool).delete(alice.id).await.unwrap();
    let err = auth
        .update_profile(
            alice.id,
            &ProfileUpdate {
                name: None,
                email: None,
                password: Some("third-long-password".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_product_search_is_case_insensitive(pool: PgPool) {
    let owner = user(&pool, "owner").await;
    product(&pool, owner.id, "Apple AirPods", 1).await;
    product(&pool, owner.id, "Sony Camera", 1).await;

    let products = ProductRepository::new(&pool);
    let found = products.list(Some("airpods")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Apple AirPods");

    let all = products.list(None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "Sony Camera");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_product_update_keeps_unset_fields(pool: PgPool) {
    let owner = user(&pool, "owner").await;
    let id = product(&pool, owner.id, " Product Name ", 5).await;

    let products = ProductRepository::new(&pool);
    let updated = products
        .update(
            id,
            &ProductChanges {
                brand: Some("Brand".to_string()),
                ..ProductChanges::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, " Product Name ");
    assert_eq!(updated.brand, "Brand");
    assert_eq!(updated.count_in_stock, 5);

    let missing = products
        .update(ProductId::new(i32::MAX), &ProductChanges::default())
        .await;
    assert!(matches!(missing, Err(RepositoryError::NotFound)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_reviews_recompute_rating(pool: PgPool) {
    let alice = user(&pool, "alice").await;
    let bob = user(&pool, "bob").await;
    let id = product(&pool, alice.id, "Speaker", 1).await;
    let products = ProductRepository::new(&pool);

    for (reviewer, rating) in [(&alice, 5), (&bob, 4)] {
        products
            .create_review(
                id,
                reviewer.id,
                reviewer.display_name(),
                &NewReview {
                    rating,
                    comment: String::new(),
                },
            )
            .await
            .unwrap();
    }

    let details = products.get_details(id).await.unwrap().unwrap();
    assert_eq!(details.product.num_reviews, 2);
    assert_eq!(details.product.rating, Decimal::new(450, 2));
    assert_eq!(details.reviews[0].name, "alice");

    let again = products
        .create_review(
            id,
            bob.id,
            "bob",
            &NewReview {
                rating: 1,
                comment: String::new(),
            },
        )
        .await;
    assert!(matches!(again, Err(RepositoryError::Conflict(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_order_takes_stock_atomically(pool: PgPool) {
    let buyer = user(&pool, "buyer").await;
    let plenty = product(&pool, buyer.id, "Plenty", 10).await;
    let scarce = product(&pool, buyer.id, "Scarce", 1).await;
    let orders = OrderRepository::new(&pool);
    let products = ProductRepository::new(&pool);

    let placed = orders
        .create(&order(
            buyer.id,
            vec![NewOrderItem {
                product_id: plenty,
                qty: 3,
            }],
        ))
        .await
        .unwrap();
    assert_eq!(placed.items[0].name, "Plenty");
    assert_eq!(placed.items[0].price, money(1000));
    assert_eq!(placed.order.status(), OrderStatus::Pending);
    let stock = products.get_by_id(plenty).await.unwrap().unwrap();
    assert_eq!(stock.count_in_stock, 7);

    // The second item fails, so the first must not be taken either
    let failed = orders
        .create(&order(
            buyer.id,
            vec![
                NewOrderItem {
                    product_id: plenty,
                    qty: 1,
                },
                NewOrderItem {
                    product_id: scarce,
                    qty: 2,
                },
            ],
        ))
        .await;
    assert!(matches!(failed, Err(RepositoryError::Conflict(_))));
    let stock = products.get_by_id(plenty).await.unwrap().unwrap();
    assert_eq!(stock.count_in_stock, 7);
    assert_eq!(orders.list_for_user(buyer.id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_paid_then_delivered(pool: PgPool) {
    let buyer = user(&pool, "buyer").await;
    let id = product(&pool, buyer.id, "Thing", 2).await;
    let orders = OrderRepository::new(&pool);

    let placed = orders
        .create(&order(
            buyer.id,
            vec![NewOrderItem {
                product_id: id,
                qty: 1,
            }],
        ))
        .await
        .unwrap();

    let paid = orders.mark_paid(placed.order.id).await.unwrap();
    let paid_again = orders.mark_paid(placed.order.id).await.unwrap();
    assert_eq!(paid.paid_at, paid_again.paid_at);
    assert_eq!(paid.status(), OrderStatus::Paid);

    let delivered = orders.mark_delivered(placed.order.id).await.unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_deleting_user_keeps_orders(pool: PgPool) {
    let buyer = user(&pool, "buyer").await;
    let id = product(&pool, buyer.id, "Thing", 2).await;
    let orders = OrderRepository::new(&pool);
    let placed = orders
        .create(&order(
            buyer.id,
            vec![NewOrderItem {
                product_id: id,
                qty: 1,
            }],
        ))
        .await
        .unwrap();

    assert!(UserRepository::new(&pool).delete(buyer.id).await.unwrap());

    let order = orders.get_by_id(placed.order.id).await.unwrap().unwrap();
    assert!(order.user_id.is_none());
    let product = ProductRepository::new(&pool).get_by_id(id).await.unwrap().unwrap();
    assert!(product.user_id.is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "Requires DATABASE_URL"]
async fn test_snapshot_reads_every_table(pool: PgPool) {
    let buyer = user(&pool, "buyer").await;
    let id = product(&pool, buyer.id, "Thing", 2).await;
    OrderRepository::new(&pool)
        .create(&order(
            buyer.id,
            vec![NewOrderItem {
                product_id: id,
                qty: 1,
            }],
        ))
        .await
        .unwrap();

    let snapshot = Snapshot::load(&pool).await.unwrap();
    assert_eq!(snapshot.users.len(), 1);
    assert!(snapshot.users[0].1.as_deref().unwrap().starts_with("$argon2"));
    assert_eq!(snapshot.orders[0].items.len(), 1);

    let records = snapshot.to_fixtures(&Exclusions::default());
    assert_eq!(records.len(), 5);
}
