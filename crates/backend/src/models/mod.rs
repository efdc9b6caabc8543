//! Domain models for the shop.
//!
//! These types represent validated domain objects, separate from the
//! database row types in [`crate::db`] and the JSON views in [`crate::routes`].

pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use order::{
    NewOrder, NewOrderItem, NewShippingAddress, Order, OrderDetails, OrderItem, ShippingAddress,
};
pub use product::{NewProduct, NewReview, Product, ProductChanges, ProductDetails, Review};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{NewUser, User, UserChanges};
