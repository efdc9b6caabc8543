//! Staff overview route handler.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use crate::db::orders::OrderRepository;
use crate::db::products::ProductRepository;
use crate::db::users::UserRepository;
use crate::error::Result;
use crate::middleware::RequireStaff;
use crate::state::AppState;

/// Entity counts shown to staff.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Overview {
    pub users: i64,
    pub products: i64,
    pub orders: i64,
}

/// Display the overview.
#[instrument(skip(state, staff), fields(staff_id = %staff.id))]
pub async fn overview(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
) -> Result<Json<Overview>> {
    let users = UserRepository::new(state.pool());
    let products = ProductRepository::new(state.pool());
    let orders = OrderRepository::new(state.pool());

    let (users, products, orders) =
        tokio::try_join!(users.count(), products.count(), orders.count())?;

    Ok(Json(Overview {
        users,
        products,
        orders,
    }))
}
