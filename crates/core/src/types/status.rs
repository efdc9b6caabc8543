//! Order status.

use serde::{Deserialize, Serialize};

/// Where an order is in its lifecycle.
///
/// Not stored: derived from the `is_paid` / `is_delivered` flags on the order.
/// An order only moves forward: `Pending` -> `Paid` -> `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Delivered,
}

impl OrderStatus {
    /// Derive the status from the order's flags.
    #[must_use]
    pub const fn from_flags(is_paid: bool, is_delivered: bool) -> Self {
        match (is_paid, is_delivered) {
            (_, true) => Self::Delivered,
            (true, false) => Self::Paid,
            (false, false) => Self::Pending,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Delivered => write!(f, "delivered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(OrderStatus::from_flags(false, false), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_flags(true, false), OrderStatus::Paid);
        assert_eq!(OrderStatus::from_flags(true, true), OrderStatus::Delivered);
        // Delivery recorded for an order never marked paid (cash on delivery)
        assert_eq!(OrderStatus::from_flags(false, true), OrderStatus::Delivered);
    }

    #[test]
    fn test_lifecycle_order() {
        assert!(OrderStatus::Pending < OrderStatus::Paid);
        assert!(OrderStatus::Paid < OrderStatus::Delivered);
    }
}
