//! Order lifecycle state machine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The status of an order, as persisted on the `orders` row.
///
/// Customer-triggered transitions:
/// ```text
/// pending ────┐
/// processing ─┴──► cancelled
/// delivered ─────► return_requested
/// ```
/// Everything else (payment confirmation, shipment progression, return
/// resolution) is driven by back-office flows that move orders through
/// the remaining states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    ReturnRequested,
    Returned,
    CancellationRequested,
}

impl OrderStatus {
    /// Returns true if a customer may still cancel the order.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if a customer may request a return.
    pub fn can_request_return(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Column value stored on the `orders` row.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::ReturnRequested => "return_requested",
            OrderStatus::Returned => "returned",
            OrderStatus::CancellationRequested => "cancellation_requested",
        }
    }

    /// Parse a column value back into a status.
    pub fn from_db(value: &str) -> Option<Self> {
        let status = match value {
            "pending" => OrderStatus::Pending,
            "processing" => OrderStatus::Processing,
            "paid" => OrderStatus::Paid,
            "shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            "return_requested" => OrderStatus::ReturnRequested,
            "returned" => OrderStatus::Returned,
            "cancellation_requested" => OrderStatus::CancellationRequested,
            _ => return None,
        };
        Some(status)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_allowed_only_before_shipment_processing_completes() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Paid.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
        assert!(!OrderStatus::ReturnRequested.can_cancel());
        assert!(!OrderStatus::Returned.can_cancel());
    }

    #[test]
    fn return_allowed_only_after_delivery() {
        assert!(OrderStatus::Delivered.can_request_return());
        assert!(!OrderStatus::Pending.can_request_return());
        assert!(!OrderStatus::Shipped.can_request_return());
        assert!(!OrderStatus::ReturnRequested.can_request_return());
        assert!(!OrderStatus::Cancelled.can_request_return());
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Returned.is_terminal());
        assert!(!OrderStatus::ReturnRequested.is_terminal());
        assert!(!OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn db_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::ReturnRequested,
            OrderStatus::Returned,
            OrderStatus::CancellationRequested,
        ] {
            assert_eq!(OrderStatus::from_db(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_db("refunded"), None);
    }
}
