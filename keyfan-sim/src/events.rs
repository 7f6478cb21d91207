//! Order status events driven through the keyed distributor.
//!
//! Events carry the order identifier they belong to; watchers subscribe
//! by order id and must never see another order's updates.

use uuid::Uuid;

/// Lifecycle status of a simulated order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl OrderStatus {
    /// Status for the `seq`-th update of an order.
    pub fn for_sequence(seq: u64) -> Self {
        match seq % 4 {
            0 => OrderStatus::Pending,
            1 => OrderStatus::Paid,
            2 => OrderStatus::Expired,
            _ => OrderStatus::Cancelled,
        }
    }
}

/// Event emitted whenever an order's status changes.
#[derive(Debug, Clone)]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub seq: u64,
    pub status: OrderStatus,
}

impl OrderStatusChanged {
    /// Routing key for the keyed distributor.
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }
}
