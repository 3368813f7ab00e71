use serde::{Deserialize, Serialize};

/// Order lifecycle status as reported by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Transmitted by the client, not yet acknowledged
    PendingSubmit,
    /// Accepted by the broker but not yet elected (e.g. stop not triggered)
    PreSubmitted,
    /// Working at the destination
    Submitted,
    /// Cancel sent, not yet confirmed
    PendingCancel,
    /// Canceled through the API before reaching the destination
    ApiCancelled,
    /// Canceled, confirmed by the destination
    Cancelled,
    /// Completely filled
    Filled,
    /// Rejected or otherwise not working
    Inactive,
}

impl OrderStatus {
    /// Parse the broker's status text. Unknown text yields `None`.
    pub fn from_broker(status: &str) -> Option<Self> {
        match status.trim() {
            "PendingSubmit" | "ApiPending" => Some(OrderStatus::PendingSubmit),
            "PreSubmitted" => Some(OrderStatus::PreSubmitted),
            "Submitted" => Some(OrderStatus::Submitted),
            "PendingCancel" => Some(OrderStatus::PendingCancel),
            "ApiCancelled" => Some(OrderStatus::ApiCancelled),
            "Cancelled" => Some(OrderStatus::Cancelled),
            "Filled" => Some(OrderStatus::Filled),
            "Inactive" => Some(OrderStatus::Inactive),
            _ => None,
        }
    }

    /// Position of the status in the order lifecycle. Statuses only move
    /// to an equal or higher rank; all terminal statuses share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::PendingSubmit => 0,
            OrderStatus::PreSubmitted => 1,
            OrderStatus::Submitted => 2,
            OrderStatus::PendingCancel => 3,
            OrderStatus::ApiCancelled
            | OrderStatus::Cancelled
            | OrderStatus::Filled
            | OrderStatus::Inactive => 4,
        }
    }

    /// Returns true if the order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.rank() == 4
    }

    /// Returns true if the order is still working
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    /// A terminal status is final, even towards another terminal status.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}
