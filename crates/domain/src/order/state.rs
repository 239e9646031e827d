//! Order state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Paid ──► Shipped ──► Completed
///    │            │          │         │
///    └────────────┴──────────┴─────────┴──► Cancelled
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order has been placed and stock is held for it.
    #[default]
    Pending,

    /// Seller accepted the order.
    Confirmed,

    /// Payment was received.
    Paid,

    /// Parcel was handed to the courier.
    Shipped,

    /// Buyer received the order (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns the next status along the forward chain, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Paid),
            OrderStatus::Paid => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Completed),
            OrderStatus::Completed | OrderStatus::Cancelled => None,
        }
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if moving to `target` is a legal single transition.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if target == OrderStatus::Cancelled {
            return self.can_cancel();
        }
        self.next() == Some(target)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored and exchanged on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Current status plus the instant each visited status was entered.
///
/// Every entry is written once, when the status is entered, and never
/// removed. `Pending` is entered when the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    status: OrderStatus,
    entered_at: BTreeMap<OrderStatus, DateTime<Utc>>,
}

impl Lifecycle {
    /// Starts a lifecycle in `Pending` at the given instant.
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            status: OrderStatus::Pending,
            entered_at: BTreeMap::from([(OrderStatus::Pending, at)]),
        }
    }

    /// Rebuilds a lifecycle from persisted state.
    pub fn restore(
        status: OrderStatus,
        entered_at: impl IntoIterator<Item = (OrderStatus, DateTime<Utc>)>,
    ) -> Self {
        Self {
            status,
            entered_at: entered_at.into_iter().collect(),
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns when `status` was entered, if it ever was.
    pub fn entered_at(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.entered_at.get(&status).copied()
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at(OrderStatus::Confirmed)
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at(OrderStatus::Paid)
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at(OrderStatus::Shipped)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at(OrderStatus::Completed)
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.entered_at(OrderStatus::Cancelled)
    }

    /// Moves to `target`, recording the entry instant.
    pub fn transition(&mut self, target: OrderStatus, at: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(target) || self.entered_at.contains_key(&target) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        self.entered_at.insert(target, at);
        Ok(())
    }
}
