//! Canonical records produced by the normalizer and consumed by the client.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::PLACEHOLDER_ID_PREFIX;
use crate::normalize::coerce::{lenient_quantity, lenient_string};

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Known order states. Matching against the wire string is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Placed,
    Scheduled,
    Preparing,
    Ready,
    Completed,
    Cancelled,
    Unknown(String),
}

impl OrderStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "placed" | "pending" => Self::Placed,
            "schedule" | "scheduled" => Self::Scheduled,
            "preparing" => Self::Preparing,
            "ready" => Self::Ready,
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Placed => "placed",
            Self::Scheduled => "schedule",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    /// Always non-negative.
    pub unit_price: Decimal,
}

/// An incoming order. Immutable after decode except for its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Status exactly as the backend sent it.
    pub status: String,
    /// Always non-negative.
    pub total_amount: Decimal,
    pub items: Vec<OrderItem>,
    /// Minutes.
    pub cook_time: u32,
    pub takeaway: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub placed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn status_kind(&self) -> OrderStatus {
        OrderStatus::from_raw(&self.status)
    }

    /// False once the order is completed or cancelled.
    pub fn is_active(&self) -> bool {
        !matches!(
            self.status_kind(),
            OrderStatus::Completed | OrderStatus::Cancelled
        )
    }

    pub fn line_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum()
    }

    /// Local patch applied after the backend accepted a completion call.
    pub fn mark_completed(&mut self) {
        self.status = OrderStatus::Completed.as_str().to_string();
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Minor currency units.
    pub price: u64,
    pub category: String,
    pub restaurant_id: String,
    pub is_available: bool,
    pub is_featured: bool,
    /// Extra preparation time in minutes.
    pub extra_time: u32,
    /// Locally held image payload awaiting upload. Never serialized.
    #[serde(skip)]
    pub image: Option<Bytes>,
    pub image_url: Option<String>,
}

impl Product {
    /// True when the id was synthesized client-side rather than assigned by
    /// the backend.
    pub fn has_placeholder_id(&self) -> bool {
        is_placeholder_id(&self.id)
    }
}

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_ID_PREFIX)
}

/// A fresh client-side id, distinguishable from backend ids by its prefix.
pub fn placeholder_id() -> String {
    format!("{}{}", PLACEHOLDER_ID_PREFIX, uuid::Uuid::new_v4())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantProfile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cuisine: String,
    /// Minutes.
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub estimated_time: u32,
}

/// The current user's identity as held by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionIdentity {
    pub user_id: Option<String>,
    /// Advisory only; see [`SessionIdentity::is_authenticated`].
    pub token: Option<String>,
    pub restaurant_id: Option<String>,
    pub restaurant: RestaurantProfile,
}

impl SessionIdentity {
    /// A non-empty user id is the sole authentication signal.
    pub fn is_authenticated(&self) -> bool {
        self.user_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}
