//! Records kept in the persisted stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the storefront remembers about a product it showed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    /// Product id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: f64,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Category name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ProductSnapshot {
    /// Creates a snapshot without image or category.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            image: None,
            category: None,
        }
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// Product id.
    pub product_id: String,
    /// Display name at order time.
    pub name: String,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price at order time.
    pub price: f64,
}

impl OrderLine {
    /// `quantity * price`.
    #[must_use]
    pub fn subtotal(&self) -> f64 {
        f64::from(self.quantity) * self.price
    }
}

/// Order status as recorded by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, not yet handled.
    #[default]
    Pending,
    /// Being prepared.
    Processing,
    /// Shipped.
    Shipped,
    /// Delivered.
    Delivered,
    /// Cancelled.
    Cancelled,
}

/// An entry in the append-only order log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    /// Order id (`ORD-<uuid v7>`).
    pub id: String,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
    /// Ordered lines.
    pub items: Vec<OrderLine>,
    /// Sum of line subtotals.
    pub total: f64,
    /// Current status.
    #[serde(default)]
    pub status: OrderStatus,
}

impl OrderRecord {
    /// Creates a pending order for `items`, stamping id, time and total.
    #[must_use]
    pub fn new(items: Vec<OrderLine>) -> Self {
        let total = items.iter().map(OrderLine::subtotal).sum();
        Self {
            id: format!("ORD-{}", uuid::Uuid::now_v7()),
            created_at: Utc::now(),
            items,
            total,
            status: OrderStatus::Pending,
        }
    }
}
