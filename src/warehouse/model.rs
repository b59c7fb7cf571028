//! Warehouse entities and request payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer who places orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    /// Identifier
    pub id: u64,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// When the customer was created
    pub join_date: DateTime<Utc>,
}

/// A stocked item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    /// Identifier
    pub id: u64,
    /// Unique item name
    pub name: String,
    /// Brand
    pub brand: String,
    /// Unit price in minor currency units
    pub price: u64,
    /// Whether the item can currently be ordered
    pub available: bool,
}

/// A customer's order for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    /// Identifier
    pub id: u64,
    /// When the order was submitted
    pub order_date: DateTime<Utc>,
    /// Ordering customer
    pub customer_id: u64,
    /// Ordered item
    pub item_id: u64,
    /// Units ordered
    pub quantity: u64,
    /// `price * quantity` at submission time
    pub amount_due: u64,
    /// Amount paid so far
    pub amount_paid: u64,
}

/// `POST /customers` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCustomer {
    /// Required
    pub name: Option<String>,
    /// Required
    pub email: Option<String>,
}

/// `PATCH /customers/{id}` body; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    /// New name
    pub name: Option<String>,
    /// New email
    pub email: Option<String>,
}

/// `POST /items` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItem {
    /// Required, unique
    pub name: Option<String>,
    /// Required
    pub brand: Option<String>,
    /// Required
    pub price: Option<u64>,
    /// Defaults to `true`
    pub available: Option<bool>,
}

/// `PATCH /items/{id}` body; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    /// New name, must stay unique
    pub name: Option<String>,
    /// New brand
    pub brand: Option<String>,
    /// New price
    pub price: Option<u64>,
    /// New availability
    pub available: Option<bool>,
}

/// `POST /orders` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewOrder {
    /// Required
    pub customer_id: Option<u64>,
    /// Required
    pub item_id: Option<u64>,
    /// Required, at least 1
    pub quantity: Option<u64>,
}
