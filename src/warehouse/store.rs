//! In-memory warehouse store with cascading deletes.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;

use super::model::{
    Customer, CustomerPatch, Item, ItemPatch, NewCustomer, NewItem, NewOrder, Order,
};

/// Store operation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No row with that id
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: u64,
    },

    /// The payload is missing or has unusable fields
    #[error("{0}")]
    Invalid(String),

    /// Well-formed but cannot be carried out (e.g. item unavailable)
    #[error("{0}")]
    Unprocessable(String),

    /// Would violate a uniqueness constraint
    #[error("{0}")]
    Conflict(String),
}

/// Outcome of deleting an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderDeletion {
    /// The deleted order's id
    pub deleted_id: u64,
    /// Order count before the delete
    pub previous_orders: usize,
    /// Order count after the delete
    pub current_orders: usize,
}

#[derive(Debug, Default)]
struct Tables {
    customers: BTreeMap<u64, Customer>,
    items: BTreeMap<u64, Item>,
    orders: BTreeMap<u64, Order>,
    next_id: u64,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn item_name_taken(&self, name: &str, except: Option<u64>) -> bool {
        self.items
            .values()
            .any(|item| item.name == name && Some(item.id) != except)
    }
}

/// All warehouse tables behind one lock, so cascades are atomic.
#[derive(Debug, Default)]
pub struct WarehouseStore {
    tables: RwLock<Tables>,
}

impl WarehouseStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All customers, by id
    pub fn customers(&self) -> Vec<Customer> {
        self.tables.read().customers.values().cloned().collect()
    }

    /// Create a customer.
    pub fn create_customer(&self, new: NewCustomer) -> Result<Customer, StoreError> {
        let name = required_text(new.name, "name")?;
        let email = required_text(new.email, "email")?;

        let mut tables = self.tables.write();
        let customer = Customer {
            id: tables.allocate_id(),
            name,
            email,
            join_date: Utc::now(),
        };
        tables.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    /// Update a customer's name and/or email.
    pub fn update_customer(&self, id: u64, patch: CustomerPatch) -> Result<Customer, StoreError> {
        if patch.name.is_none() && patch.email.is_none() {
            return Err(StoreError::Invalid("nothing to update".to_string()));
        }
        let name = patch.name.map(|n| required_text(Some(n), "name")).transpose()?;
        let email = patch.email.map(|e| required_text(Some(e), "email")).transpose()?;

        let mut tables = self.tables.write();
        let customer = tables
            .customers
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "customer", id })?;
        if let Some(name) = name {
            customer.name = name;
        }
        if let Some(email) = email {
            customer.email = email;
        }
        Ok(customer.clone())
    }

    /// Delete a customer and their orders.
    pub fn delete_customer(&self, id: u64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();
        tables
            .customers
            .remove(&id)
            .ok_or(StoreError::NotFound { entity: "customer", id })?;
        tables.orders.retain(|_, order| order.customer_id != id);
        Ok(id)
    }

    /// All items, by id
    pub fn items(&self) -> Vec<Item> {
        self.tables.read().items.values().cloned().collect()
    }

    /// Create an item; names are unique.
    pub fn create_item(&self, new: NewItem) -> Result<Item, StoreError> {
        let name = required_text(new.name, "name")?;
        let brand = required_text(new.brand, "brand")?;
        let price = new
            .price
            .ok_or_else(|| StoreError::Invalid("missing field 'price'".to_string()))?;

        let mut tables = self.tables.write();
        if tables.item_name_taken(&name, None) {
            return Err(StoreError::Conflict(format!("item '{name}' already exists")));
        }
        let item = Item {
            id: tables.allocate_id(),
            name,
            brand,
            price,
            available: new.available.unwrap_or(true),
        };
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    /// Update an item's fields.
    pub fn update_item(&self, id: u64, patch: ItemPatch) -> Result<Item, StoreError> {
        if patch.name.is_none()
            && patch.brand.is_none()
            && patch.price.is_none()
            && patch.available.is_none()
        {
            return Err(StoreError::Invalid("nothing to update".to_string()));
        }
        let name = patch.name.map(|n| required_text(Some(n), "name")).transpose()?;
        let brand = patch.brand.map(|b| required_text(Some(b), "brand")).transpose()?;

        let mut tables = self.tables.write();
        if !tables.items.contains_key(&id) {
            return Err(StoreError::NotFound { entity: "item", id });
        }
        if let Some(ref name) = name {
            if tables.item_name_taken(name, Some(id)) {
                return Err(StoreError::Conflict(format!("item '{name}' already exists")));
            }
        }

        let item = tables
            .items
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "item", id })?;
        if let Some(name) = name {
            item.name = name;
        }
        if let Some(brand) = brand {
            item.brand = brand;
        }
        if let Some(price) = patch.price {
            item.price = price;
        }
        if let Some(available) = patch.available {
            item.available = available;
        }
        Ok(item.clone())
    }

    /// Delete an item and every order for it.
    pub fn delete_item(&self, id: u64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();
        tables
            .items
            .remove(&id)
            .ok_or(StoreError::NotFound { entity: "item", id })?;
        tables.orders.retain(|_, order| order.item_id != id);
        Ok(id)
    }

    /// All orders, by id
    pub fn orders(&self) -> Vec<Order> {
        self.tables.read().orders.values().cloned().collect()
    }

    /// Submit an order for an available item.
    pub fn submit_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let customer_id = new
            .customer_id
            .ok_or_else(|| StoreError::Invalid("missing field 'customer_id'".to_string()))?;
        let item_id = new
            .item_id
            .ok_or_else(|| StoreError::Invalid("missing field 'item_id'".to_string()))?;
        let quantity = match new.quantity {
            Some(0) => return Err(StoreError::Invalid("quantity must be at least 1".to_string())),
            Some(q) => q,
            None => return Err(StoreError::Invalid("missing field 'quantity'".to_string())),
        };

        let mut tables = self.tables.write();
        if !tables.customers.contains_key(&customer_id) {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: customer_id,
            });
        }
        let item = tables
            .items
            .get(&item_id)
            .ok_or(StoreError::NotFound { entity: "item", id: item_id })?;
        if !item.available {
            return Err(StoreError::Unprocessable(format!(
                "item '{}' is not available",
                item.name
            )));
        }
        let amount_due = item.price.checked_mul(quantity).ok_or_else(|| {
            StoreError::Unprocessable("order total overflows".to_string())
        })?;

        let order = Order {
            id: tables.allocate_id(),
            order_date: Utc::now(),
            customer_id,
            item_id,
            quantity,
            amount_due,
            amount_paid: 0,
        };
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    /// Delete one order.
    pub fn delete_order(&self, id: u64) -> Result<OrderDeletion, StoreError> {
        let mut tables = self.tables.write();
        let previous_orders = tables.orders.len();
        tables
            .orders
            .remove(&id)
            .ok_or(StoreError::NotFound { entity: "order", id })?;
        Ok(OrderDeletion {
            deleted_id: id,
            previous_orders,
            current_orders: tables.orders.len(),
        })
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, StoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(StoreError::Invalid(format!("field '{field}' must not be empty"))),
        None => Err(StoreError::Invalid(format!("missing field '{field}'"))),
    }
}
