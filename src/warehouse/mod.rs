//! The warehouse service: customers, items and orders.

pub mod model;
pub mod routes;
pub mod store;

pub use model::{Customer, CustomerPatch, Item, ItemPatch, NewCustomer, NewItem, NewOrder, Order};
pub use routes::{ApiError, SharedStore, routes};
pub use store::{OrderDeletion, StoreError, WarehouseStore};
