//! Inventory domain module.
//!
//! Business rules for the stock catalog, implemented as deterministic domain
//! logic (no IO, no HTTP, no storage). Quantity only ever changes through
//! [`Item::apply_delta`], which refuses to go below zero.

pub mod category;
pub mod issuance;
pub mod item;
pub mod low_stock;

pub use category::{Category, NewCategory};
pub use issuance::{IssuanceRecord, IssueStock};
pub use item::{Item, ItemDraft, ItemPatch};
pub use low_stock::{LowStockAlert, is_low, low_stock_alerts};
