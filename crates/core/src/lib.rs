//! `storekeep-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;

pub use aggregate::Aggregate;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ApprovalId, CategoryId, IssuanceId, ItemId, RequestId, RequestItemId, UserId};
pub use quantity::{MAX_QUANTITY, ensure_bounded};
