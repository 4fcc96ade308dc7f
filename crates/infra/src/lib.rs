//! Infrastructure layer: the stock store, the engines that mutate it, the
//! read-side queries, post-commit notification and configuration.

pub mod catalog;
pub mod config;
pub mod error;
pub mod issuance;
pub mod notify;
pub mod queries;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod integration_tests;

pub use catalog::CatalogService;
pub use config::{AppConfig, ConfigError, StoreBackend};
pub use error::{OperationError, OperationResult, StoreError, StoreResult};
pub use issuance::IssuanceEngine;
pub use notify::{
    BroadcastNotifier, BusNotifier, FanoutNotifier, Notifier, NotifyError, Signal, TracingNotifier,
};
pub use queries::QueryService;
pub use store::{InMemoryStore, InventoryStore, PostgresStore, UnitOfWork};
pub use workflow::{DecisionInput, WorkflowEngine};
