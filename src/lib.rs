//! Asset lifecycle tracking with an approval-gated request workflow.
//!
//! Physical assets move through a fixed status machine and every move is
//! appended to a hash-chained ledger. Employees raise requests for assets,
//! which pass a chain of approvers before an administrator fulfills them.
pub mod approval;
pub mod asset;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod lifecycle;
pub mod movement;
pub mod policy;
pub mod request;
pub mod service;
pub mod status;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{Result, WorkflowError};
pub use service::AssetService;
