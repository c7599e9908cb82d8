//! Chain event indexing and reconciliation engine.
//!
//! Source adapters pull bridge, native token, yield token and FX settlement
//! logs from each configured chain. The reconciler folds them into an
//! idempotent PostgreSQL ledger, completes bridge transfers when their mint
//! lands, and keeps daily/hourly summaries current.

pub mod adapters;
pub mod aggregation;
pub mod api;
pub mod chain;
pub mod config;
pub mod database;
pub mod domains;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod store;
