//! Core check-in logic for kioskd
//!
//! This crate contains:
//! - The access registry: policy table and token store snapshots, reload, token admin
//! - The check-in engine (validate, decide, lock-write-audit, broadcast)
//! - Daily per-policy check-in files
//! - The live audit feed
//! - Admin listings and student edits

mod admin;
mod daily_log;
mod engine;
mod feed;
mod policy_table;
mod registry;
mod tokens;

pub use admin::*;
pub use daily_log::*;
pub use engine::*;
pub use feed::*;
pub use policy_table::*;
pub use registry::*;
pub use tokens::*;
