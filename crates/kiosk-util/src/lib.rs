//! Shared utilities for kioskd
//!
//! This crate provides:
//! - ID types (ClientId) and kiosk token generation
//! - Wall-clock time utilities and admission windows
//! - Default paths for socket, data, and log directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
