//! Protocol types for kioskd IPC
//!
//! This crate defines the stable API between kioskd and its clients
//! (kiosks and the admin UI):
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> subscribed clients)
//! - Domain records shared by every layer (students, audit records, policies, tokens)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
