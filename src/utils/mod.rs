//! Utility Module
//!
//! Crypto primitives, atomic file writes and logging setup shared by the
//! services and the binary.

pub mod crypto_utils;
pub mod io;
pub mod logging;

pub use self::{
    crypto_utils::{secure_compare, random_bytes},
    io::{ensure_parent_dir, write_atomic},
    logging::{init_logging, LogLevel},
};
