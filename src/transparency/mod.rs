//! Transparency module for the Synheart Sync Agent.
//!
//! Tracks what the agent sent, what failed, and what was dropped, so the
//! user can audit the upload history without reading the queue file.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
