//! padlink: operator client for the FSR pad profile server
//!
//! Wraps the `padlink-session` crate in a long-running binary: it loads a
//! TOML configuration, sets up logging, keeps a self-healing session to the
//! server and lets an operator drive it from stdin.
//!
//! ## Modules
//!
//! * `config`: Configuration structures, loading, validation, and defaults.
//!   The `[session]` table is `padlink_session::SessionConfig`.
//!
//! * `core`: Runtime components:
//!   - Operator console parsing and the stdin loop
//!   - Readiness state derived from the session's connection state
//!   - Log reporters for sensor, profile and presence frames
//!
//! * `logger`: Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! ## Features
//!
//! * `journald`: Enables the systemd journald log layer (default: enabled).

pub mod config;
pub mod core;
pub mod logger;
