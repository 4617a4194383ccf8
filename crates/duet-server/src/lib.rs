//! # Duet Server
//!
//! Pairs two WebSocket clients into a room named by an opaque token and
//! relays JSON messages between them.
//!
//! - [`relay`] - admission, message pump, and teardown per connection
//! - [`handlers`] - axum routes (`/`, `/create-room`, `/health`)
//! - [`config`] - TOML + environment configuration
//! - [`metrics`] - Prometheus instrumentation

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod relay;

pub use config::Config;
pub use handlers::{app, run_server, start_server_with_state, AppState};
pub use relay::{RelayService, SessionOutcome};
