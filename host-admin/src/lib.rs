//! Admin control plane for a single-tenant function host process.
//!
//! Exposes the `/admin/*` surface used by the platform to assign this
//! instance to an app, poll host health and forward logs, plus the
//! `/runtime/webhooks/*` entry point for extension callbacks.

pub mod api;
pub mod assignment;
pub mod auth;
pub mod config;
pub mod debugger;
pub mod error;
pub mod events;
pub mod host;
pub mod middleware;
pub mod settings;
pub mod state;
pub mod status;
pub mod webhooks;

pub use error::AdminError;
pub use state::AppState;
