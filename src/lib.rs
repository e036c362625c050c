//! # dash-api
//!
//! Authenticated API access layer for the dashboard backend.
//!
//! Attaches credentials to every outbound call, detects session expiry,
//! coordinates a single token refresh across any number of concurrent
//! requests, replays or fails those requests consistently, and decides when
//! the user has to sign in again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dash_api::{ApiClient, ClientConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::load("dash-api.toml".as_ref())?;
//!     let client = ApiClient::builder().config(config).build()?;
//!
//!     if client.rehydrate().await?.is_none() {
//!         client.login("ada", "correct horse").await?;
//!     }
//!
//!     let summary: serde_json::Value = client.get("/metrics/org-1/summary").await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `system-keyring` - Enable system keyring session storage

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod transport;

// Re-exports for ergonomic usage
pub use auth::{CallbackNavigator, LogNavigator, LoginRedirect, Navigator, TokenStore};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{Session, SessionStatus, User};
