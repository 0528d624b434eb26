//! # DriveSync Sync Server
//!
//! HTTP sync server for DriveSync.
//!
//! This crate provides:
//! - The sync API under `/api/v1/` (changes, chunked upload, delete, list,
//!   download, share unlock) on axum
//! - Share links: password-gated, scoped, with HMAC-SHA256 signed credentials
//! - Optional bearer-key authentication for sync clients
//! - A background sweeper for abandoned uploads
//!
//! # Authentication
//!
//! Sync endpoints are open unless a key is configured:
//!
//! ```rust,ignore
//! use drivesync_sync_server::{ServerConfig, SyncServer};
//!
//! let config = ServerConfig::new("/srv/drive", secret).with_sync_api_key("k3y");
//! let server = SyncServer::new(config)?;
//! // clients now send `Authorization: Bearer k3y`
//! ```
//!
//! Anonymous `list` and `download` requests carry `token=<share token>` and
//! the credential returned by `share/unlock`, either in the
//! `drivesync_share_<token>` cookie or the `X-Share-Credential` header.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod routes;
mod server;

pub use auth::{
    sanitize_token, share_cookie_name, within_scope, ApiKeyValidator, ShareCredential,
    ShareTokenService, SHARE_COOKIE_PREFIX, SHARE_TOKEN_LEN,
};
pub use config::{ServerConfig, DEFAULT_BIND_ADDR};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestAuth, RequestHandler};
pub use routes::{create_router, AppState, SHARE_CREDENTIAL_HEADER};
pub use server::{spawn_sweeper, SyncServer};
