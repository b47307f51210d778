//! Core library for The Librarian client.
//!
//! - `api`: the gateway client every backend call passes through
//! - `auth`: session token accessor and its storage backends
//! - `config`: client configuration (base URL, retry policy, routes)
//! - `models`: wire types for the Librarian resources

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiResponse, Envelope, RequestOptions, SessionEvent};
pub use auth::Session;
pub use config::ClientConfig;
