//! REST API client module for the Librarian backend.
//!
//! This module provides the `ApiClient` through which every outbound call
//! passes. The client attaches the stored bearer token, retries transient
//! transport failures with exponential backoff, repairs a single expired
//! token by refreshing and replaying the call, and normalizes every
//! well-formed response into an `ApiResponse`.

pub mod client;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod events;
pub mod pipeline;

pub use client::{ApiClient, PendingRequest, RequestOptions};
pub use endpoints::ListQuery;
pub use envelope::{ApiResponse, Envelope, Pagination};
pub use error::ApiError;
pub use events::SessionEvent;
pub use reqwest::{Method, StatusCode};
