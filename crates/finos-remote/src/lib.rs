//! FinOS Remote - Adapters for the FinOS backend and the host platform
//!
//! Provides:
//! - A REST client for the sync API (server versions, incremental pulls,
//!   mutation pushes, identity lookup)
//! - An HTTP reachability probe used as the network monitor
//! - A keyring-backed unlock provider for desktops without biometrics
//!
//! ## Modules
//!
//! - [`client`] - HTTP client with authentication and 429 handling
//! - [`store`] - [`RestRemoteStore`], the `IRemoteStore` implementation
//! - [`reachability`] - [`HttpReachability`], the `INetworkMonitor` implementation
//! - [`credential`] - [`KeyringCredentialProvider`], the `IBiometricProvider` implementation

pub mod client;
pub mod credential;
pub mod reachability;
pub mod store;

pub use client::RestClient;
pub use credential::{KeyringCredentialProvider, KeyringSecret, Prompter, SecretStore};
pub use reachability::HttpReachability;
pub use store::RestRemoteStore;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the FinOS backend
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The API key was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The identity may not access the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests (429), retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other non-success status
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Classifies a non-success status; `detail` is the response body
    pub fn from_status(status: StatusCode, detail: &str) -> Self {
        let message = if detail.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", detail.trim())
        };
        match status {
            StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
            StatusCode::FORBIDDEN => RemoteError::Forbidden(message),
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            s if s.is_server_error() => RemoteError::ServerError(message),
            _ => RemoteError::UnexpectedStatus(message),
        }
    }
}
