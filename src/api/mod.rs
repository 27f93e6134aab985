//! HTTP client for the resource API.
//!
//! ## Structure
//!
//! - `client`: `ApiClient`, typed calls for the resource endpoints
//! - `auth`: bearer-token session with one-shot refresh on 401
//! - `retry`: exponential backoff policy for transient failures
//! - `error`: `ApiError` and the status-code mapping

mod auth;
mod client;
mod error;
mod retry;


pub use auth::{AuthListener, AuthSession, AuthTokens};
pub use client::{ApiClient, ApiClientConfig};
pub use error::ApiError;
pub use retry::RetryPolicy;
