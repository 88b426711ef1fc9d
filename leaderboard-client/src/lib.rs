//! Leaderboard Tracking Client
//!
//! A small, type-safe HTTP client for the experiment-tracking service
//! (MLflow-compatible REST API 2.0).
//!
//! The runner uses it to read back the runs produced by a bundle and to
//! publish the averaged summary run.
//!
//! # Example
//!
//! ```no_run
//! use leaderboard_client::TrackingClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), leaderboard_client::ClientError> {
//!     let client = TrackingClient::new("http://localhost:5000");
//!
//!     let experiment = client.get_experiment_by_name("tum").await?;
//!     let runs = client.list_runs(&experiment.experiment_id).await?;
//!
//!     println!("{} runs in {}", runs.len(), experiment.name);
//!     Ok(())
//! }
//! ```

pub mod error;
mod experiments;
mod runs;

#[cfg(any(test, feature = "test-util"))]
pub mod test_server;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use leaderboard_core::dto::experiment::Experiment;
pub use leaderboard_core::dto::run::Run;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Path prefix of every tracking endpoint
const API_PREFIX: &str = "/api/2.0/mlflow";

/// Error code the service uses for missing experiments and runs
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// HTTP client for the tracking service
///
/// Endpoints are grouped by resource:
/// - Experiments (lookup by name)
/// - Runs (search, create, log batch, update)
#[derive(Debug, Clone)]
pub struct TrackingClient {
    /// Base URL of the tracking service (e.g., "http://localhost:5000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

/// Error body returned by the service
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

impl TrackingClient {
    /// Create a new tracking client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the tracking service (e.g., "http://localhost:5000")
    ///
    /// # Example
    /// ```
    /// use leaderboard_client::TrackingClient;
    ///
    /// let client = TrackingClient::new("http://localhost:5000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new tracking client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the tracking service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}/{}", self.base_url, API_PREFIX, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Failed requests are mapped onto [`ClientError`]; a missing resource
    /// becomes [`ClientError::NotFound`].
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Self::error_from_body(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle a response whose body carries nothing of interest
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Self::error_from_body(status.as_u16(), error_text));
        }

        Ok(())
    }

    fn error_from_body(status: u16, body: String) -> ClientError {
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) if err.error_code == RESOURCE_DOES_NOT_EXIST || status == 404 => {
                ClientError::NotFound(err.message)
            }
            Ok(err) => ClientError::api_error(status, err.error_code, err.message),
            Err(_) if status == 404 => ClientError::NotFound(body),
            Err(_) => ClientError::api_error(status, "UNKNOWN", body),
        }
    }
}
