// In crates/api-client/src/types.rs

use reqwest::Client;

/// The HTTP client for the upstream price provider.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The persistent HTTP client, built with the per-request timeout.
    pub http_client: Client,
    /// The key sent as the `apikey` query parameter.
    pub api_key: String,
    /// The base URL of the provider's REST API.
    pub base_url: String,
}
