use serde::{Deserialize, Serialize};

// Generic GCP types shared across services (service-agnostic).

/// The parts of a service-account key file needed to mint access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type")]
    pub account_type: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default)]
    pub token_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Where bearer tokens for API calls come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Exchange a signed JWT for a token using a service-account key file.
    ServiceAccountFile(std::path::PathBuf),
    /// Use a pre-issued token as is (e.g. `gcloud auth print-access-token`).
    Static(String),
}
