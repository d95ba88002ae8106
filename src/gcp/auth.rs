//! # GCP Authentication
//!
//! This module handles authentication with Google Cloud Platform using the
//! OAuth 2.0 flow for service accounts. It provides a function to obtain a
//! temporary access token that can be used to authorize Compute Engine requests.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use cached::proc_macro::cached;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::gcp::types::{AccessToken, ServiceAccount, TokenSource};

/// The Google OAuth2 token endpoint, used when the key file does not name one.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Lifetime requested for each token. Cached tokens are refreshed well before this.
const TOKEN_LIFETIME_SECS: u64 = 3600;

/// Represents the claims in the JSON Web Token (JWT) used for authentication.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// The issuer of the token (the service account's email address).
    iss: String,
    /// The scope of the requested permissions.
    scope: String,
    /// The audience for the token (the token endpoint URL).
    aud: String,
    /// The expiration time of the token (Unix timestamp).
    exp: u64,
    /// The time the token was issued (Unix timestamp).
    iat: u64,
}

/// Returns a bearer token for the given source.
pub async fn get_access_token(source: &TokenSource) -> Result<String> {
    match source {
        TokenSource::Static(token) => Ok(token.clone()),
        TokenSource::ServiceAccountFile(path) => {
            service_account_token(path.to_string_lossy().into_owned()).await
        }
    }
}

/// Fetches a GCP access token for the service account whose key is at `key_path`.
///
/// This function performs the server-to-server OAuth 2.0 flow:
/// 1. Reads the service account key file.
/// 2. Creates a JWT with claims asserting the service account's identity
///    and the requested API scope.
/// 3. Signs the JWT using the service account's private key (RS256).
/// 4. Sends the signed JWT to the token endpoint and receives an access token.
///
/// Tokens are cached per key file for 50 minutes; a migration of many disks
/// easily outlives a single token.
#[cached(
    time = 3000,
    result = true,
    key = "String",
    convert = r#"{ key_path.clone() }"#
)]
async fn service_account_token(key_path: String) -> Result<String> {
    // 1. Read the service account key file.
    let service_account = read_service_account(Path::new(&key_path))?;

    // 2. Create the JWT claims.
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let token_url = if service_account.token_uri.is_empty() {
        TOKEN_URL.to_string()
    } else {
        service_account.token_uri.clone()
    };
    let claims = Claims {
        iss: service_account.client_email.clone(),
        scope: SCOPE.to_string(),
        aud: token_url.clone(),
        exp: now + TOKEN_LIFETIME_SECS,
        iat: now,
    };

    // 3. Sign the JWT.
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(service_account.private_key_id.clone());
    let encoding_key = EncodingKey::from_rsa_pem(service_account.private_key.as_bytes())
        .context("Invalid private key in service account file")?;
    let jwt = encode(&header, &claims, &encoding_key)?;

    // 4. Exchange the JWT for an access token.
    let params = [
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", jwt.as_str()),
    ];

    let response = crate::client::CLIENT
        .post(&token_url)
        .form(&params)
        .send()
        .await
        .context("Failed to call token endpoint")?;

    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(anyhow::anyhow!(
            "Failed to get access token: {}",
            error_text
        ));
    }

    let token_response: AccessToken = response.json().await?;
    tracing::debug!(
        "Obtained access token for {} (expires in {}s)",
        service_account.client_email,
        token_response.expires_in
    );
    Ok(token_response.access_token)
}

fn read_service_account(path: &Path) -> Result<ServiceAccount> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service account file {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid service account file {}", path.display()))
}
