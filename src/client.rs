use once_cell::sync::Lazy;

/// Shared HTTP client for every Compute Engine and OAuth request.
pub static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .expect("failed to build reqwest client")
});
