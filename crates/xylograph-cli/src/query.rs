//! One-shot remote query client.
//!
//! POSTs `{"query": …}` to an endpoint and returns the raw response body.
//! No session state, no retries; a non-success status is an error carrying
//! whatever body the endpoint sent back.

use anyhow::{anyhow, bail, Result};
use serde_json::json;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run_query(endpoint: &str, query: &str) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(QUERY_TIMEOUT)
        .build()
        .map_err(|e| anyhow!("failed to build http client: {e}"))?;

    let response = client
        .post(endpoint)
        .json(&json!({ "query": query }))
        .send()
        .map_err(|e| anyhow!("failed to reach {endpoint}: {e}"))?;

    let status = response.status();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        bail!("{endpoint} returned {status}: {body}");
    }
    Ok(body)
}
