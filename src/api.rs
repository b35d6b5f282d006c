use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::GrantsError;

/// Outcome of a single page request that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResponse {
    /// Records found under `result.<collection_key>`; empty when the key is absent.
    Records(Vec<Value>),
    /// Any status other than 200.
    Status(u16),
}

pub trait SavingsClient: Send + Sync {
    /// Requests one page. Transport failures are returned as `Err`; a non-200
    /// answer is an `Ok(PageResponse::Status)`.
    fn fetch_page(
        &self,
        endpoint: &str,
        collection_key: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, GrantsError>;
}

#[derive(Clone)]
pub struct SavingsHttpClient {
    client: Client,
}

impl SavingsHttpClient {
    pub fn new() -> Result<Self, GrantsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("doge-grants/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GrantsError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| GrantsError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl SavingsClient for SavingsHttpClient {
    fn fetch_page(
        &self,
        endpoint: &str,
        collection_key: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, GrantsError> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .map_err(|err| GrantsError::Http(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Ok(PageResponse::Status(response.status().as_u16()));
        }
        let body: Value = response
            .json()
            .map_err(|err| GrantsError::Http(err.to_string()))?;
        Ok(PageResponse::Records(extract_records(&body, collection_key)))
    }
}

/// Pulls `result.<collection_key>` out of a page body.
pub fn extract_records(body: &Value, collection_key: &str) -> Vec<Value> {
    body.get("result")
        .and_then(|result| result.get(collection_key))
        .and_then(|records| records.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Drains a paginated collection, starting at page 1.
///
/// Stops at the first empty page or the first non-200 page. In the latter case the
/// records gathered so far are returned as the complete result. Transport errors
/// propagate.
pub fn fetch_all_records<C: SavingsClient + ?Sized>(
    client: &C,
    endpoint: &str,
    collection_key: &str,
    per_page: u32,
) -> Result<Vec<Value>, GrantsError> {
    let mut records = Vec::new();
    let mut page = 1u32;

    loop {
        match client.fetch_page(endpoint, collection_key, page, per_page)? {
            PageResponse::Status(status) => {
                warn!(collection = collection_key, page, status, "page request failed");
                break;
            }
            PageResponse::Records(data) if data.is_empty() => break,
            PageResponse::Records(data) => {
                info!(
                    collection = collection_key,
                    page,
                    count = data.len(),
                    "fetched page"
                );
                records.extend(data);
                page += 1;
            }
        }
    }

    Ok(records)
}
