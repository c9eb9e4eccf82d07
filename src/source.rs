// ===============================
// src/source.rs
// ===============================
//
// Backend data endpoint:
//   GET {base_url}/api/data/{symbol}?limit={n}
//   200 -> { ticker?, fundamentals: {..}, price_data: [..] }
//   404 -> { "error": "Data not availiable" } when the backend has no rows
//
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::domain::{DataSnapshot, FetchRequest};
use crate::error::FetchError;

/// Anything that can resolve a FetchRequest into a snapshot.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self, req: &FetchRequest) -> impl Future<Output = Result<DataSnapshot, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    base_url: Url,
    limit: u32,
}

impl HttpSource {
    pub fn new(base_url: Url, limit: u32, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, limit))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url, limit: u32) -> Self {
        Self { http, base_url, limit }
    }

    pub fn url_for(&self, req: &FetchRequest) -> String {
        format!(
            "{}/api/data/{}?limit={}",
            self.base_url.as_str().trim_end_matches('/'),
            urlencoding::encode(req.symbol.as_str()),
            self.limit
        )
    }
}

impl SnapshotSource for HttpSource {
    async fn fetch(&self, req: &FetchRequest) -> Result<DataSnapshot, FetchError> {
        let url = self.url_for(req);
        debug!(%url, seq = req.sequence, "GET");

        let rsp = self.http.get(&url).send().await?;
        let status = rsp.status();
        let body = rsp.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(FetchError::Http { status: status.as_u16(), detail });
        }

        Ok(serde_json::from_slice::<DataSnapshot>(&body)?)
    }
}
