//! Thin reqwest helper producing operations the fetcher can drive.
//!
//! The fetcher itself never sees the transport; these functions adapt
//! HTTP JSON GETs into its `Fn() -> Future<Result<Value>>` boundary.

use crate::error::{Result, SyncError};
use futures::future::BoxFuture;
use log::warn;
use serde_json::Value;

/// One HTTP JSON GET, mapped into the error taxonomy: connection
/// failures become `Transport`, request timeouts `Timeout`, non-2xx
/// statuses `HttpStatus`.
pub async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    let response = client.get(url).send().await.map_err(SyncError::from)?;
    let status = response.status();
    if !status.is_success() {
        warn!("HTTP error {} from {}", status, url);
        return Err(SyncError::HttpStatus(status.as_u16()));
    }
    response.json::<Value>().await.map_err(SyncError::from)
}

/// Package a GET as a reusable operation closure for
/// `ResilientFetcher::request`.
pub fn get_operation(
    client: reqwest::Client,
    url: String,
) -> impl FnMut() -> BoxFuture<'static, Result<Value>> {
    move || {
        let client = client.clone();
        let url = url.clone();
        Box::pin(async move { get_json(&client, &url).await })
    }
}
