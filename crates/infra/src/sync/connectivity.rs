//! Reachability probe against a health URL.

use std::time::Duration;

use async_trait::async_trait;
use fieldsync_core::ConnectivityProbe;
use fieldsync_domain::FieldSyncError;
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::http::HttpClient;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reports online when the health URL answers with any HTTP status.
pub struct HttpConnectivityProbe {
    client: HttpClient,
    url: Url,
}

impl HttpConnectivityProbe {
    pub fn new(url: &str) -> Result<Self, FieldSyncError> {
        let url = Url::parse(url)
            .map_err(|e| FieldSyncError::Config(format!("invalid connectivity_url {url:?}: {e}")))?;
        let client = HttpClient::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_online(&self) -> bool {
        match self.client.send(self.client.request(Method::HEAD, self.url.clone())).await {
            Ok(response) => {
                debug!(url = %self.url, status = response.status().as_u16(), "connectivity probe answered");
                true
            }
            Err(err) => {
                debug!(url = %self.url, error = %err, "connectivity probe failed");
                false
            }
        }
    }
}
