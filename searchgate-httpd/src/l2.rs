//! Shared-cache client over a plain HTTP key-value service.
//!
//! The L2 tier is any KV store that speaks `GET`/`PUT`/`DELETE` on
//! `/kv/{key}` with a `ttl` query parameter on writes. Every operation
//! carries a short timeout of its own: the cache layer treats failures as
//! misses, so a slow L2 must never hold a request hostage.

use async_trait::async_trait;
use searchgate_service::{GatewayError, RemoteCache};
use std::time::Duration;

/// HTTP key-value [`RemoteCache`] implementation.
#[derive(Debug, Clone)]
pub struct HttpKvCache {
    client: reqwest::Client,
    endpoint: String,
    op_timeout: Duration,
}

impl HttpKvCache {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, op_timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            op_timeout,
        }
    }

    fn url(&self, key: &str) -> String {
        format!("{}/kv/{key}", self.endpoint.trim_end_matches('/'))
    }

    fn fault(e: reqwest::Error) -> GatewayError {
        GatewayError::cache_fault(e.to_string())
    }
}

#[async_trait]
impl RemoteCache for HttpKvCache {
    async fn get(&self, key: &str) -> searchgate_service::Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.url(key))
            .timeout(self.op_timeout)
            .send()
            .await
            .map_err(Self::fault)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(GatewayError::cache_fault(format!(
                "L2 read returned {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(Self::fault)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> searchgate_service::Result<()> {
        let response = self
            .client
            .put(self.url(key))
            .query(&[("ttl", ttl.as_secs())])
            .timeout(self.op_timeout)
            .body(value.to_vec())
            .send()
            .await
            .map_err(Self::fault)?;

        if !response.status().is_success() {
            return Err(GatewayError::cache_fault(format!(
                "L2 write returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> searchgate_service::Result<()> {
        self.client
            .delete(self.url(key))
            .timeout(self.op_timeout)
            .send()
            .await
            .map_err(Self::fault)?;
        Ok(())
    }

    async fn clear(&self) -> searchgate_service::Result<()> {
        self.client
            .post(format!("{}/flush", self.endpoint.trim_end_matches('/')))
            .timeout(self.op_timeout)
            .send()
            .await
            .map_err(Self::fault)?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        matches!(
            self.client
                .get(format!("{}/ping", self.endpoint.trim_end_matches('/')))
                .timeout(Duration::from_secs(1))
                .send()
                .await,
            Ok(response) if response.status().is_success()
        )
    }
}
