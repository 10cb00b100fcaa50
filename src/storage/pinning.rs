//! HTTP pinning-service backend (pinJSONToIPFS / pinList / unpin API)

use super::http::{check, pinned_or_false, transport, trim_base};
use super::{PutOptions, RateLimiter, Storage, StoredObject};
use crate::error::IoResultExt;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BACKEND: &str = "pinning";

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash", default)]
    ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pin_size: u64,
    #[serde(rename = "Timestamp", default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PinList {
    #[serde(default)]
    rows: Vec<Value>,
}

/// Client for a pinning service that speaks the pinJSONToIPFS family of endpoints
pub struct PinningService {
    client: Client,
    api_url: String,
    gateway_url: String,
    jwt: Option<String>,
    limiter: RateLimiter,
}

impl fmt::Debug for PinningService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinningService")
            .field("api_url", &self.api_url)
            .field("gateway_url", &self.gateway_url)
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .field("min_interval", &self.limiter.min_interval())
            .finish()
    }
}

impl PinningService {
    pub fn new(
        api_url: impl AsRef<str>,
        gateway_url: impl AsRef<str>,
        jwt: Option<String>,
        min_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("snapvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| transport(BACKEND, e))?;
        Ok(Self {
            client,
            api_url: trim_base(api_url.as_ref()),
            gateway_url: trim_base(gateway_url.as_ref()),
            jwt,
            limiter: RateLimiter::new(min_interval),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.jwt {
            Some(jwt) => request.bearer_auth(jwt),
            None => request,
        }
    }

    fn pin_metadata(options: &PutOptions) -> Value {
        json!({
            "name": options.name,
            "keyvalues": options.keyvalues,
        })
    }

    async fn finish_pin(response: reqwest::Response) -> Result<StoredObject> {
        let pin: PinResponse = response.json().await.map_err(|e| transport(BACKEND, e))?;
        if pin.ipfs_hash.is_empty() {
            return Err(Error::backend(BACKEND, "pin response carried no content address"));
        }
        info!("Pinned {} ({} bytes)", pin.ipfs_hash, pin.pin_size);
        Ok(StoredObject {
            metadata: json!({
                "size": pin.pin_size,
                "timestamp": pin.timestamp,
            }),
            id: pin.ipfs_hash,
        })
    }

    async fn pin_rows(&self, id: &str) -> Result<Vec<Value>> {
        self.limiter.wait().await;
        let request = self
            .client
            .get(format!("{}/data/pinList", self.api_url))
            .query(&[("hashContains", id), ("status", "pinned")]);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        let list: PinList = check(BACKEND, response, Some(id))
            .await?
            .json()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        Ok(list.rows)
    }
}

#[async_trait]
impl Storage for PinningService {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn put(&self, payload: &Value, options: &PutOptions) -> Result<StoredObject> {
        self.limiter.wait().await;
        let body = json!({
            "pinataContent": payload,
            "pinataMetadata": Self::pin_metadata(options),
        });
        let request = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
            .json(&body);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        Self::finish_pin(check(BACKEND, response, None).await?).await
    }

    async fn put_file(&self, path: &Path, options: &PutOptions) -> Result<StoredObject> {
        let bytes = tokio::fs::read(path).await.at_path(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        self.limiter.wait().await;
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("pinataMetadata", Self::pin_metadata(options).to_string());
        let request = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .multipart(form);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        Self::finish_pin(check(BACKEND, response, None).await?).await
    }

    async fn get(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        debug!("Fetching {} from gateway", id);
        let response = self
            .client
            .get(format!("{}/ipfs/{}", self.gateway_url, id))
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        check(BACKEND, response, Some(id))
            .await?
            .json()
            .await
            .map_err(|e| Error::validation(format!("gateway returned non-JSON content for {id}: {e}")))
    }

    async fn get_metadata(&self, id: &str) -> Result<Value> {
        self.pin_rows(id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }

    async fn is_pinned(&self, id: &str) -> Result<bool> {
        let outcome = self.pin_rows(id).await.map(|rows| !rows.is_empty());
        pinned_or_false(BACKEND, outcome)
    }

    async fn unpin(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        let request = self
            .client
            .delete(format!("{}/pinning/unpin/{}", self.api_url, id));
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        check(BACKEND, response, Some(id)).await?;
        info!("Unpinned {}", id);
        Ok(true)
    }
}
