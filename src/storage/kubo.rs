//! IPFS node RPC backend (`/api/v0/...`)

use super::http::{check, pinned_or_false, transport, trim_base};
use super::{PutOptions, RateLimiter, Storage, StoredObject};
use crate::error::IoResultExt;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BACKEND: &str = "kubo";

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash", default)]
    hash: String,
    #[serde(rename = "Size", default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, Value>,
}

/// Client for an IPFS node's RPC API
pub struct KuboStore {
    client: Client,
    api_url: String,
    token: Option<String>,
    limiter: RateLimiter,
}

impl fmt::Debug for KuboStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KuboStore")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("min_interval", &self.limiter.min_interval())
            .finish()
    }
}

impl KuboStore {
    pub fn new(api_url: impl AsRef<str>, token: Option<String>, min_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("snapvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| transport(BACKEND, e))?;
        Ok(Self {
            client,
            api_url: trim_base(api_url.as_ref()),
            token,
            limiter: RateLimiter::new(min_interval),
        })
    }

    fn rpc(&self, command: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}/api/v0/{}", self.api_url, command));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn add(&self, bytes: Vec<u8>, file_name: String, options: &PutOptions) -> Result<StoredObject> {
        self.limiter.wait().await;
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .rpc("add")
            .query(&[("pin", "true"), ("cid-version", "1")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        let added: AddResponse = check(BACKEND, response, None)
            .await?
            .json()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        if added.hash.is_empty() {
            return Err(Error::backend(BACKEND, "add response carried no content address"));
        }

        info!("Added {} to IPFS node", added.hash);
        Ok(StoredObject {
            metadata: json!({
                "name": options.name,
                "keyvalues": options.keyvalues,
                "size": added.size,
            }),
            id: added.hash,
        })
    }
}

#[async_trait]
impl Storage for KuboStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn put(&self, payload: &Value, options: &PutOptions) -> Result<StoredObject> {
        let bytes = serde_json::to_vec(payload)?;
        let file_name = options.name.clone().unwrap_or_else(|| "payload.json".to_string());
        self.add(bytes, file_name, options).await
    }

    async fn put_file(&self, path: &Path, options: &PutOptions) -> Result<StoredObject> {
        let bytes = tokio::fs::read(path).await.at_path(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        self.add(bytes, file_name, options).await
    }

    async fn get(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        debug!("Reading {} from IPFS node", id);
        let response = self
            .rpc("cat")
            .query(&[("arg", id)])
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        let bytes = check(BACKEND, response, Some(id))
            .await?
            .bytes()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::validation(format!("content {id} is not JSON: {e}")))
    }

    async fn get_metadata(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        let response = self
            .rpc("files/stat")
            .query(&[("arg", format!("/ipfs/{id}"))])
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        check(BACKEND, response, Some(id))
            .await?
            .json()
            .await
            .map_err(|e| transport(BACKEND, e))
    }

    async fn is_pinned(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        let outcome: Result<bool> = async {
            let response = self
                .rpc("pin/ls")
                .query(&[("arg", id), ("type", "recursive")])
                .send()
                .await
                .map_err(|e| transport(BACKEND, e))?;
            let listing: PinLsResponse = check(BACKEND, response, Some(id))
                .await?
                .json()
                .await
                .map_err(|e| transport(BACKEND, e))?;
            Ok(!listing.keys.is_empty())
        }
        .await;
        pinned_or_false(BACKEND, outcome)
    }

    async fn unpin(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        let response = self
            .rpc("pin/rm")
            .query(&[("arg", id)])
            .send()
            .await
            .map_err(|e| transport(BACKEND, e))?;
        check(BACKEND, response, Some(id)).await?;
        info!("Unpinned {}", id);
        Ok(true)
    }
}
