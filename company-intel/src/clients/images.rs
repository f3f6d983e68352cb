use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::path::PathBuf;
use uuid::Uuid;

use super::{BlobStore, GeneratedImage, ImageClient};

const IMAGES_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";

/// Image client backed by the OpenAI images API
pub struct OpenAiImage {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiImage {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: "dall-e-3".to_string(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl ImageClient for OpenAiImage {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GeneratedImage> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "quality": "standard",
            "response_format": "b64_json",
        });

        let response = self
            .http
            .post(IMAGES_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("image request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("image service returned {}: {}", status, body));
        }

        let payload: Value = response.json().await?;
        let first = payload
            .get("data")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .ok_or_else(|| anyhow::anyhow!("empty image response"))?;

        if let Some(b64) = first.get("b64_json").and_then(|v| v.as_str()) {
            let bytes = BASE64
                .decode(b64)
                .map_err(|e| anyhow::anyhow!("invalid base64 image payload: {}", e))?;
            return Ok(GeneratedImage::Bytes(bytes));
        }
        if let Some(url) = first.get("url").and_then(|v| v.as_str()) {
            return Ok(GeneratedImage::HostedUrl(url.to_string()));
        }
        Err(anyhow::anyhow!("image response had neither b64_json nor url"))
    }
}

/// Blob store that writes images under a local directory and returns a
/// `file://` url. Suitable for the CLI; services plug in their own backend.
pub struct FsBlobStore {
    dir: PathBuf,
    http: reqwest::Client,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, image: GeneratedImage) -> anyhow::Result<String> {
        let bytes = match image {
            GeneratedImage::Bytes(bytes) => bytes,
            GeneratedImage::HostedUrl(url) => {
                // Provider-hosted urls expire; fetch now to make them durable
                let response = self.http.get(&url).send().await?;
                response.bytes().await?.to_vec()
            }
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("file://{}", path.display()))
    }
}
