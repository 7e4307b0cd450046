//! Avatar storage behind the Cloudinary upload API.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Mutex;

#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Upload image bytes under a stable per-user id and return the
    /// public URL of the stored image.
    async fn upload(
        &self,
        public_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, anyhow::Error>;
}

#[derive(Clone)]
pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryStore {
    pub fn new(config: &crate::config::CloudinaryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    /// Request signature over the signed params in alphabetical order,
    /// with the API secret appended.
    fn sign(&self, public_id: &str, timestamp: i64) -> String {
        let to_sign = format!(
            "overwrite=true&public_id={}&timestamp={}{}",
            public_id, timestamp, self.api_secret
        );
        let digest = Sha256::digest(to_sign.as_bytes());
        hex::encode(digest)
    }
}

#[async_trait]
impl AvatarStore for CloudinaryStore {
    async fn upload(
        &self,
        public_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, anyhow::Error> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.sign(public_id, timestamp);

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(bytes).file_name(filename.to_string()),
            )
            .text("public_id", public_id.to_string())
            .text("overwrite", "true")
            .text("timestamp", timestamp.to_string())
            .text("api_key", self.api_key.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Avatar upload request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "Avatar upload rejected");
            anyhow::bail!("Avatar upload rejected with status {}", status);
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Unexpected avatar upload response: {}", e))?;

        Ok(parsed.secure_url)
    }
}

/// Test double. Records uploads and hands back a deterministic URL.
#[derive(Default)]
pub struct MockAvatarStore {
    uploads: Mutex<Vec<String>>,
}

impl MockAvatarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AvatarStore for MockAvatarStore {
    async fn upload(
        &self,
        public_id: &str,
        _filename: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, anyhow::Error> {
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(public_id.to_string());
        }
        Ok(format!("https://images.example.com/{}", public_id))
    }
}
