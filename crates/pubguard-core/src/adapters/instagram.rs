//! Instagram Graph API adapter (§6: publish supported, delete unsupported).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::Platform;
use crate::error::AdapterError;

use super::{PlatformAdapter, PublishOutcome, PublishRequest};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

/// Adapter over the Instagram Graph API's two-step container/publish flow.
pub struct InstagramAdapter {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl InstagramAdapter {
    pub fn new(access_token: String, dispatch_timeout: Duration) -> Self {
        InstagramAdapter {
            client: reqwest::Client::builder()
                .timeout(dispatch_timeout)
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token,
        }
    }

    pub fn with_base_url(access_token: String, dispatch_timeout: Duration, base_url: String) -> Self {
        InstagramAdapter {
            client: reqwest::Client::builder()
                .timeout(dispatch_timeout)
                .build()
                .unwrap_or_default(),
            base_url,
            access_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: i64,
}

fn classify_status(status: reqwest::StatusCode, message: String) -> AdapterError {
    if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
        AdapterError::Transient {
            platform: Platform::Instagram.as_str().to_string(),
            message,
        }
    } else {
        AdapterError::Permanent {
            platform: Platform::Instagram.as_str().to_string(),
            message,
        }
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, request: PublishRequest<'_>) -> Result<PublishOutcome, AdapterError> {
        // Instagram always requires an image (domain::Platform::requires_image);
        // the executor enforces that before dispatch (§4.5 step 4), so a
        // missing image here is a caller bug, not a platform rejection.
        let image_ref = request.image_ref.ok_or_else(|| AdapterError::Permanent {
            platform: Platform::Instagram.as_str().to_string(),
            message: "instagram publish called without an image reference".to_string(),
        })?;

        let mut caption = request.body.to_string();
        if !request.hashtags.is_empty() {
            caption.push_str("\n\n");
            caption.push_str(&request.hashtags.join(" "));
        }

        let container_url = format!("{}/{}/media", self.base_url, request.account_id);
        let container = self
            .client
            .post(&container_url)
            .form(&[
                ("image_url", image_ref),
                ("caption", caption.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Transient {
                platform: Platform::Instagram.as_str().to_string(),
                message: e.to_string(),
            })?;

        let status = container.status();
        if !status.is_success() {
            let message = container
                .json::<GraphErrorEnvelope>()
                .await
                .map(|e| format!("{} (code {})", e.error.message, e.error.code))
                .unwrap_or_else(|_| format!("instagram container creation failed with status {status}"));
            return Err(classify_status(status, message));
        }

        let container: ContainerResponse = container.json().await.map_err(|e| AdapterError::Transient {
            platform: Platform::Instagram.as_str().to_string(),
            message: format!("failed to decode instagram container response: {e}"),
        })?;

        let publish_url = format!("{}/{}/media_publish", self.base_url, request.account_id);
        let published = self
            .client
            .post(&publish_url)
            .form(&[
                ("creation_id", container.id.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Transient {
                platform: Platform::Instagram.as_str().to_string(),
                message: e.to_string(),
            })?;

        let status = published.status();
        if !status.is_success() {
            let message = published
                .json::<GraphErrorEnvelope>()
                .await
                .map(|e| format!("{} (code {})", e.error.message, e.error.code))
                .unwrap_or_else(|_| format!("instagram publish failed with status {status}"));
            return Err(classify_status(status, message));
        }

        let published: ContainerResponse = published.json().await.map_err(|e| AdapterError::Transient {
            platform: Platform::Instagram.as_str().to_string(),
            message: format!("failed to decode instagram publish response: {e}"),
        })?;

        Ok(PublishOutcome {
            post_url: format!("https://www.instagram.com/p/{}", published.id),
            post_id: published.id,
        })
    }

    /// Instagram's Graph API does not support deleting a published post
    /// (§6). The recovery service routes this outcome to
    /// `manual_recovery_needed` rather than treating it as a failure.
    async fn delete(&self, _account_id: &str, _post_id: &str) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            platform: Platform::Instagram.as_str().to_string(),
            operation: "delete".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_is_always_unsupported() {
        let adapter = InstagramAdapter::new("token".to_string(), Duration::from_secs(30));
        let err = adapter.delete("ig-account", "post-1").await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));
    }
}
