//! Facebook Graph API adapter (§6: publish and delete both supported).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::Platform;
use crate::error::AdapterError;

use super::{PlatformAdapter, PublishOutcome, PublishRequest};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

/// Adapter over the Facebook Graph API's page-feed endpoints.
pub struct FacebookAdapter {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl FacebookAdapter {
    pub fn new(access_token: String, dispatch_timeout: Duration) -> Self {
        FacebookAdapter {
            client: reqwest::Client::builder()
                .timeout(dispatch_timeout)
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token,
        }
    }

    /// Override the base URL, for tests against a local mock server.
    pub fn with_base_url(access_token: String, dispatch_timeout: Duration, base_url: String) -> Self {
        FacebookAdapter {
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
struct FeedPostResponse {
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
            platform: Platform::Facebook.as_str().to_string(),
            message,
        }
    } else {
        AdapterError::Permanent {
            platform: Platform::Facebook.as_str().to_string(),
            message,
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, request: PublishRequest<'_>) -> Result<PublishOutcome, AdapterError> {
        let mut message = request.body.to_string();
        if !request.hashtags.is_empty() {
            message.push_str("\n\n");
            message.push_str(&request.hashtags.join(" "));
        }

        let url = format!("{}/{}/feed", self.base_url, request.account_id);
        let mut form: Vec<(&str, String)> = vec![
            ("message", message),
            ("access_token", self.access_token.clone()),
        ];
        if let Some(image_ref) = request.image_ref {
            form.push(("link", image_ref.to_string()));
        }

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AdapterError::Transient {
                platform: Platform::Facebook.as_str().to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GraphErrorEnvelope>()
                .await
                .map(|e| format!("{} (code {})", e.error.message, e.error.code))
                .unwrap_or_else(|_| format!("facebook publish failed with status {status}"));
            return Err(classify_status(status, message));
        }

        let posted: FeedPostResponse = response.json().await.map_err(|e| AdapterError::Transient {
            platform: Platform::Facebook.as_str().to_string(),
            message: format!("failed to decode facebook response: {e}"),
        })?;

        Ok(PublishOutcome {
            post_url: format!("https://www.facebook.com/{}", posted.id),
            post_id: posted.id,
        })
    }

    async fn delete(&self, _account_id: &str, post_id: &str) -> Result<(), AdapterError> {
        let url = format!("{}/{}", self.base_url, post_id);
        let response = self
            .client
            .delete(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| AdapterError::Transient {
                platform: Platform::Facebook.as_str().to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GraphErrorEnvelope>()
                .await
                .map(|e| format!("{} (code {})", e.error.message, e.error.code))
                .unwrap_or_else(|_| format!("facebook delete failed with status {status}"));
            return Err(classify_status(status, message));
        }

        Ok(())
    }
}
