//! Platform adapter abstraction (§6, §9 design notes).
//!
//! Two operations -- `publish` and `delete` -- cover everything C5 and C6
//! need from an external platform. Keeping Instagram's lack of deletion out
//! of the executor and recovery service's control flow and into the
//! adapter's `AdapterError::Unsupported` return value means neither caller
//! needs a platform-specific branch; they just pattern-match the outcome.

pub mod facebook;
pub mod instagram;

use async_trait::async_trait;

use crate::domain::Platform;
use crate::error::AdapterError;

/// A draft's fields relevant to a publish call. A narrow view rather than
/// the full storage `Draft` so adapters don't depend on the storage crate
/// internals.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub account_id: &'a str,
    pub body: &'a str,
    pub hashtags: &'a [String],
    pub image_ref: Option<&'a str>,
}

/// Result of a successful publish call (§6).
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub post_id: String,
    pub post_url: String,
}

/// External, platform-specific implementation of the actual network
/// publish/delete call. Implementations are adapters over each platform's
/// HTTP API; the core only depends on this trait.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform this adapter dispatches for.
    fn platform(&self) -> Platform;

    /// Publish a draft. `Transient` failures are retried by the executor;
    /// `Permanent` failures go straight to `failed` (§4.5 step 8).
    async fn publish(&self, request: PublishRequest<'_>) -> Result<PublishOutcome, AdapterError>;

    /// Delete a previously published post. Platforms that cannot delete
    /// (Instagram today) return `Unsupported` rather than attempting and
    /// failing, so the recovery service can route straight to
    /// `manual_recovery_needed` (§4.6).
    async fn delete(&self, account_id: &str, post_id: &str) -> Result<(), AdapterError>;
}

/// A registry of adapters keyed by platform, assembled once at startup and
/// shared (behind an `Arc`) by the scheduler and recovery service.
pub struct AdapterRegistry {
    facebook: std::sync::Arc<dyn PlatformAdapter>,
    instagram: std::sync::Arc<dyn PlatformAdapter>,
}

impl AdapterRegistry {
    pub fn new(
        facebook: std::sync::Arc<dyn PlatformAdapter>,
        instagram: std::sync::Arc<dyn PlatformAdapter>,
    ) -> Self {
        AdapterRegistry { facebook, instagram }
    }

    pub fn get(&self, platform: Platform) -> std::sync::Arc<dyn PlatformAdapter> {
        match platform {
            Platform::Facebook => self.facebook.clone(),
            Platform::Instagram => self.instagram.clone(),
        }
    }
}
