//! Shared vocabulary types for the approval, publishing, and recovery core.
//!
//! These are the enumerated fields referenced across the data model (§3):
//! platforms, draft/queue/recovery statuses, publish mode, actor, and
//! urgency. Keeping them in one place means the transition table (C3), the
//! storage layer (C1), and the scheduler (C5) all speak the same vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported publishing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    /// Instagram always requires an image; Facebook only when an image
    /// prompt was supplied on the draft (§4.5 executor step 4).
    pub fn requires_image(self, has_image_prompt: bool) -> bool {
        match self {
            Platform::Instagram => true,
            Platform::Facebook => has_image_prompt,
        }
    }

    /// Whether this platform's adapter supports the `delete` operation (§6).
    pub fn supports_delete(self) -> bool {
        matches!(self, Platform::Facebook)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Draft lifecycle status (§4.3 transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    InReview,
    Approved,
    Rejected,
    Skipped,
    Published,
    Recovered,
}

impl DraftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::InReview => "in_review",
            DraftStatus::Approved => "approved",
            DraftStatus::Rejected => "rejected",
            DraftStatus::Skipped => "skipped",
            DraftStatus::Published => "published",
            DraftStatus::Recovered => "recovered",
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DraftStatus::Draft),
            "in_review" => Ok(DraftStatus::InReview),
            "approved" => Ok(DraftStatus::Approved),
            "rejected" => Ok(DraftStatus::Rejected),
            "skipped" => Ok(DraftStatus::Skipped),
            "published" => Ok(DraftStatus::Published),
            "recovered" => Ok(DraftStatus::Recovered),
            other => Err(format!("unknown draft status: {other}")),
        }
    }
}

/// Whether the system dispatches a draft automatically, or the operator
/// copy-pastes it manually (§4.3, Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    Auto,
    Manual,
}

impl PublishMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishMode::Auto => "auto",
            PublishMode::Manual => "manual",
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(PublishMode::Auto),
            "manual" => Ok(PublishMode::Manual),
            other => Err(format!("unknown publish mode: {other}")),
        }
    }
}

/// Queue entry status (§3 Queue Entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Publishing,
    Published,
    Failed,
    Paused,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Publishing => "publishing",
            QueueStatus::Published => "published",
            QueueStatus::Failed => "failed",
            QueueStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueueStatus::Queued),
            "publishing" => Ok(QueueStatus::Publishing),
            "published" => Ok(QueueStatus::Published),
            "failed" => Ok(QueueStatus::Failed),
            "paused" => Ok(QueueStatus::Paused),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

/// Recovery log status (§3 Recovery Log).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    ManualRecoveryNeeded,
}

impl RecoveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryStatus::Pending => "pending",
            RecoveryStatus::Executing => "executing",
            RecoveryStatus::Completed => "completed",
            RecoveryStatus::Failed => "failed",
            RecoveryStatus::ManualRecoveryNeeded => "manual_recovery_needed",
        }
    }
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecoveryStatus::Pending),
            "executing" => Ok(RecoveryStatus::Executing),
            "completed" => Ok(RecoveryStatus::Completed),
            "failed" => Ok(RecoveryStatus::Failed),
            "manual_recovery_needed" => Ok(RecoveryStatus::ManualRecoveryNeeded),
            other => Err(format!("unknown recovery status: {other}")),
        }
    }
}

/// How urgently a recovery should be actioned (§3 Recovery Log).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Immediate,
    Review,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Immediate => "immediate",
            Urgency::Review => "review",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Urgency::Immediate),
            "review" => Ok(Urgency::Review),
            other => Err(format!("unknown urgency: {other}")),
        }
    }
}

/// Who performed a mutation (§3 Audit Record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    OperatorWeb,
    OperatorBot,
    OperatorCli,
    SophiaPublisher,
    SophiaMonitor,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::OperatorWeb => "operator:web",
            Actor::OperatorBot => "operator:bot",
            Actor::OperatorCli => "operator:cli",
            Actor::SophiaPublisher => "sophia:publisher",
            Actor::SophiaMonitor => "sophia:monitor",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator:web" => Ok(Actor::OperatorWeb),
            "operator:bot" => Ok(Actor::OperatorBot),
            "operator:cli" => Ok(Actor::OperatorCli),
            "sophia:publisher" => Ok(Actor::SophiaPublisher),
            "sophia:monitor" => Ok(Actor::SophiaMonitor),
            other => Err(format!("unknown actor: {other}")),
        }
    }
}
