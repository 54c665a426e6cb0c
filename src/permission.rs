//! Microphone permission gate
//!
//! Recording never starts until the gate reports `Granted`. A refusal is
//! not retried; the UI is handed a `PermissionPrompt` pointing at the OS
//! settings instead.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Denied permanently; only the OS settings screen can change it.
    Blocked,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Platform permission subsystem.
pub trait PermissionGate: Send + Sync + 'static {
    fn request_microphone(&self) -> impl Future<Output = PermissionStatus> + Send;
}

/// Target platform, used to pick the settings deep link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
    #[default]
    Desktop,
}

/// What the UI shows after a refusal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPrompt {
    pub title: String,
    pub message: String,
    /// Deep link into the OS settings, when the platform has one.
    pub settings_url: Option<String>,
}

impl PermissionPrompt {
    pub fn for_platform(platform: Platform, app_id: &str) -> Self {
        let settings_url = match platform {
            Platform::Ios => Some("app-settings:".to_string()),
            Platform::Android => Some(format!("package:{}", app_id)),
            Platform::Web | Platform::Desktop => None,
        };
        Self {
            title: "Microphone Permission Required".to_string(),
            message: "Please allow microphone access to record voice messages.".to_string(),
            settings_url,
        }
    }
}

impl Default for PermissionPrompt {
    fn default() -> Self {
        Self::for_platform(Platform::default(), "")
    }
}

/// Gate with a fixed answer. Counts how often it was asked.
#[derive(Debug)]
pub struct StaticPermissionGate {
    status: PermissionStatus,
    requests: AtomicUsize,
}

impl StaticPermissionGate {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionStatus::Denied)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionGate for StaticPermissionGate {
    async fn request_microphone(&self) -> PermissionStatus {
        self.requests.fetch_add(1, Ordering::SeqCst);
        log::debug!("Microphone permission requested: {:?}", self.status);
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_prompt_links_to_app_settings() {
        let prompt = PermissionPrompt::for_platform(Platform::Android, "org.teacherhub.app");
        assert_eq!(
            prompt.settings_url.as_deref(),
            Some("package:org.teacherhub.app")
        );
    }

    #[test]
    fn ios_prompt_opens_app_settings() {
        let prompt = PermissionPrompt::for_platform(Platform::Ios, "org.teacherhub.app");
        assert_eq!(prompt.settings_url.as_deref(), Some("app-settings:"));
    }

    #[test]
    fn web_prompt_has_no_deep_link() {
        let prompt = PermissionPrompt::for_platform(Platform::Web, "ignored");
        assert!(prompt.settings_url.is_none());
    }

    #[tokio::test]
    async fn static_gate_counts_requests() {
        let gate = StaticPermissionGate::denied();
        assert!(!gate.request_microphone().await.is_granted());
        assert!(!gate.request_microphone().await.is_granted());
        assert_eq!(gate.request_count(), 2);
    }
}
