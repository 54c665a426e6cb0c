use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::message::{AudioFormat, AudioQuality, RecordingOptions, DEFAULT_MAX_DURATION_SECS};
use crate::permission::{PermissionPrompt, Platform};
use crate::ui::{RecorderConfig, SlideToCancel};
use crate::validation::ValidationPolicy;

const SETTINGS_FILE_NAME: &str = "voice-settings.json";
const DEFAULT_APP_ID: &str = "org.teacherhub.app";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoiceSettings {
    /// Recordings stop on their own after this many seconds.
    pub max_duration_secs: u64,

    pub quality: AudioQuality,

    pub format: AudioFormat,

    /// Bounds a finished recording must meet before it is handed to the caller.
    pub validation: ValidationPolicy,

    /// Slide-to-cancel thresholds for the record button.
    pub slide: SlideToCancel,

    /// Picks the OS settings link offered after a microphone refusal.
    pub platform: Platform,

    pub app_id: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            quality: AudioQuality::default(),
            format: AudioFormat::default(),
            validation: ValidationPolicy::default(),
            slide: SlideToCancel::default(),
            platform: Platform::default(),
            app_id: DEFAULT_APP_ID.to_string(),
        }
    }
}

impl VoiceSettings {
    /// Options for `start_recording`. The auto-stop never exceeds what
    /// validation would accept.
    pub fn recording_options(&self) -> RecordingOptions {
        let policy_max = self.validation.max_duration.max(1.0) as u64;
        RecordingOptions {
            max_duration: self.max_duration_secs.clamp(1, policy_max),
            quality: self.quality,
            format: self.format,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            options: self.recording_options(),
            slide: self.slide,
            policy: self.validation,
            permission_prompt: PermissionPrompt::for_platform(self.platform, &self.app_id),
        }
    }
}

/// `<config_dir>/teacher-hub/voice-settings.json`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("teacher-hub").join(SETTINGS_FILE_NAME))
}

pub fn load_settings(path: &Path) -> VoiceSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<VoiceSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                VoiceSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => VoiceSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            VoiceSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &VoiceSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write to a sibling temp file, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // Windows refuses to rename over an existing file.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
