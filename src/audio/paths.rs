//! Storage paths for captured voice messages
//!
//! Recordings are stored in: ~/.local/share/teacher-hub/voice-messages/

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::message::AudioFormat;

const MAX_RECORDINGS: usize = 20;

fn recordings_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("teacher-hub")
        .join("voice-messages")
}

/// Create the recordings directory if it doesn't exist.
pub fn create_recordings_dir() -> std::io::Result<PathBuf> {
    let dir = recordings_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Generate a unique file path for a recording inside `dir`.
/// Format: <YYYYMMDD_HHMMSS>_<uuid>.<ext>
pub fn generate_recording_path(
    dir: &Path,
    recording_id: Uuid,
    format: AudioFormat,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{}_{}.{}", timestamp, recording_id, format.extension());
    Ok(dir.join(filename))
}

/// Remove the oldest recordings in `dir`, keeping the most recent ones.
/// Returns how many files were deleted.
pub fn cleanup_old_recordings(dir: &Path) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext, "wav" | "m4a" | "aac"))
                .unwrap_or(false)
        })
        .collect();

    if entries.len() <= MAX_RECORDINGS {
        return Ok(0);
    }

    // Oldest first
    entries.sort_by(|a, b| {
        let time_a = a.metadata().and_then(|m| m.modified()).ok();
        let time_b = b.metadata().and_then(|m| m.modified()).ok();
        time_a.cmp(&time_b)
    });

    let to_delete = entries.len() - MAX_RECORDINGS;
    let mut deleted = 0;

    for entry in entries.into_iter().take(to_delete) {
        if fs::remove_file(entry.path()).is_ok() {
            log::debug!("Cleaned up old recording: {:?}", entry.path());
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_path_contains_id_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let path = generate_recording_path(dir.path(), id, AudioFormat::Wav).unwrap();
        assert!(path.to_string_lossy().contains(&id.to_string()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("wav"));
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn recordings_dir_is_app_scoped() {
        let dir = recordings_dir();
        let path_str = dir.to_string_lossy();
        assert!(path_str.contains("teacher-hub"));
        assert!(path_str.contains("voice-messages"));
    }

    #[test]
    fn cleanup_keeps_most_recent_recordings() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(MAX_RECORDINGS + 3) {
            fs::write(dir.path().join(format!("{:03}.m4a", i)), b"x").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let deleted = cleanup_old_recordings(dir.path()).unwrap();
        assert_eq!(deleted, 3);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn cleanup_of_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(cleanup_old_recordings(&missing).unwrap(), 0);
    }
}
