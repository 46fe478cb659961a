use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Recordings shorter than this are never sent to the recognizer.
    pub min_transcribe_ms: u64,

    /// When enabled, clips shorter than `vad_check_max_ms` run a fast local
    /// VAD pass to decide whether they are worth a recognition call.
    pub short_clip_vad_enabled: bool,

    /// Clips shorter than this may be gated by local VAD (when enabled).
    /// Longer clips go to the recognizer without local gating.
    pub vad_check_max_ms: u64,

    /// Ignore the first N ms of audio when running local VAD, to avoid
    /// start-click/transient noise.
    pub vad_ignore_start_ms: u64,

    /// Downsample to this rate at finalize time. `None` keeps the source
    /// rate. Only whole-number ratios apply; otherwise the source rate is
    /// kept and a warning is logged.
    pub target_sample_rate: Option<u32>,

    /// Run the LLM cleanup pass on transcripts automatically.
    pub enhancement_enabled: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_transcribe_ms: 500,
            short_clip_vad_enabled: true,
            vad_check_max_ms: 1500,
            vad_ignore_start_ms: 80,
            target_sample_rate: None,
            enhancement_enabled: false,
        }
    }
}

fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join("voicepipe").join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> PipelineSettings {
    let path = match settings_path() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Settings: {}", e);
            return PipelineSettings::default();
        }
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<PipelineSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                PipelineSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => PipelineSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            PipelineSettings::default()
        }
    }
}

pub fn save_settings(settings: &PipelineSettings) -> Result<(), String> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: temp file in the same directory, then rename, so a
    // crash mid-write can't leave a corrupt settings.json.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename atomically replaces the destination. On Windows it
    // fails if the destination exists, so remove it first.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, &path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
