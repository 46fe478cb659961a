//! Scoped temporary audio files.
//!
//! Every transcription request owns exactly one temp WAV file. The file is
//! created under `~/.local/share/voicepipe/temp/audio/`, handed to the
//! request as a [`ScopedWavFile`], and removed exactly once when the request
//! finishes, whether it succeeded, failed, or unwound. The guard is armed
//! before any network call begins, so an abandoned request still cleans up.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Age after which a leftover WAV is considered an orphan from a crash that
/// defeated the scoped guard. Live files belong to an in-flight request and
/// are never this old.
const STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Temp audio directory: `~/.local/share/voicepipe/temp/audio/`.
fn temp_audio_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voicepipe")
        .join("temp")
        .join("audio")
}

/// Create the temp audio directory if it doesn't exist.
pub fn create_temp_audio_dir() -> std::io::Result<PathBuf> {
    let dir = temp_audio_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Generate a unique WAV path: `<timestamp>_<uuid>.wav`.
fn generate_wav_path() -> std::io::Result<PathBuf> {
    let dir = create_temp_audio_dir()?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{}_{}.wav", timestamp, Uuid::new_v4());
    Ok(dir.join(filename))
}

/// Handle to one canonical WAV temp file.
///
/// The underlying file is removed exactly once: either explicitly via
/// [`remove`](ScopedWavFile::remove), or on drop if the handle is abandoned
/// (early return, error propagation, panic unwind).
#[derive(Debug)]
pub struct ScopedWavFile {
    path: PathBuf,
    removed: bool,
}

impl ScopedWavFile {
    /// Reserve a unique path in the temp audio directory.
    ///
    /// The file itself is not created; the writer that fills it does that.
    /// Dropping the handle before anything was written is harmless.
    pub fn allocate() -> std::io::Result<Self> {
        let path = generate_wav_path()?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the underlying file now.
    pub fn remove(mut self) {
        self.remove_inner();
    }

    fn remove_inner(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed temp audio file: {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove temp audio file {:?}: {}", self.path, e),
        }
    }
}

impl Drop for ScopedWavFile {
    fn drop(&mut self) {
        self.remove_inner();
    }
}

/// Acquire a scoped WAV file from `factory`, run `body` against its path, and
/// remove the file on every exit path.
///
/// `factory` failing produces no file and nothing to clean up. If `body`
/// panics, the guard's drop removes the file during unwind; removal still
/// happens exactly once.
pub async fn with_scoped_audio_file<Factory, Body, Fut, T, E>(
    factory: Factory,
    body: Body,
) -> Result<T, E>
where
    Factory: FnOnce() -> Result<ScopedWavFile, E>,
    Body: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let file = factory()?;
    let result = body(file.path().to_path_buf()).await;
    file.remove();
    result
}

/// Remove orphaned WAV files left behind by crashed requests.
///
/// Files normally never outlive their request, so only files older than
/// [`STALE_AFTER`] are touched; a live file owned by an in-flight request is
/// never deleted. Returns the number of files removed.
pub fn cleanup_stale_files() -> std::io::Result<usize> {
    let dir = temp_audio_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let mut deleted = 0;

    for entry in fs::read_dir(&dir)?.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.extension().map(|ext| ext == "wav").unwrap_or(false) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok());

        if age.map(|a| a > STALE_AFTER).unwrap_or(false) && fs::remove_file(&path).is_ok() {
            log::debug!("Cleaned up stale audio file: {:?}", path);
            deleted += 1;
        }
    }

    Ok(deleted)
}
