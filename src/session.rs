//! Explicit per-interaction session state.
//!
//! The interaction layer re-runs its whole handler on every user action, so
//! nothing here relies on execution order: all session state lives in an
//! explicit [`RecordingSession`] context, and finalization only happens on an
//! explicit trigger, never as a side effect of a re-run.

use uuid::Uuid;

use crate::audio::buffer::{AudioBuffer, SharedAudioBuffer};

/// Errors from session state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Finalize requested but no recording is in progress.
    NotRecording,
    /// Finalize requested twice for the same session.
    AlreadyFinalized,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotRecording => write!(f, "No recording in progress"),
            SessionError::AlreadyFinalized => {
                write!(f, "Recording was already finalized")
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Finalized,
}

/// Context object holding one interaction's recording state.
///
/// Each new session gets a fresh buffer; a stale buffer from a prior session
/// is never reused. The last transcript survives across sessions so the
/// enhancement action stays available once any transcript exists.
#[derive(Debug)]
pub struct RecordingSession {
    id: Uuid,
    state: SessionState,
    buffer: SharedAudioBuffer,
    last_transcript: Option<String>,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            buffer: SharedAudioBuffer::new(),
            last_transcript: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start a new recording session.
    ///
    /// Allowed from any state; the buffer is reset and a new session id is
    /// assigned. Returns the shared buffer handle for the capture callback.
    pub fn start(&mut self) -> SharedAudioBuffer {
        self.id = Uuid::new_v4();
        self.buffer.reset();
        self.state = SessionState::Recording;

        // Opportunistic sweep of WAVs orphaned by earlier crashes.
        match crate::audio::scoped::cleanup_stale_files() {
            Ok(0) => {}
            Ok(n) => log::info!("Swept {} stale audio file(s)", n),
            Err(e) => log::warn!("Stale audio sweep failed: {}", e),
        }

        log::info!("Recording session started: {}", self.id);
        self.buffer.clone()
    }

    /// Explicit finalize trigger: take the session's audio for encoding.
    ///
    /// Only valid once per session. Re-invocation (a re-run without a new
    /// start) fails with [`SessionError::AlreadyFinalized`] instead of
    /// producing a second file.
    pub fn finalize(&mut self) -> Result<AudioBuffer, SessionError> {
        match self.state {
            SessionState::Idle => Err(SessionError::NotRecording),
            SessionState::Finalized => Err(SessionError::AlreadyFinalized),
            SessionState::Recording => {
                self.state = SessionState::Finalized;
                let buffer = self.buffer.take();
                log::info!(
                    "Session {} finalized: {} chunks, {} ms",
                    self.id,
                    buffer.chunk_count(),
                    buffer.duration_ms()
                );
                Ok(buffer)
            }
        }
    }

    pub fn set_transcript(&mut self, text: String) {
        self.last_transcript = Some(text);
    }

    pub fn last_transcript(&self) -> Option<&str> {
        self.last_transcript.as_deref()
    }
}
