// Audio playback seam. The sequencer owns exactly one player handle; real
// output hardware lives behind this trait so the engine can run headless
// and tests can script playback failures.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("playback refused for {track}: {reason}")]
    PlaybackRefused { track: String, reason: String },
}

/// The single audio resource used by celebrations.
///
/// Contract: `play` replaces whatever was playing; `stop` pauses, rewinds,
/// and leaves the handle reusable. Implementations must make `stop` safe to
/// call at any time, including when nothing is playing.
#[async_trait]
pub trait AudioPlayer: Send {
    /// Begin playback of `track` at `volume` (0.0..=1.0).
    async fn play(&mut self, track: &str, volume: f64) -> Result<(), AudioError>;

    /// Adjust the volume of the current playback. No-op when stopped.
    fn set_volume(&mut self, volume: f64);

    /// Pause playback and reset position.
    fn stop(&mut self);
}

/// Player that renders playback into the log. Used when running without an
/// audio device; the visual sequence is unaffected.
#[derive(Debug, Default)]
pub struct NullAudioPlayer {
    playing: Option<String>,
}

#[async_trait]
impl AudioPlayer for NullAudioPlayer {
    async fn play(&mut self, track: &str, volume: f64) -> Result<(), AudioError> {
        tracing::info!(track, volume, "audio playback started");
        self.playing = Some(track.to_string());
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        if self.playing.is_some() {
            tracing::debug!(volume, "audio volume adjusted");
        }
    }

    fn stop(&mut self) {
        if let Some(track) = self.playing.take() {
            tracing::info!(track, "audio playback stopped");
        }
    }
}
