// The timed state machine for a single celebration:
// Idle -> Acquiring(audio) -> Displaying -> FadingAudio -> Closing -> Idle.
//
// The engine task awaits one sequence at a time, so at most one celebration
// is ever in flight; events detected meanwhile buffer in the channel and the
// queue in detection order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::audio::AudioPlayer;
use super::queue::CelebrationQueue;
use crate::board::model::QueuedCelebration;
use crate::config::CelebrationConfig;
use crate::display::DisplaySurface;
use crate::store::Store;

/// Drives the audiovisual sequence for one celebration at a time. Owns the
/// single audio resource; the handle is never shared and is always released
/// in `Closing` (or by `cancel`) before the next acquisition.
pub struct CelebrationSequencer<A: AudioPlayer> {
    audio: A,
    config: CelebrationConfig,
    store: Arc<Store>,
    display: Arc<dyn DisplaySurface>,
}

impl<A: AudioPlayer> CelebrationSequencer<A> {
    pub fn new(
        audio: A,
        config: CelebrationConfig,
        store: Arc<Store>,
        display: Arc<dyn DisplaySurface>,
    ) -> Self {
        CelebrationSequencer {
            audio,
            config,
            store,
            display,
        }
    }

    /// Present one celebration end to end. Audio failures are non-fatal:
    /// the visual sequence and all phase timings proceed regardless.
    pub async fn run(&mut self, celebration: QueuedCelebration) {
        let agent = &celebration.agent;
        info!(agent = %agent.name, amount = celebration.amount, "celebration starting");

        // Acquiring: release any previous playback defensively, then start
        // the agent's track, falling back once to the default track.
        self.audio.stop();
        let track = self
            .store
            .resolve_song(&agent.name)
            .unwrap_or_else(|| self.config.default_track.clone());
        let volume = self.config.initial_volume;

        if let Err(e) = self.audio.play(&track, volume).await {
            warn!(agent = %agent.name, "celebration track failed: {e}");
            if track != self.config.default_track {
                if let Err(e) = self.audio.play(&self.config.default_track, volume).await {
                    warn!("default track failed too, celebrating silently: {e}");
                }
            }
        }

        self.display.celebration_started(agent, celebration.amount);

        // Displaying: the overlay stays up for the full display duration
        // measured from acquisition; the fade occupies the tail of it.
        let fade = self.config.fade();
        tokio::time::sleep(self.config.display().saturating_sub(fade)).await;

        // FadingAudio: linear ramp from the current level to zero in
        // discrete steps across the fade window.
        let steps = self.config.fade_steps;
        let step_wait = fade / steps;
        for step in 1..=steps {
            tokio::time::sleep(step_wait).await;
            let remaining = 1.0 - f64::from(step) / f64::from(steps);
            self.audio.set_volume(volume * remaining);
        }

        // Closing: hard-stop and release the audio resource, restore the
        // volume for the next use, clear the visual.
        self.close();
        info!(agent = %agent.name, "celebration complete");
    }

    /// Synchronously stop audio and clear the overlay. Called by the engine
    /// when a sequence is abandoned (shutdown) so a superseded celebration
    /// never produces late side effects.
    pub fn cancel(&mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.audio.stop();
        self.audio.set_volume(self.config.initial_volume);
        self.display.celebration_cleared();
    }
}

/// The celebration engine task: consumes detected sales, serializes their
/// presentation through the queue, and keeps a settle delay between
/// back-to-back celebrations.
///
/// Exits when the channel closes or the shutdown flag flips; an in-flight
/// sequence is cancelled (audio stopped, overlay cleared) on shutdown.
pub async fn run_engine<A: AudioPlayer>(
    mut events: mpsc::Receiver<QueuedCelebration>,
    mut sequencer: CelebrationSequencer<A>,
    settle: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut queue = CelebrationQueue::new();

    loop {
        // Idle: wait for the next detected sale.
        let started = tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => queue.enqueue(event),
                None => break,
            },
        };

        let mut current = started;
        while let Some(celebration) = current {
            tokio::select! {
                _ = shutdown.changed() => {
                    sequencer.cancel();
                    return;
                }
                _ = sequencer.run(celebration) => {}
            }

            // Events that arrived during the sequence are already buffered
            // in the channel; move them into the queue before advancing so
            // batch order is preserved.
            while let Ok(event) = events.try_recv() {
                queue.enqueue(event);
            }

            current = queue.complete();
            if current.is_some() {
                tokio::time::sleep(settle).await;
            }
        }
    }

    sequencer.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::model::Agent;
    use crate::store::AgentConfig;
    use std::sync::Mutex;

    fn test_config() -> CelebrationConfig {
        CelebrationConfig {
            display_secs: 12,
            fade_secs: 2,
            fade_steps: 20,
            settle_ms: 500,
            initial_volume: 0.8,
            default_track: "default.mp3".to_string(),
        }
    }

    fn celebration(name: &str, amount: f64) -> QueuedCelebration {
        QueuedCelebration {
            agent: Agent {
                id: name.to_lowercase(),
                name: name.to_string(),
                avatar: String::new(),
                sales: 0.0,
                team_id: "mesa-1".to_string(),
            },
            amount,
        }
    }

    /// Records every display transition with the paused-clock time at which
    /// it happened.
    #[derive(Default)]
    struct RecordingDisplay {
        events: Mutex<Vec<String>>,
    }

    impl RecordingDisplay {
        fn log(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl DisplaySurface for RecordingDisplay {
        fn roster_updated(&self, _teams: &[crate::board::model::Team]) {}
        fn celebration_started(&self, agent: &Agent, amount: f64) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start:{}:{}", agent.name, amount));
        }
        fn celebration_cleared(&self) {
            self.events.lock().unwrap().push("cleared".to_string());
        }
        fn feed_error(&self, _message: &str) {}
    }

    /// Scripted audio player: records calls, optionally refuses tracks.
    #[derive(Default)]
    struct ScriptedAudio {
        calls: Arc<Mutex<Vec<String>>>,
        refuse: Vec<String>,
    }

    #[async_trait::async_trait]
    impl AudioPlayer for ScriptedAudio {
        async fn play(&mut self, track: &str, volume: f64) -> Result<(), super::super::audio::AudioError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("play:{track}:{volume:.2}"));
            if self.refuse.iter().any(|t| t == track) {
                return Err(super::super::audio::AudioError::PlaybackRefused {
                    track: track.to_string(),
                    reason: "scripted refusal".to_string(),
                });
            }
            Ok(())
        }

        fn set_volume(&mut self, volume: f64) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("volume:{volume:.2}"));
        }

        fn stop(&mut self) {
            self.calls.lock().unwrap().push("stop".to_string());
        }
    }

    fn sequencer(
        audio: ScriptedAudio,
        display: Arc<RecordingDisplay>,
        store: Arc<Store>,
    ) -> CelebrationSequencer<ScriptedAudio> {
        CelebrationSequencer::new(audio, test_config(), store, display)
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_runs_all_phases() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let display = Arc::new(RecordingDisplay::default());
        let audio = ScriptedAudio::default();
        let calls = audio.calls.clone();
        let mut seq = sequencer(audio, display.clone(), store);

        seq.run(celebration("Ana", 500.0)).await;

        let log = display.log();
        assert_eq!(log.first().unwrap(), "start:Ana:500");
        assert_eq!(log.last().unwrap(), "cleared");

        let calls = calls.lock().unwrap().clone();
        // Defensive stop, playback, 20 fade steps, closing stop + volume reset.
        assert_eq!(calls[0], "stop");
        assert_eq!(calls[1], "play:default.mp3:0.80");
        let fades: Vec<_> = calls.iter().filter(|c| c.starts_with("volume:")).collect();
        assert_eq!(fades.len(), 21); // 20 fade steps + reset on close
        assert_eq!(fades[19], "volume:0.00"); // ramp lands at zero
        assert_eq!(fades[20], "volume:0.80"); // restored for next use
        assert_eq!(calls[calls.len() - 2], "stop");
    }

    #[tokio::test(start_paused = true)]
    async fn configured_track_used_when_present() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        store
            .upsert_agent_config(&AgentConfig {
                name: "Ana".to_string(),
                photo: String::new(),
                song: "ana-special.mp3".to_string(),
                team_id: String::new(),
            })
            .unwrap();
        let display = Arc::new(RecordingDisplay::default());
        let audio = ScriptedAudio::default();
        let calls = audio.calls.clone();
        let mut seq = sequencer(audio, display, store);

        seq.run(celebration("Ana", 500.0)).await;

        let calls = calls.lock().unwrap().clone();
        assert!(calls.contains(&"play:ana-special.mp3:0.80".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_track_falls_back_to_default() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        store
            .upsert_agent_config(&AgentConfig {
                name: "Ana".to_string(),
                photo: String::new(),
                song: "broken.mp3".to_string(),
                team_id: String::new(),
            })
            .unwrap();
        let display = Arc::new(RecordingDisplay::default());
        let audio = ScriptedAudio {
            refuse: vec!["broken.mp3".to_string()],
            ..Default::default()
        };
        let calls = audio.calls.clone();
        let mut seq = sequencer(audio, display.clone(), store);

        seq.run(celebration("Ana", 500.0)).await;

        let calls = calls.lock().unwrap().clone();
        assert!(calls.contains(&"play:broken.mp3:0.80".to_string()));
        assert!(calls.contains(&"play:default.mp3:0.80".to_string()));
        // The visual sequence completed despite the failure.
        assert_eq!(display.log().last().unwrap(), "cleared");
    }

    #[tokio::test(start_paused = true)]
    async fn all_audio_failing_still_celebrates_visually() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let display = Arc::new(RecordingDisplay::default());
        let audio = ScriptedAudio {
            refuse: vec!["default.mp3".to_string()],
            ..Default::default()
        };
        let mut seq = sequencer(audio, display.clone(), store);

        seq.run(celebration("Ana", 500.0)).await;

        let log = display.log();
        assert_eq!(log, vec!["start:Ana:500".to_string(), "cleared".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_serializes_back_to_back_celebrations() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let display = Arc::new(RecordingDisplay::default());
        let seq = sequencer(ScriptedAudio::default(), display.clone(), store);

        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = tokio::spawn(run_engine(
            rx,
            seq,
            Duration::from_millis(500),
            shutdown_rx,
        ));

        tx.send(celebration("Ana", 500.0)).await.unwrap();
        tx.send(celebration("Luis", 300.0)).await.unwrap();

        // Two 12s sequences plus the settle delay.
        tokio::time::sleep(Duration::from_secs(26)).await;

        let log = display.log();
        assert_eq!(
            log,
            vec![
                "start:Ana:500".to_string(),
                "cleared".to_string(),
                "start:Luis:300".to_string(),
                "cleared".to_string(),
            ]
        );

        shutdown_tx.send(true).unwrap();
        engine.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_sequence_releases_resources() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let display = Arc::new(RecordingDisplay::default());
        let audio = ScriptedAudio::default();
        let calls = audio.calls.clone();
        let seq = sequencer(audio, display.clone(), store);

        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = tokio::spawn(run_engine(
            rx,
            seq,
            Duration::from_millis(500),
            shutdown_rx,
        ));

        tx.send(celebration("Ana", 500.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await; // mid-display
        shutdown_tx.send(true).unwrap();
        engine.await.unwrap();

        // Overlay cleared and audio stopped despite the abandoned sequence.
        assert_eq!(display.log().last().unwrap(), "cleared");
        let calls = calls.lock().unwrap();
        assert_eq!(calls[calls.len() - 2], "stop");
        assert_eq!(calls[calls.len() - 1], "volume:0.80");
    }
}
