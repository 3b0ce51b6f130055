// Suspense-driven numeric reveal: a displayed value eases toward a target
// over a fixed duration with a slow-fast-slow profile. The animator is a
// pure time-sampled state machine so callers can drive it from any frame
// source and tests can drive it from a fake clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::board::model::Team;
use crate::display::DisplaySurface;

/// Minimum change that triggers a new animation. Anything at or below this
/// snaps silently so jitter in the feed never restarts a reveal.
const EPSILON: f64 = 0.01;

/// Retarget within this relative window of the current target keeps the
/// running clock and reinterpolates smoothly instead of restarting.
const RETARGET_TOLERANCE: f64 = 0.01;

/// Past this progress a retarget restarts rather than warping the tail.
const RETARGET_CUTOFF: f64 = 0.98;

/// Visual styling parameters sampled from the animation's progress. Idle
/// values are fixed; during a reveal the channels oscillate at different
/// frequencies so the motion never looks mechanical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualIntensity {
    pub glow: f64,
    pub scale: f64,
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl VisualIntensity {
    pub const IDLE: VisualIntensity = VisualIntensity {
        glow: 0.0,
        scale: 1.0,
        hue: 45.0,
        saturation: 100.0,
        lightness: 65.0,
    };
}

/// Animates a single displayed number toward its target.
#[derive(Debug)]
pub struct NumericReveal {
    start_value: f64,
    displayed: f64,
    target: f64,
    duration: Duration,
    started_at: Option<Instant>,
}

impl NumericReveal {
    pub fn new(initial: f64, duration: Duration) -> Self {
        NumericReveal {
            start_value: initial,
            displayed: initial,
            target: initial,
            duration,
            started_at: None,
        }
    }

    pub fn displayed(&self) -> f64 {
        self.displayed
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_animating(&self) -> bool {
        self.started_at.is_some()
    }

    /// Point a new target at the animator. Negligible changes snap without
    /// animating; a small correction mid-flight reinterpolates from the
    /// current displayed value without resetting the clock; anything else
    /// restarts the full reveal from wherever the display currently sits.
    pub fn set_target(&mut self, target: f64, now: Instant) {
        if (target - self.target).abs() <= EPSILON {
            self.target = target;
            if self.started_at.is_none() {
                self.displayed = target;
            }
            return;
        }

        let tolerance = self.target.abs() * RETARGET_TOLERANCE;
        let smooth = self.started_at.is_some()
            && self.progress(now) <= RETARGET_CUTOFF
            && (target - self.target).abs() <= tolerance;

        if smooth {
            // Keep the running clock; re-derive the start so the current
            // eased position stays continuous under the new target.
            let p = ease(self.progress(now));
            if p < 1.0 {
                self.start_value = (self.displayed - target * p) / (1.0 - p);
            } else {
                self.start_value = self.displayed;
            }
            self.target = target;
        } else {
            self.start_value = self.displayed;
            self.target = target;
            self.started_at = Some(now);
        }
    }

    /// Advance to `now`, returning the value to display. Lands exactly on
    /// the target at completion; no drift from float accumulation because
    /// each sample interpolates from the original endpoints.
    pub fn sample(&mut self, now: Instant) -> f64 {
        let Some(_) = self.started_at else {
            return self.displayed;
        };

        let p = self.progress(now);
        if p >= 1.0 {
            self.displayed = self.target;
            self.started_at = None;
        } else {
            self.displayed = self.start_value + (self.target - self.start_value) * ease(p);
        }
        self.displayed
    }

    /// Styling for the current frame. Idle animators always report the
    /// fixed idle palette.
    pub fn intensity(&self, now: Instant) -> VisualIntensity {
        if self.started_at.is_none() {
            return VisualIntensity::IDLE;
        }
        intensity_at(self.progress(now))
    }

    fn progress(&self, now: Instant) -> f64 {
        match self.started_at {
            Some(start) => {
                let elapsed = now.saturating_duration_since(start);
                (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
            }
            None => 1.0,
        }
    }
}

/// Display decorator that eases team totals toward their polled values.
///
/// Rosters pass through with each team's `total_real` replaced by its
/// animator's displayed value; the frame task (`run`) keeps repainting
/// through the inner surface while any count-up is in flight, so the
/// suspense ramp is visible between polls.
pub struct RevealingDisplay {
    inner: Arc<dyn DisplaySurface>,
    duration: Duration,
    state: Mutex<RevealState>,
}

#[derive(Default)]
struct RevealState {
    roster: Vec<Team>,
    animators: HashMap<String, NumericReveal>,
}

impl RevealingDisplay {
    pub fn new(inner: Arc<dyn DisplaySurface>, duration: Duration) -> Self {
        RevealingDisplay {
            inner,
            duration,
            state: Mutex::new(RevealState::default()),
        }
    }

    /// Advance all animators to `now` and repaint through the inner surface.
    /// Returns whether any count-up is still running afterwards.
    pub fn render_frame(&self, now: Instant) -> bool {
        let frame = {
            let mut state = self.state.lock().expect("reveal state mutex poisoned");
            if state.roster.is_empty() {
                return false;
            }
            let RevealState { roster, animators } = &mut *state;
            roster
                .iter()
                .map(|team| {
                    let mut team = team.clone();
                    if let Some(reveal) = animators.get_mut(&team.id) {
                        team.total_real = Some(reveal.sample(now));
                    }
                    team
                })
                .collect::<Vec<_>>()
        };
        self.inner.roster_updated(&frame);
        self.animating()
    }

    fn animating(&self) -> bool {
        self.state
            .lock()
            .expect("reveal state mutex poisoned")
            .animators
            .values()
            .any(NumericReveal::is_animating)
    }

    /// Frame loop: repaints at a fixed cadence while any count-up is in
    /// flight, going quiet once every total has landed. Exits on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut frames = tokio::time::interval(Duration::from_millis(250));
        frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = frames.tick() => {}
            }
            if self.animating() {
                // The landing frame is still rendered: sampling past the
                // deadline snaps to the exact target before going idle.
                self.render_frame(Instant::now());
            }
        }
    }
}

impl DisplaySurface for RevealingDisplay {
    fn roster_updated(&self, teams: &[Team]) {
        let now = Instant::now();
        {
            let mut state = self.state.lock().expect("reveal state mutex poisoned");
            let RevealState { roster, animators } = &mut *state;
            animators.retain(|id, _| teams.iter().any(|t| t.id == *id));
            for team in teams {
                let target = team.total_real.unwrap_or_else(|| team.agents_total());
                animators
                    // A team's first total is shown as-is; only changes ease.
                    .entry(team.id.clone())
                    .or_insert_with(|| NumericReveal::new(target, self.duration))
                    .set_target(target, now);
            }
            *roster = teams.to_vec();
        }
        self.render_frame(now);
    }

    fn celebration_started(&self, agent: &crate::board::model::Agent, amount: f64) {
        self.inner.celebration_started(agent, amount);
    }

    fn celebration_cleared(&self) {
        self.inner.celebration_cleared();
    }

    fn feed_error(&self, message: &str) {
        self.inner.feed_error(message);
    }
}

/// Three-phase easing over normalized time: a slow cubic crawl covering the
/// first quarter (30% of the distance), an accelerating middle half (55%),
/// and a decelerating quartic final quarter (the last 15%). The pieces meet
/// continuously at 0.3 and 0.85.
pub fn ease(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    if p < 0.25 {
        let t = p / 0.25;
        t * t * t * 0.3
    } else if p < 0.75 {
        let t = (p - 0.25) / 0.5;
        0.3 + t.powf(1.5) * 0.55
    } else {
        let t = (p - 0.75) / 0.25;
        0.85 + (1.0 - (1.0 - t).powi(4)) * 0.15
    }
}

/// Styling as a function of progress. The mid-phase runs hotter (pulse
/// multiplier, scale and hue boosts through the middle band) so the reveal
/// peaks while the digits are moving fastest.
pub fn intensity_at(p: f64) -> VisualIntensity {
    use std::f64::consts::PI;
    let p = p.clamp(0.0, 1.0);

    let phase_multiplier = if (0.25..0.75).contains(&p) { 1.5 } else { 1.0 };
    let mid_band = (0.4..0.6).contains(&p);

    let glow = ((p * PI * 10.0).sin() * 0.5 + 0.5) * phase_multiplier;
    let scale =
        (1.0 + (p * PI * 8.0).sin() * 0.15) * if mid_band { 1.05 } else { 1.0 };
    let hue = 45.0 + (p * PI * 6.0).sin() * 20.0 + if mid_band { 10.0 } else { 0.0 };
    let saturation =
        85.0 + (p * PI * 4.0).sin() * 15.0 + if phase_multiplier > 1.0 { 10.0 } else { 0.0 };
    let lightness = 60.0 + (p * PI * 8.0).sin() * 15.0;

    VisualIntensity {
        glow,
        scale,
        hue,
        saturation,
        lightness,
    }
}
