//! Tick sound synthesis.
//!
//! A tick is two oscillators (500 Hz triangle, 800 Hz sine) summed through a
//! short gain envelope and a low-pass filter. Samples are rendered in
//! process and handed to a [`ToneSink`]; the sink is created lazily on the
//! first audible tick. Audio problems are logged and never reach the timer.

use std::f32::consts::PI;
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

pub const SAMPLE_RATE: u32 = 44_100;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

/// Anything that can play a mono f32 buffer.
pub trait ToneSink: Send {
    fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError>;
}

/// Discards every buffer.
#[derive(Debug, Default)]
pub struct NullSink;

impl ToneSink for NullSink {
    fn play(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Shape of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneSpec {
    pub primary_hz: f32,
    pub secondary_hz: f32,
    pub cutoff_hz: f32,
    pub q: f32,
    pub attack_secs: f32,
    pub decay_secs: f32,
    pub peak_gain: f32,
}

impl ToneSpec {
    /// The clock tick at the given volume (0.0 ..= 1.0).
    pub fn tick(volume: f64) -> Self {
        Self {
            primary_hz: 500.0,
            secondary_hz: 800.0,
            cutoff_hz: 1200.0,
            q: 1.0,
            attack_secs: 0.005,
            decay_secs: 0.06,
            peak_gain: volume.clamp(0.0, 1.0) as f32 * 0.25,
        }
    }

    /// Gain at `t` seconds: linear attack, then exponential fall to 0.001.
    fn envelope(&self, t: f32) -> f32 {
        const FLOOR: f32 = 0.001;
        if self.peak_gain <= 0.0 {
            return 0.0;
        }
        if t < self.attack_secs {
            return self.peak_gain * t / self.attack_secs;
        }
        let span = (self.decay_secs - self.attack_secs).max(f32::EPSILON);
        let frac = ((t - self.attack_secs) / span).min(1.0);
        self.peak_gain * (FLOOR / self.peak_gain).powf(frac)
    }

    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let len = (self.decay_secs * sample_rate as f32).round() as usize;
        let mut filter = LowPass::new(self.cutoff_hz, self.q, sample_rate);
        (0..len)
            .map(|n| {
                let t = n as f32 / sample_rate as f32;
                let raw = triangle(self.primary_hz * t) + (2.0 * PI * self.secondary_hz * t).sin();
                filter.process(raw * self.envelope(t))
            })
            .collect()
    }
}

fn triangle(cycles: f32) -> f32 {
    let phase = cycles.fract();
    4.0 * (phase - 0.5).abs() - 1.0
}

/// RBJ biquad low-pass.
struct LowPass {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl LowPass {
    fn new(cutoff_hz: f32, q: f32, sample_rate: u32) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate as f32;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

type SinkFactory = Box<dyn Fn() -> Result<Box<dyn ToneSink>, AudioError> + Send + Sync>;

/// Lazily opened tick output.
pub struct TickSound {
    factory: SinkFactory,
    sink: Mutex<Option<Box<dyn ToneSink>>>,
}

impl TickSound {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn ToneSink>, AudioError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            sink: Mutex::new(None),
        }
    }

    pub fn silent() -> Self {
        Self::new(|| Ok(Box::new(NullSink)))
    }

    /// Play one tick. Opens the sink on first use; a failed open is retried
    /// on the next tick.
    pub fn play_tick(&self, volume: f64) {
        if volume <= 0.0 {
            return;
        }
        let Ok(mut guard) = self.sink.lock() else {
            warn!("tick sound state poisoned, skipping tick");
            return;
        };
        if guard.is_none() {
            match (self.factory)() {
                Ok(sink) => *guard = Some(sink),
                Err(e) => {
                    warn!(error = %e, "audio output not available");
                    return;
                }
            }
        }
        if let Some(sink) = guard.as_mut() {
            let samples = ToneSpec::tick(volume).render(SAMPLE_RATE);
            if let Err(e) = sink.play(&samples, SAMPLE_RATE) {
                warn!(error = %e, "failed to play tick sound");
            }
        }
    }

    /// Drop the open sink, if any.
    pub fn close(&self) {
        if let Ok(mut guard) = self.sink.lock() {
            guard.take();
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl std::fmt::Debug for TickSound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickSound")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingSink;

    impl ToneSink for FailingSink {
        fn play(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
            Err(AudioError::Playback("device gone".into()))
        }
    }

    #[test]
    fn render_length_matches_decay() {
        let samples = ToneSpec::tick(0.5).render(SAMPLE_RATE);
        assert_eq!(samples.len(), 2646);
    }

    #[test]
    fn envelope_peaks_then_fades() {
        let spec = ToneSpec::tick(1.0);
        assert_eq!(spec.envelope(0.0), 0.0);
        assert!((spec.envelope(spec.attack_secs) - 0.25).abs() < 1e-6);
        assert!((spec.envelope(spec.decay_secs) - 0.001).abs() < 1e-6);
    }

    #[test]
    fn rendered_tick_is_bounded() {
        let samples = ToneSpec::tick(1.0).render(SAMPLE_RATE);
        assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 1.0));
        assert!(samples.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn muted_tick_is_silent() {
        let samples = ToneSpec::tick(0.0).render(SAMPLE_RATE);
        assert!(samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn sink_opened_lazily_once() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let sound = TickSound::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullSink))
        });
        assert!(!sound.is_open());
        sound.play_tick(0.2);
        sound.play_tick(0.2);
        assert!(sound.is_open());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_swallowed() {
        let sound = TickSound::new(|| Err(AudioError::Unavailable("no device".into())));
        sound.play_tick(0.2);
        assert!(!sound.is_open());

        let sound = TickSound::new(|| Ok(Box::new(FailingSink)));
        sound.play_tick(0.2);
        assert!(sound.is_open());
    }

    #[test]
    fn zero_volume_never_opens() {
        let sound = TickSound::new(|| Err(AudioError::Unavailable("unused".into())));
        sound.play_tick(0.0);
        assert!(!sound.is_open());
    }
}
