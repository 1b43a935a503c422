//! Time → value functions carried by property blocks.
//!
//! - [`KeyframeSignal`]: explicit keyframes; the segment into key `i+1` uses
//!   key `i+1`'s interpolation. Values clamp to the first/last key outside.
//! - [`BakedSignal`]: pre-baked source data sampled at a fixed frame rate.
//! - [`AdditiveSignal`]: a base signal plus a keyframed delta, recombined
//!   through a [`Transformer`].

use serde::{Deserialize, Serialize};
use vizij_api_core::{blend_values, Transformer, Value};

use crate::keyframe::{Interpolation, Keyframe};
use crate::time::{AnimationTime, TimeRange};

const EASE_OUT_X: f32 = 0.42;
const EASE_OUT_Y: f32 = 0.0;
const EASE_IN_X: f32 = 0.58;
const EASE_IN_Y: f32 = 1.0;

/// Cubic Bezier basis function
#[inline]
fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Given control points (x1, y1, x2, y2) and an input t in [0,1],
/// compute the eased y by inverting the x bezier via binary search.
fn bezier_ease_t(t: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut mid = t;
    for _ in 0..24 {
        let x = cubic_bezier(0.0, x1, x2, 1.0, mid);
        if (x - t).abs() < 1e-6 {
            break;
        }
        if x < t {
            lo = mid;
        } else {
            hi = mid;
        }
        mid = 0.5 * (lo + hi);
    }
    cubic_bezier(0.0, y1, y2, 1.0, mid)
}

fn interpolate(left: &Keyframe, right: &Keyframe, u: f32) -> Value {
    if left.value.kind().is_step() {
        return left.value.clone();
    }
    match right.interpolation {
        Interpolation::Constant => left.value.clone(),
        Interpolation::Linear | Interpolation::Unknown => {
            blend_values(&left.value, &right.value, u)
        }
        Interpolation::Cubic => {
            let eased = bezier_ease_t(u, EASE_OUT_X, EASE_OUT_Y, EASE_IN_X, EASE_IN_Y);
            blend_values(&left.value, &right.value, eased)
        }
    }
}

/// Ordered keyframes evaluated by interpolation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeSignal {
    keyframes: Vec<Keyframe>,
}

impl KeyframeSignal {
    /// Keyframes are stably sorted by time.
    pub fn new(mut keyframes: Vec<Keyframe>) -> Self {
        keyframes.sort_by_key(|k| k.time);
        Self { keyframes }
    }

    #[inline]
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn evaluate(&self, time: AnimationTime) -> Option<Value> {
        let keys = &self.keyframes;
        let first = keys.first()?;
        let last = keys.last()?;
        if time <= first.time {
            return Some(first.value.clone());
        }
        if time >= last.time {
            return Some(last.value.clone());
        }
        // first.time < time < last.time, so 1 <= idx < len.
        let idx = keys.partition_point(|k| k.time <= time);
        let left = &keys[idx - 1];
        let right = &keys[idx];
        let span = right.time.seconds_since(left.time);
        let u = if span > 0.0 {
            (time.seconds_since(left.time) / span) as f32
        } else {
            1.0
        };
        Some(interpolate(left, right, u))
    }
}

/// Pre-baked source samples at a fixed rate, starting at `start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BakedSignal {
    pub start: AnimationTime,
    /// Samples per second.
    pub frame_rate: f32,
    pub samples: Vec<Value>,
}

impl BakedSignal {
    pub fn new(start: impl Into<AnimationTime>, frame_rate: f32, samples: Vec<Value>) -> Self {
        Self {
            start: start.into(),
            frame_rate,
            samples,
        }
    }

    /// Time covered by the samples.
    pub fn range(&self) -> TimeRange {
        let frames = self.samples.len().saturating_sub(1) as f64;
        let seconds = if self.frame_rate > 0.0 {
            frames / self.frame_rate as f64
        } else {
            0.0
        };
        TimeRange {
            start: self.start,
            end: self.start + AnimationTime::from(seconds),
        }
    }

    pub fn evaluate(&self, time: AnimationTime) -> Option<Value> {
        let first = self.samples.first()?;
        let n = self.samples.len();
        if n == 1 || self.frame_rate <= 0.0 {
            return Some(first.clone());
        }
        let frame = (time.seconds_since(self.start) * self.frame_rate as f64).max(0.0);
        let i0 = frame.floor() as usize;
        if i0 >= n - 1 {
            return self.samples.last().cloned();
        }
        let u = (frame - i0 as f64) as f32;
        Some(blend_values(&self.samples[i0], &self.samples[i0 + 1], u))
    }
}

/// A keyframed delta layered on top of a base signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdditiveSignal {
    pub base: Box<Signal>,
    pub delta: KeyframeSignal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    Keyframes(KeyframeSignal),
    Baked(BakedSignal),
    Additive(AdditiveSignal),
}

impl Signal {
    pub fn keyframes_from(keyframes: Vec<Keyframe>) -> Self {
        Signal::Keyframes(KeyframeSignal::new(keyframes))
    }

    /// Wrap `base` (additive layers stripped) with a keyframed delta.
    pub fn additive(base: &Signal, delta: Vec<Keyframe>) -> Self {
        Signal::Additive(AdditiveSignal {
            base: Box::new(base.base().clone()),
            delta: KeyframeSignal::new(delta),
        })
    }

    /// Plain keyframe blocks are the only ones rebuilt wholesale from handles.
    #[inline]
    pub fn is_keyframes(&self) -> bool {
        matches!(self, Signal::Keyframes(_))
    }

    /// The signal with every additive layer removed.
    pub fn base(&self) -> &Signal {
        match self {
            Signal::Additive(additive) => additive.base.base(),
            other => other,
        }
    }

    /// Editable keyframes: the keys of a keyframe signal, the delta keys of an
    /// additive one, none for baked data.
    pub fn keyframes(&self) -> &[Keyframe] {
        match self {
            Signal::Keyframes(signal) => signal.keyframes(),
            Signal::Additive(additive) => additive.delta.keyframes(),
            Signal::Baked(_) => &[],
        }
    }

    pub fn evaluate<X: Transformer + ?Sized>(
        &self,
        time: AnimationTime,
        transformer: &X,
    ) -> Option<Value> {
        match self {
            Signal::Keyframes(signal) => signal.evaluate(time),
            Signal::Baked(signal) => signal.evaluate(time),
            Signal::Additive(additive) => {
                let base = additive.base.evaluate(time, transformer);
                let delta = additive.delta.evaluate(time);
                match (base, delta) {
                    (Some(base), Some(delta)) => Some(transformer.combine(&base, &delta)),
                    (base, None) => base,
                    (None, delta) => delta,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizij_api_core::ValueTransformer;

    fn t(seconds: f64) -> AnimationTime {
        AnimationTime::from(seconds)
    }

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() <= 1e-4, "left={a} right={b}");
    }

    fn float_at(signal: &Signal, seconds: f64) -> f32 {
        signal
            .evaluate(t(seconds), &ValueTransformer)
            .and_then(|v| v.as_float())
            .expect("float value")
    }

    #[test]
    fn linear_segment_midpoint() {
        let signal = Signal::keyframes_from(vec![
            Keyframe::new(0.0, Value::Float(0.0), Interpolation::Linear),
            Keyframe::new(2.0, Value::Float(10.0), Interpolation::Linear),
        ]);
        approx(float_at(&signal, 1.0), 5.0);
        approx(float_at(&signal, -0.0), 0.0);
        approx(float_at(&signal, 9.0), 10.0);
    }

    #[test]
    fn constant_holds_left_value() {
        let signal = Signal::keyframes_from(vec![
            Keyframe::new(0.0, Value::Float(1.0), Interpolation::Linear),
            Keyframe::new(1.0, Value::Float(3.0), Interpolation::Constant),
        ]);
        approx(float_at(&signal, 0.99), 1.0);
        approx(float_at(&signal, 1.0), 3.0);
    }

    #[test]
    fn cubic_is_symmetric_ease() {
        let signal = Signal::keyframes_from(vec![
            Keyframe::new(0.0, Value::Float(0.0), Interpolation::Cubic),
            Keyframe::new(1.0, Value::Float(1.0), Interpolation::Cubic),
        ]);
        approx(float_at(&signal, 0.5), 0.5);
        assert!(float_at(&signal, 0.2) < 0.2);
        assert!(float_at(&signal, 0.8) > 0.8);
    }

    #[test]
    fn baked_samples_blend_and_clamp() {
        let signal = Signal::Baked(BakedSignal::new(
            0.0,
            1.0,
            vec![Value::Float(3.0), Value::Float(5.0), Value::Float(7.0)],
        ));
        approx(float_at(&signal, 2.0), 7.0);
        approx(float_at(&signal, 0.5), 4.0);
        approx(float_at(&signal, 30.0), 7.0);
    }

    #[test]
    fn additive_combines_base_and_delta() {
        let base = Signal::Baked(BakedSignal::new(0.0, 1.0, vec![Value::Float(1.0); 4]));
        let signal = Signal::additive(
            &base,
            vec![Keyframe::new(1.0, Value::Float(2.0), Interpolation::Linear)],
        );
        approx(float_at(&signal, 1.0), 3.0);
        assert_eq!(signal.keyframes().len(), 1);
        assert_eq!(signal.base(), &base);
    }

    #[test]
    fn additive_of_additive_strips_to_root_base() {
        let base = Signal::Baked(BakedSignal::new(0.0, 1.0, vec![Value::Float(1.0); 2]));
        let once = Signal::additive(&base, vec![Keyframe::at_seconds(0.5, Value::Float(1.0))]);
        let twice = Signal::additive(&once, vec![]);
        assert_eq!(twice.base(), &base);
    }
}
