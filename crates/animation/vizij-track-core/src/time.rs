//! Time handling for tracks.
//!
//! Times are stored as integer nanoseconds so that equality is exact: handle
//! collisions, cut points, and block boundaries all compare without float
//! tolerance. One tick is the smallest representable offset and serves as the
//! boundary epsilon of the segmentation algorithm.

use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Represents a moment in animation time
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AnimationTime(u64);

impl AnimationTime {
    /// Smallest representable step (one nanosecond).
    pub const EPSILON: AnimationTime = AnimationTime(1);

    /// Create animation time from nanoseconds
    #[inline]
    pub const fn from_nanos(nanoseconds: u64) -> Self {
        Self(nanoseconds)
    }

    /// Create animation time from milliseconds
    #[inline]
    pub fn from_millis(milliseconds: f64) -> Result<Self, TrackError> {
        Self::from_seconds(milliseconds / 1000.0)
    }

    /// Create a new animation time
    #[inline]
    pub fn from_seconds(seconds: f64) -> Result<Self, TrackError> {
        if seconds < 0.0 || !seconds.is_finite() {
            return Err(TrackError::InvalidTime { time: seconds });
        }
        let nanos = (seconds * 1_000_000_000.0).round() as u64;
        Ok(Self(nanos))
    }

    /// Zero time
    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get time in seconds
    #[inline]
    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Shift by a signed number of nanoseconds, saturating at zero.
    #[inline]
    pub fn offset(&self, delta_nanos: i64) -> Self {
        if delta_nanos >= 0 {
            Self(self.0.saturating_add(delta_nanos as u64))
        } else {
            Self(self.0.saturating_sub(delta_nanos.unsigned_abs()))
        }
    }

    /// Seconds from `earlier` to `self`, negative if `self` comes first.
    #[inline]
    pub fn seconds_since(&self, earlier: AnimationTime) -> f64 {
        (self.0 as f64 - earlier.0 as f64) / 1_000_000_000.0
    }
}

impl std::ops::Add for AnimationTime {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl std::ops::Sub for AnimationTime {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl From<u64> for AnimationTime {
    fn from(nanos: u64) -> Self {
        Self::from_nanos(nanos)
    }
}

impl From<f64> for AnimationTime {
    fn from(seconds: f64) -> Self {
        Self::from_seconds(seconds.max(0.0)).unwrap_or(Self::zero())
    }
}

impl std::fmt::Display for AnimationTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.as_seconds())
    }
}

/// Represents a time range in animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: AnimationTime,
    pub end: AnimationTime,
}

impl TimeRange {
    /// Create a new time range
    #[inline]
    pub fn new(start: AnimationTime, end: AnimationTime) -> Result<Self, TrackError> {
        if start > end {
            return Err(TrackError::InvalidRange {
                start: start.as_seconds(),
                end: end.as_seconds(),
            });
        }
        Ok(Self { start, end })
    }

    /// Build a range from seconds.
    pub fn from_seconds(start: f64, end: f64) -> Result<Self, TrackError> {
        Self::new(
            AnimationTime::from_seconds(start)?,
            AnimationTime::from_seconds(end)?,
        )
    }

    /// Degenerate range covering a single instant.
    #[inline]
    pub fn instant(at: AnimationTime) -> Self {
        Self { start: at, end: at }
    }

    /// Get the duration of this range
    #[inline]
    pub fn duration(&self) -> AnimationTime {
        self.end - self.start
    }

    /// Check if a time is within this range (inclusive)
    #[inline]
    pub fn contains(&self, time: AnimationTime) -> bool {
        time >= self.start && time <= self.end
    }

    /// Whether the two ranges share more than a boundary instant.
    #[inline]
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animation_time() {
        let time1 = AnimationTime::from_seconds(1.5).unwrap();
        let time2 = AnimationTime::from_seconds(2.0).unwrap();

        assert_eq!(time1.as_seconds(), 1.5);
        assert_eq!((time1 + time2).as_seconds(), 3.5);
        assert_eq!(time2.seconds_since(time1), 0.5);
        assert_eq!(time1.seconds_since(time2), -0.5);
    }

    #[test]
    fn test_invalid_time() {
        assert!(AnimationTime::from_seconds(-1.0).is_err());
        assert!(AnimationTime::from_seconds(f64::NAN).is_err());
        assert!(AnimationTime::from_seconds(f64::INFINITY).is_err());
    }

    #[test]
    fn offset_saturates_at_zero() {
        let t = AnimationTime::from_nanos(10);
        assert_eq!(t.offset(5), AnimationTime::from_nanos(15));
        assert_eq!(t.offset(-20), AnimationTime::zero());
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::from_seconds(1.0, 3.0).unwrap();

        assert_eq!(range.duration().as_seconds(), 2.0);
        assert!(range.contains(AnimationTime::from_seconds(3.0).unwrap()));
        assert!(!range.contains(AnimationTime::from_seconds(4.0).unwrap()));
        assert!(TimeRange::from_seconds(3.0, 1.0).is_err());
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        let a = TimeRange::from_seconds(0.0, 2.0).unwrap();
        let b = TimeRange::from_seconds(2.0, 4.0).unwrap();
        let c = TimeRange::from_seconds(1.0, 3.0).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(!TimeRange::instant(a.end).overlaps(&b));
    }
}
