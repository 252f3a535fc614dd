//! Raw pointer sampling.
//!
//! Timestamps are passed in by the caller (milliseconds, any monotonic
//! origin) so the tracker never reads a clock.

use serde::{Deserialize, Serialize};

/// A pointer position in screen pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Instantaneous motion derived from two consecutive samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSample {
    /// Velocity in px/ms.
    pub vx: f64,
    pub vy: f64,
    /// Distance covered since the previous sample, px.
    pub speed: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Anchor {
    origin: Point,
    last: Point,
    last_t: f64,
    travelled: f64,
}

/// Tracks one pointer from press to release.
#[derive(Clone, Debug, Default)]
pub struct PointerTracker {
    anchor: Option<Anchor>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Press: record the origin. Non-finite input is ignored.
    pub fn on_start(&mut self, pos: Point, t: f64) {
        if !pos.is_finite() || !t.is_finite() {
            return;
        }
        self.anchor = Some(Anchor {
            origin: pos,
            last: pos,
            last_t: t,
            travelled: 0.0,
        });
    }

    /// Move: derive velocity against the previous accepted sample.
    ///
    /// Returns `None` and leaves all state untouched when no press is active,
    /// when the input is not finite, or when `t - last_t <= 0`.
    pub fn on_move(&mut self, pos: Point, t: f64) -> Option<MotionSample> {
        let anchor = self.anchor.as_mut()?;
        if !pos.is_finite() || !t.is_finite() {
            return None;
        }
        let dt = t - anchor.last_t;
        if dt <= 0.0 {
            return None;
        }

        let dx = pos.x - anchor.last.x;
        let dy = pos.y - anchor.last.y;
        let speed = dx.hypot(dy);

        anchor.last = pos;
        anchor.last_t = t;
        anchor.travelled += speed;

        Some(MotionSample {
            vx: dx / dt,
            vy: dy / dt,
            speed,
        })
    }

    /// Release: forget the press. Returns the total path length travelled,
    /// or `None` if no press was active.
    pub fn on_end(&mut self) -> Option<f64> {
        self.anchor.take().map(|a| a.travelled)
    }

    pub fn is_active(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn origin(&self) -> Option<Point> {
        self.anchor.map(|a| a.origin)
    }

    pub fn last_position(&self) -> Option<Point> {
        self.anchor.map(|a| a.last)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.anchor.map(|a| a.last_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn started(x: f64, y: f64, t: f64) -> PointerTracker {
        let mut tr = PointerTracker::new();
        tr.on_start(Point::new(x, y), t);
        tr
    }

    #[test]
    fn test_velocity_and_speed() {
        let mut tr = started(0.0, 0.0, 100.0);
        let s = tr.on_move(Point::new(30.0, 40.0), 110.0).unwrap();
        assert_relative_eq!(s.speed, 50.0);
        assert_relative_eq!(s.vx, 3.0);
        assert_relative_eq!(s.vy, 4.0);
        assert_eq!(tr.last_position(), Some(Point::new(30.0, 40.0)));
        assert_eq!(tr.last_timestamp(), Some(110.0));
    }

    #[test]
    fn test_zero_dt_discarded() {
        let mut tr = started(5.0, 5.0, 100.0);
        assert!(tr.on_move(Point::new(50.0, 50.0), 100.0).is_none());
        assert!(tr.on_move(Point::new(50.0, 50.0), 90.0).is_none());
        assert_eq!(tr.last_position(), Some(Point::new(5.0, 5.0)));
        assert_eq!(tr.last_timestamp(), Some(100.0));
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut tr = started(0.0, 0.0, 0.0);
        assert!(tr.on_move(Point::new(f64::NAN, 1.0), 10.0).is_none());
        assert!(tr.on_move(Point::new(1.0, 1.0), f64::INFINITY).is_none());
        assert_eq!(tr.last_timestamp(), Some(0.0));

        let mut idle = PointerTracker::new();
        idle.on_start(Point::new(f64::NAN, 0.0), 0.0);
        assert!(!idle.is_active());
    }

    #[test]
    fn test_move_without_start() {
        let mut tr = PointerTracker::new();
        assert!(tr.on_move(Point::new(1.0, 1.0), 1.0).is_none());
        assert!(tr.on_end().is_none());
    }

    #[test]
    fn test_end_reports_travel_and_clears() {
        let mut tr = started(0.0, 0.0, 0.0);
        tr.on_move(Point::new(3.0, 4.0), 1.0);
        tr.on_move(Point::new(0.0, 0.0), 2.0);
        assert_relative_eq!(tr.on_end().unwrap(), 10.0);
        assert!(!tr.is_active());
        assert!(tr.origin().is_none());
    }
}
