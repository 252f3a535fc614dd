use serde::{Deserialize, Serialize};

use crate::gesture::{GestureClassifier, GestureConfig};
use crate::pointer::{Point, PointerTracker};

/// One raw input event, as recorded in gesture traces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum PointerEvent {
    Start { x: f64, y: f64, t: f64 },
    Move { x: f64, y: f64, t: f64 },
    End,
}

/// Why the jar should pop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopTrigger {
    /// Shake energy crossed the threshold mid-drag.
    Shake,
    /// The pointer was pressed and released without moving.
    Tap,
}

/// Snapshot of the live per-drag state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureState {
    pub last_position: Point,
    pub last_timestamp: f64,
    pub energy: f64,
    pub tilt: f64,
}

/// A pointer tracker wired to a gesture classifier for the lifetime of one
/// drag. Energy starts at zero on every press and the tilt snaps back to
/// upright on release.
#[derive(Clone, Debug)]
pub struct DragGesture {
    tracker: PointerTracker,
    classifier: GestureClassifier,
}

impl DragGesture {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            tracker: PointerTracker::new(),
            classifier: GestureClassifier::new(config),
        }
    }

    pub fn start(&mut self, pos: Point, t: f64) {
        self.classifier.reset();
        self.tracker.on_start(pos, t);
    }

    /// Returns `Some(PopTrigger::Shake)` on the sample that fires a shake.
    pub fn move_to(&mut self, pos: Point, t: f64, is_shaking: bool) -> Option<PopTrigger> {
        let sample = self.tracker.on_move(pos, t)?;
        let out = self.classifier.observe(sample, is_shaking);
        out.shake.then_some(PopTrigger::Shake)
    }

    /// Returns `Some(PopTrigger::Tap)` when the drag never moved. A tap is
    /// accepted whatever the energy state.
    pub fn end(&mut self) -> Option<PopTrigger> {
        self.classifier.reset();
        let travelled = self.tracker.on_end()?;
        (travelled == 0.0).then_some(PopTrigger::Tap)
    }

    pub fn apply(&mut self, event: PointerEvent, is_shaking: bool) -> Option<PopTrigger> {
        match event {
            PointerEvent::Start { x, y, t } => {
                self.start(Point::new(x, y), t);
                None
            }
            PointerEvent::Move { x, y, t } => self.move_to(Point::new(x, y), t, is_shaking),
            PointerEvent::End => self.end(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Current tilt in degrees; 0 when no drag is active.
    pub fn tilt(&self) -> f64 {
        self.classifier.tilt()
    }

    pub fn energy(&self) -> f64 {
        self.classifier.energy()
    }

    /// `None` outside a drag: the state only exists between press and release.
    pub fn state(&self) -> Option<GestureState> {
        Some(GestureState {
            last_position: self.tracker.last_position()?,
            last_timestamp: self.tracker.last_timestamp()?,
            energy: self.classifier.energy(),
            tilt: self.classifier.tilt(),
        })
    }
}

impl Default for DragGesture {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Horizontal zig-zag of `step` px every 10ms.
    fn shake_events(samples: usize, step: f64) -> Vec<PointerEvent> {
        let mut events = vec![PointerEvent::Start { x: 0.0, y: 0.0, t: 0.0 }];
        for i in 1..=samples {
            let x = if i % 2 == 0 { 0.0 } else { step };
            events.push(PointerEvent::Move { x, y: 0.0, t: i as f64 * 10.0 });
        }
        events
    }

    #[test]
    fn test_zigzag_shake_triggers_once() {
        let mut drag = DragGesture::default();
        let triggers: Vec<_> = shake_events(8, 50.0)
            .into_iter()
            .filter_map(|e| drag.apply(e, false))
            .collect();
        // 50 px per sample: 350 > 300 after 7 samples
        assert_eq!(triggers, [PopTrigger::Shake]);
    }

    #[test]
    fn test_slow_drag_never_shakes() {
        let mut drag = DragGesture::default();
        let triggers: Vec<_> = shake_events(500, 5.0)
            .into_iter()
            .filter_map(|e| drag.apply(e, false))
            .collect();
        assert!(triggers.is_empty());
        assert_eq!(drag.energy(), 0.0);
    }

    #[test]
    fn test_tap_without_movement() {
        let mut drag = DragGesture::default();
        drag.start(Point::new(10.0, 10.0), 0.0);
        // Same-timestamp jitter is discarded and does not count as motion.
        assert!(drag.move_to(Point::new(12.0, 10.0), 0.0, false).is_none());
        assert_eq!(drag.end(), Some(PopTrigger::Tap));
    }

    #[test]
    fn test_tap_accepted_while_shaking() {
        let mut drag = DragGesture::default();
        drag.apply(PointerEvent::Start { x: 1.0, y: 1.0, t: 5.0 }, true);
        assert_eq!(drag.apply(PointerEvent::End, true), Some(PopTrigger::Tap));
    }

    #[test]
    fn test_moved_release_is_not_tap() {
        let mut drag = DragGesture::default();
        drag.start(Point::new(0.0, 0.0), 0.0);
        drag.move_to(Point::new(1.0, 0.0), 16.0, false);
        assert_eq!(drag.end(), None);
    }

    #[test]
    fn test_end_resets_tilt_and_state() {
        let mut drag = DragGesture::default();
        drag.start(Point::new(0.0, 0.0), 0.0);
        drag.move_to(Point::new(40.0, 0.0), 10.0, false);
        assert!(drag.tilt() > 0.0);
        drag.end();
        assert_eq!(drag.tilt(), 0.0);
        assert!(drag.state().is_none());
    }

    #[test]
    fn test_new_drag_starts_with_zero_energy() {
        let mut drag = DragGesture::default();
        drag.start(Point::new(0.0, 0.0), 0.0);
        drag.move_to(Point::new(100.0, 0.0), 10.0, false);
        assert!(drag.energy() > 0.0);
        drag.start(Point::new(0.0, 0.0), 20.0);
        assert_eq!(drag.energy(), 0.0);
    }

    #[test]
    fn test_trace_json_format() {
        let json = r#"[
            {"phase": "start", "x": 1, "y": 2, "t": 0},
            {"phase": "move", "x": 3, "y": 4, "t": 16.5},
            {"phase": "end"}
        ]"#;
        let events: Vec<PointerEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events[1], PointerEvent::Move { x: 3.0, y: 4.0, t: 16.5 });
        assert_eq!(events[2], PointerEvent::End);
    }

    proptest! {
        #[test]
        fn prop_non_advancing_moves_leave_state_unchanged(
            moves in prop::collection::vec((-1e4f64..1e4, -1e4f64..1e4, 0f64..1e3), 1..50)
        ) {
            let mut drag = DragGesture::default();
            drag.start(Point::new(0.0, 0.0), 1000.0);
            drag.move_to(Point::new(25.0, 0.0), 1010.0, false);
            let before = drag.state().unwrap();

            for (x, y, back) in moves {
                // dt = -back <= 0
                prop_assert!(drag.move_to(Point::new(x, y), 1010.0 - back, false).is_none());
                let after = drag.state().unwrap();
                prop_assert_eq!(after, before);
                prop_assert!(!after.energy.is_nan() && !after.tilt.is_nan());
            }
        }
    }
}
