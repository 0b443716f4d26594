//! Pointer input normalization
//!
//! Mouse, pen and touch events arrive in different shapes. They are reduced
//! here to one `PointerSample` so the state machine has a single path.

use crate::domain::BookingId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Primary mouse button; other buttons never start a gesture
const PRIMARY_BUTTON: u8 = 0;
/// Pointer id reported for the (single) mouse
const MOUSE_POINTER_ID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

impl PointerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointerKind::Mouse => "mouse",
            PointerKind::Pen => "pen",
            PointerKind::Touch => "touch",
        }
    }
}

/// Normalized pointer position in viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub pointer_id: u32,
    pub kind: PointerKind,
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

impl PointerSample {
    pub fn new(pointer_id: u32, kind: PointerKind, x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self { pointer_id, kind, x, y, timestamp_ms }
    }

    pub fn mouse(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self::new(MOUSE_POINTER_ID, PointerKind::Mouse, x, y, timestamp_ms)
    }

    pub fn touch(identifier: u32, x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self::new(identifier, PointerKind::Touch, x, y, timestamp_ms)
    }

    /// Same physical pointer
    #[inline]
    pub fn same_pointer(&self, other: &PointerSample) -> bool {
        self.pointer_id == other.pointer_id && self.kind == other.kind
    }

    #[inline]
    pub fn distance_to(&self, other: &PointerSample) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Part of a booking block that was grabbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragHandle {
    /// Move the whole booking
    Body,
    /// Resize the start boundary
    StartEdge,
    /// Resize the end boundary
    EndEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DragTarget {
    pub booking_id: BookingId,
    pub handle: DragHandle,
}

impl DragTarget {
    pub fn body(booking_id: BookingId) -> Self {
        Self { booking_id, handle: DragHandle::Body }
    }

    pub fn start_edge(booking_id: BookingId) -> Self {
        Self { booking_id, handle: DragHandle::StartEdge }
    }

    pub fn end_edge(booking_id: BookingId) -> Self {
        Self { booking_id, handle: DragHandle::EndEdge }
    }
}

/// Input consumed by the gesture controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureInput {
    Down { target: DragTarget, sample: PointerSample },
    Move(PointerSample),
    Up(PointerSample),
    Cancel,
    /// Clock tick; fires the long-press timer and drives auto-scroll
    Tick(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawPhase {
    #[serde(alias = "start")]
    Down,
    Move,
    #[serde(alias = "end")]
    Up,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub phase: RawPhase,
    pub client_x: f64,
    pub client_y: f64,
    #[serde(default)]
    pub button: u8,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenEvent {
    pub phase: RawPhase,
    pub pointer_id: u32,
    pub client_x: f64,
    pub client_y: f64,
    #[serde(default)]
    pub pressure: f32,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub identifier: u32,
    pub client_x: f64,
    pub client_y: f64,
}

/// Touch event; `changed` lists the touch points this event is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub phase: RawPhase,
    pub changed: SmallVec<[TouchPoint; 2]>,
    pub timestamp_ms: u64,
}

/// Host event before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum RawInput {
    Mouse(MouseEvent),
    Pen(PenEvent),
    Touch(TouchEvent),
}

impl RawInput {
    /// Convert to gesture inputs, one per pointer the event concerns
    ///
    /// `target` is the host's hit-test result and is only used for down
    /// events; a down without a target produces nothing.
    pub fn normalize(&self, target: Option<DragTarget>) -> SmallVec<[GestureInput; 2]> {
        let mut out = SmallVec::new();
        match self {
            RawInput::Mouse(e) => {
                if e.phase == RawPhase::Down && e.button != PRIMARY_BUTTON {
                    return out;
                }
                let sample = PointerSample::mouse(e.client_x, e.client_y, e.timestamp_ms);
                out.extend(to_input(e.phase, sample, target));
            }
            RawInput::Pen(e) => {
                let sample = PointerSample::new(
                    e.pointer_id,
                    PointerKind::Pen,
                    e.client_x,
                    e.client_y,
                    e.timestamp_ms,
                );
                out.extend(to_input(e.phase, sample, target));
            }
            RawInput::Touch(e) => {
                for point in &e.changed {
                    let sample = PointerSample::touch(
                        point.identifier,
                        point.client_x,
                        point.client_y,
                        e.timestamp_ms,
                    );
                    out.extend(to_input(e.phase, sample, target));
                }
            }
        }
        out
    }
}

fn to_input(
    phase: RawPhase,
    sample: PointerSample,
    target: Option<DragTarget>,
) -> Option<GestureInput> {
    match phase {
        RawPhase::Down => target.map(|target| GestureInput::Down { target, sample }),
        RawPhase::Move => Some(GestureInput::Move(sample)),
        RawPhase::Up => Some(GestureInput::Up(sample)),
        RawPhase::Cancel => Some(GestureInput::Cancel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_mouse_button_is_ignored() {
        let raw = RawInput::Mouse(MouseEvent {
            phase: RawPhase::Down,
            client_x: 10.0,
            client_y: 20.0,
            button: 2,
            timestamp_ms: 5,
        });
        assert!(raw.normalize(Some(DragTarget::body(BookingId::new()))).is_empty());
    }

    #[test]
    fn test_touch_end_normalizes_each_changed_point() {
        let raw: RawInput = serde_json::from_str(
            r#"{"device":"touch","phase":"end","timestamp_ms":900,
                "changed":[{"identifier":3,"client_x":1.0,"client_y":2.0},
                           {"identifier":4,"client_x":5.0,"client_y":6.0}]}"#,
        )
        .unwrap();

        let inputs = raw.normalize(None);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], GestureInput::Up(PointerSample::touch(3, 1.0, 2.0, 900)));
        assert_eq!(inputs[1], GestureInput::Up(PointerSample::touch(4, 5.0, 6.0, 900)));
    }

    #[test]
    fn test_down_without_target_produces_nothing() {
        let raw = RawInput::Pen(PenEvent {
            phase: RawPhase::Down,
            pointer_id: 7,
            client_x: 0.0,
            client_y: 0.0,
            pressure: 0.5,
            timestamp_ms: 1,
        });
        assert!(raw.normalize(None).is_empty());

        let target = DragTarget::end_edge(BookingId::new());
        let inputs = raw.normalize(Some(target));
        assert!(matches!(inputs[0], GestureInput::Down { target: t, sample } if t == target && sample.kind == PointerKind::Pen));
    }
}
