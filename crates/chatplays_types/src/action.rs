//! Action queue items
//!
//! Items a plugin script enqueues for the actuator. The serialized form is
//! the JSON object a script passes to `execute(...)`.

use serde::{Deserialize, Serialize};

/// Interpolation speed factor used for smooth pointer moves
pub const SMOOTH_MOVE_SPEED: f64 = 1.75;

/// A screen position in actuator coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One timed actuator operation
///
/// Items are immutable once enqueued and execute strictly in FIFO order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionItem {
    /// Move to the point, settle for `delay` milliseconds, then click
    Click {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<u64>,
    },

    /// Jump straight to the point
    #[serde(rename = "pos", alias = "instantMove")]
    InstantMove { x: f64, y: f64 },

    /// Interpolated move at [`SMOOTH_MOVE_SPEED`]
    #[serde(rename = "move", alias = "smoothMove")]
    SmoothMove { x: f64, y: f64 },

    /// Suspend the queue
    Delay { ms: u64 },
}

impl ActionItem {
    /// Target point, if the item moves the pointer
    pub fn point(&self) -> Option<Point> {
        match *self {
            ActionItem::Click { x, y, .. }
            | ActionItem::InstantMove { x, y }
            | ActionItem::SmoothMove { x, y } => Some(Point::new(x, y)),
            ActionItem::Delay { .. } => None,
        }
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ActionItem::Click { .. } => "click",
            ActionItem::InstantMove { .. } => "pos",
            ActionItem::SmoothMove { .. } => "move",
            ActionItem::Delay { .. } => "delay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_items() {
        let click: ActionItem =
            serde_json::from_str(r#"{"type":"click","x":53,"y":342,"delay":750}"#).unwrap();
        assert_eq!(
            click,
            ActionItem::Click {
                x: 53.0,
                y: 342.0,
                delay: Some(750)
            }
        );

        let pos: ActionItem = serde_json::from_str(r#"{"type":"pos","x":1,"y":2}"#).unwrap();
        assert_eq!(pos, ActionItem::InstantMove { x: 1.0, y: 2.0 });

        let smooth: ActionItem = serde_json::from_str(r#"{"type":"move","x":3,"y":4}"#).unwrap();
        assert_eq!(smooth, ActionItem::SmoothMove { x: 3.0, y: 4.0 });

        let delay: ActionItem = serde_json::from_str(r#"{"type":"delay","ms":100}"#).unwrap();
        assert_eq!(delay, ActionItem::Delay { ms: 100 });
        assert_eq!(delay.point(), None);
    }

    #[test]
    fn test_parse_aliases() {
        let item: ActionItem =
            serde_json::from_str(r#"{"type":"instantMove","x":5,"y":6}"#).unwrap();
        assert_eq!(item.kind(), "pos");
        assert_eq!(item.point(), Some(Point::new(5.0, 6.0)));
    }

    #[test]
    fn test_reject_unknown_type() {
        let result: Result<ActionItem, _> = serde_json::from_str(r#"{"type":"scroll","x":1}"#);
        assert!(result.is_err());
    }
}
