//! Plugin Configuration
//!
//! Structured form of the configuration a plugin declares with
//! `defaultConfig(...)` and that users override in `config/<plugin>.json`.
//!
//! Layers are merged field by field rather than as arbitrary JSON:
//! - declared defaults
//! - persisted overrides (win on every key they set)
//! - session tunables (fill only the tunable keys still unset)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{CommandOptions, Point};

/// Session-wide vote tunables, in the units used on disk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionTunables {
    pub threshold: u32,
    /// Seconds
    pub timeout: f64,
    /// Seconds
    pub wait: f64,
}

impl Default for SessionTunables {
    fn default() -> Self {
        Self {
            threshold: 4,
            timeout: 2.0,
            wait: 0.0,
        }
    }
}

/// A named screen position
///
/// Keys other than `x` and `y` (sizes, labels) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Position {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for Position {
    fn from(point: Point) -> Self {
        Self {
            x: point.x,
            y: point.y,
            extra: serde_json::Map::new(),
        }
    }
}

/// Resolved or partial plugin configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<f64>,

    /// Per-command option overrides
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub commands: IndexMap<String, CommandOptions>,

    /// Named screen positions used by the plugin
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub positions: IndexMap<String, Position>,

    /// Any other keys the plugin declares, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PluginConfig {
    /// Overlay `top` on top of `self`
    ///
    /// Scalars in `top` win, per-command options merge per field, positions
    /// and extra keys are replaced per key. Nested extra objects merge
    /// recursively.
    pub fn overlay(&self, top: &PluginConfig) -> PluginConfig {
        let mut merged = self.clone();

        merged.threshold = top.threshold.or(self.threshold);
        merged.timeout = top.timeout.or(self.timeout);
        merged.wait = top.wait.or(self.wait);

        for (id, options) in &top.commands {
            let base = merged.commands.get(id).cloned().unwrap_or_default();
            merged.commands.insert(id.clone(), base.overlay(options));
        }

        for (name, position) in &top.positions {
            merged.positions.insert(name.clone(), position.clone());
        }

        for (key, value) in &top.extra {
            match merged.extra.get_mut(key) {
                Some(existing) => merge_json(existing, value),
                None => {
                    merged.extra.insert(key.clone(), value.clone());
                }
            }
        }

        merged
    }

    /// Fill tunable keys the plugin left unset from the session defaults
    pub fn with_session_fallback(mut self, session: &SessionTunables) -> PluginConfig {
        self.threshold = self.threshold.or(Some(session.threshold));
        self.timeout = self.timeout.or(Some(session.timeout));
        self.wait = self.wait.or(Some(session.wait));
        self
    }

    /// Resolved tunables, session defaults for anything unset
    pub fn tunables(&self, session: &SessionTunables) -> SessionTunables {
        SessionTunables {
            threshold: self.threshold.unwrap_or(session.threshold),
            timeout: self.timeout.unwrap_or(session.timeout),
            wait: self.wait.unwrap_or(session.wait),
        }
    }

    /// Look up a named position
    pub fn position(&self, name: &str) -> Option<Point> {
        self.positions.get(name).map(Position::point)
    }
}

fn merge_json(target: &mut serde_json::Value, source: &serde_json::Value) {
    match (target, source) {
        (serde_json::Value::Object(target), serde_json::Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> PluginConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_persisted_wins_on_leaf_keys() {
        let defaults = parse(json!({
            "threshold": 2,
            "positions": {
                "idle": {"x": 546, "y": 450},
                "ldoor": {"x": 53, "y": 342}
            }
        }));
        let persisted = parse(json!({
            "positions": {"ldoor": {"x": 60, "y": 340}}
        }));

        let merged = defaults.overlay(&persisted);
        assert_eq!(merged.threshold, Some(2));
        assert_eq!(merged.position("idle"), Some(Point::new(546.0, 450.0)));
        assert_eq!(merged.position("ldoor"), Some(Point::new(60.0, 340.0)));
    }

    #[test]
    fn test_position_extra_keys_survive_overlay() {
        let defaults = parse(json!({"positions": {"cam": {"x": 1, "y": 2, "w": 120}}}));
        let persisted = parse(json!({"positions": {"door": {"x": 5, "y": 6, "h": 40}}}));

        let merged = defaults.overlay(&persisted);
        assert_eq!(merged.positions["cam"].extra["w"], json!(120));
        assert_eq!(merged.positions["door"].extra["h"], json!(40));
        assert_eq!(merged.position("door"), Some(Point::new(5.0, 6.0)));
    }

    #[test]
    fn test_extra_keys_merge_recursively() {
        let defaults = parse(json!({"layout": {"cols": 3, "rows": 2}}));
        let persisted = parse(json!({"layout": {"rows": 4}, "mode": "fast"}));

        let merged = defaults.overlay(&persisted);
        assert_eq!(merged.extra["layout"], json!({"cols": 3, "rows": 4}));
        assert_eq!(merged.extra["mode"], json!("fast"));
    }

    #[test]
    fn test_command_options_merge_per_field() {
        let defaults = parse(json!({"commands": {"boop": {"threshold": 5, "waitSeconds": 3}}}));
        let persisted = parse(json!({"commands": {"boop": {"threshold": 1}}}));

        let merged = defaults.overlay(&persisted);
        let boop = &merged.commands["boop"];
        assert_eq!(boop.threshold, Some(1));
        assert_eq!(boop.wait_seconds, Some(3.0));
    }

    #[test]
    fn test_session_fallback_fills_only_unset() {
        let config = parse(json!({"threshold": 7})).with_session_fallback(&SessionTunables {
            threshold: 4,
            timeout: 2.0,
            wait: 1.0,
        });

        assert_eq!(config.threshold, Some(7));
        assert_eq!(config.timeout, Some(2.0));
        assert_eq!(config.wait, Some(1.0));
    }

    #[test]
    fn test_roundtrip_keeps_declared_shape() {
        let value = json!({
            "positions": {
                "idle": {"x": 1.0, "y": 2.0},
                "cam": {"x": 3.0, "y": 4.0, "w": 120, "label": "stage"}
            },
            "flag": true
        });
        let config = parse(value.clone());
        assert_eq!(serde_json::to_value(&config).unwrap(), value);
    }
}
