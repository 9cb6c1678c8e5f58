//! Upper-body packets sent by the HMD rig.
//!
//! Wire payloads are loose JSON. A packet keeps the decoded value untouched
//! and builds a normalized view once, with every missing or mistyped field
//! replaced by its default (`0.0`, empty string, empty joint list).

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn from_value(value: Option<&Value>) -> Self {
        Self {
            x: number_field(value, "x"),
            y: number_field(value, "y"),
            z: number_field(value, "z"),
        }
    }
}

/// Headset position and euler rotation (degrees, as sent by the rig)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HmdPose {
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Joint {
    pub name: String,
    pub position: Vec3,
}

impl Joint {
    fn from_value(value: &Value) -> Self {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let position = value.get("pose").and_then(|pose| pose.get("position"));
        Self {
            name,
            position: Vec3::from_value(position),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpperBodyPacket {
    raw: Value,
    timestamp: Option<f64>,
    hmd: HmdPose,
    joints: Vec<Joint>,
}

impl UpperBodyPacket {
    /// Normalize a decoded payload. Never fails: anything unreadable falls
    /// back to its default.
    pub fn from_value(raw: Value) -> Self {
        let timestamp = raw.get("timestamp").and_then(as_number);
        let hmd = raw.get("hmd");
        let hmd = HmdPose {
            position: Vec3::from_value(hmd.and_then(|h| h.get("position"))),
            rotation: Vec3::from_value(hmd.and_then(|h| h.get("rotation"))),
        };
        let joints = raw
            .get("joints")
            .and_then(Value::as_array)
            .map(|joints| joints.iter().map(Joint::from_value).collect())
            .unwrap_or_default();

        Self {
            raw,
            timestamp,
            hmd,
            joints,
        }
    }

    /// The payload exactly as decoded from the datagram.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Whether the payload was a non-empty JSON object. Empty or non-object
    /// payloads are stored but carry nothing to fuse.
    pub fn is_populated(&self) -> bool {
        self.raw.as_object().is_some_and(|fields| !fields.is_empty())
    }

    /// Sender-side timestamp in seconds, `0.0` when absent or non-numeric.
    pub fn timestamp(&self) -> f64 {
        self.timestamp.unwrap_or(0.0)
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    pub fn hmd(&self) -> &HmdPose {
        &self.hmd
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// `name:(x, y, z)` for the first `limit` joints, `, ...` appended when cut.
    pub fn joint_summary(&self, limit: usize) -> String {
        let mut summary = self
            .joints
            .iter()
            .take(limit)
            .map(|j| {
                format!(
                    "{}:({:.3}, {:.3}, {:.3})",
                    j.name, j.position.x, j.position.y, j.position.z
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        if self.joints.len() > limit {
            summary.push_str(", ...");
        }
        summary
    }
}

fn number_field(value: Option<&Value>, key: &str) -> f64 {
    value
        .and_then(|v| v.get(key))
        .and_then(as_number)
        .unwrap_or(0.0)
}

/// Numbers pass through; numeric strings are accepted too (some rigs quote them).
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
