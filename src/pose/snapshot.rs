use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Single named body keypoint from a camera pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "LandmarkRecord")]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Confidence / visibility score (0.0..=1.0, not validated)
    pub confidence: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self { x, y, z, confidence }
    }
}

/// Recorded landmark as pipelines write it. MediaPipe-style records call the
/// score `visibility`; when both keys are present `confidence` wins.
#[derive(Deserialize)]
struct LandmarkRecord {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    z: f64,
    confidence: Option<f64>,
    visibility: Option<f64>,
}

impl From<LandmarkRecord> for Landmark {
    fn from(r: LandmarkRecord) -> Self {
        let confidence = r.confidence.or(r.visibility).unwrap_or(0.0);
        Self::new(r.x, r.y, r.z, confidence)
    }
}

/// Lower-body pose produced by one camera pipeline cycle.
///
/// Immutable once built: the workspace shares it behind an `Arc`, so readers
/// always see one complete snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    timestamp: f64,
    #[serde(default)]
    landmarks: BTreeMap<String, Landmark>,
}

impl PoseSnapshot {
    pub fn new(timestamp: f64, landmarks: BTreeMap<String, Landmark>) -> Self {
        Self { timestamp, landmarks }
    }

    /// Snapshot stamped with the current wall clock (seconds since the Unix epoch).
    pub fn now(landmarks: BTreeMap<String, Landmark>) -> Self {
        Self::new(wall_clock_secs(), landmarks)
    }

    pub fn from_landmarks<I, S>(timestamp: f64, landmarks: I) -> Self
    where
        I: IntoIterator<Item = (S, Landmark)>,
        S: Into<String>,
    {
        let landmarks = landmarks
            .into_iter()
            .map(|(name, lm)| (name.into(), lm))
            .collect();
        Self::new(timestamp, landmarks)
    }

    /// Producer-local timestamp in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn landmarks(&self) -> &BTreeMap<String, Landmark> {
        &self.landmarks
    }

    pub fn get(&self, name: &str) -> Option<&Landmark> {
        self.landmarks.get(name)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Same landmarks, new timestamp.
    pub fn restamped(&self, timestamp: f64) -> Self {
        Self::new(timestamp, self.landmarks.clone())
    }
}

pub(crate) fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
