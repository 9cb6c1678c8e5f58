use std::net::SocketAddr;

use tracing::{debug, info};

use super::SyncObservation;
use crate::pose::{PoseSnapshot, UpperBodyPacket};

/// Diagnostics hook for [`super::FusionWorkspace`].
///
/// Callbacks run on the thread that performed the update, after the
/// workspace locks are released. Keep them cheap.
pub trait WorkspaceObserver: Send + Sync {
    fn upper_body_accepted(&self, _packet: &UpperBodyPacket, _addr: SocketAddr) {}

    /// Called on every `sample_every`-th lower-body update.
    fn lower_body_sampled(&self, _snapshot: &PoseSnapshot, _sequence: u64) {}

    /// Upper-body packet dropped as older than the stored one.
    fn stale_packet_rejected(&self, _incoming: f64, _latest: f64) {}

    fn sync_observed(&self, _observation: &SyncObservation) {}
}

/// Writes workspace activity to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl WorkspaceObserver for LoggingObserver {
    fn upper_body_accepted(&self, packet: &UpperBodyPacket, addr: SocketAddr) {
        info!(
            "Upper-body packet from {} @ {:.3} with {} joints",
            addr,
            packet.timestamp(),
            packet.joint_count()
        );
    }

    fn lower_body_sampled(&self, snapshot: &PoseSnapshot, sequence: u64) {
        if snapshot.is_empty() {
            info!(
                "Pose snapshot from camera @ {:.3} (no landmarks visible, update #{})",
                snapshot.timestamp(),
                sequence
            );
            return;
        }

        info!(
            "Pose snapshot from camera @ {:.3} with {} keypoints (update #{}):",
            snapshot.timestamp(),
            snapshot.len(),
            sequence
        );
        for (idx, (name, lm)) in snapshot.landmarks().iter().enumerate() {
            info!(
                "Keypoint {} - {}: ({:.3}, {:.3}, {:.3}). Confidence score: {:.4}",
                idx + 1,
                name,
                lm.x,
                lm.y,
                lm.z,
                lm.confidence
            );
        }
    }

    fn stale_packet_rejected(&self, incoming: f64, latest: f64) {
        debug!(
            "Dropped stale upper-body packet (ts={:.3} < stored {:.3})",
            incoming, latest
        );
    }

    fn sync_observed(&self, observation: &SyncObservation) {
        info!(
            "Fusion workspace ready (upper ts={:.3}, camera ts={:.3}, delta={:.3}s)",
            observation.upper_timestamp, observation.lower_timestamp, observation.delta
        );
    }
}
