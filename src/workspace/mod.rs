//! Shared state between the upper-body listener and lower-body producers.
//!
//! Each source has one slot holding an `Arc` to an immutable value. An update
//! swaps the pointer under a short `parking_lot` lock, so readers only ever
//! see a complete value. Diagnostics are reported to [`WorkspaceObserver`]s
//! after the lock is released.

pub mod observer;

pub use observer::{LoggingObserver, WorkspaceObserver};

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::{StalenessPolicy, WorkspaceConfig};
use crate::pose::{PoseSnapshot, UpperBodyPacket};

/// Point-in-time timestamp offset between the two latest snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncObservation {
    pub upper_timestamp: f64,
    pub lower_timestamp: f64,
    /// `lower_timestamp - upper_timestamp`, seconds
    pub delta: f64,
}

impl SyncObservation {
    pub fn between(upper: &UpperBodyPacket, lower: &PoseSnapshot) -> Self {
        let upper_timestamp = upper.timestamp();
        let lower_timestamp = lower.timestamp();
        Self {
            upper_timestamp,
            lower_timestamp,
            delta: lower_timestamp - upper_timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpperBodyUpdate {
    pub accepted: bool,
    pub sync: Option<SyncObservation>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowerBodyUpdate {
    /// Lower-body calls since startup, this one included
    pub sequence: u64,
    /// Whether this call hit the diagnostic sampling interval
    pub sampled: bool,
    pub sync: Option<SyncObservation>,
}

/// Which sources currently hold a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Empty,
    UpperOnly,
    LowerOnly,
    Ready,
}

#[derive(Default)]
struct LowerBodySlot {
    latest: Option<Arc<PoseSnapshot>>,
    updates: u64,
}

pub struct FusionWorkspace {
    upper: Mutex<Option<Arc<UpperBodyPacket>>>,
    lower: Mutex<LowerBodySlot>,
    config: WorkspaceConfig,
    observers: Vec<Arc<dyn WorkspaceObserver>>,
}

impl FusionWorkspace {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            upper: Mutex::new(None),
            lower: Mutex::new(LowerBodySlot::default()),
            config,
            observers: Vec::new(),
        }
    }

    /// Workspace that reports through [`LoggingObserver`].
    pub fn with_logging(config: WorkspaceConfig) -> Self {
        Self::new(config).with_observer(Arc::new(LoggingObserver))
    }

    pub fn with_observer(mut self, observer: Arc<dyn WorkspaceObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the latest upper-body packet.
    pub fn update_upper_body(&self, packet: UpperBodyPacket, addr: SocketAddr) -> UpperBodyUpdate {
        let packet = Arc::new(packet);
        let incoming = packet.has_timestamp().then(|| packet.timestamp());

        let stale_against = {
            let mut slot = self.upper.lock();
            let stored = slot
                .as_ref()
                .and_then(|current| current.has_timestamp().then(|| current.timestamp()));
            match stored.filter(|&latest| self.rejects(incoming, latest)) {
                Some(latest) => Some(latest),
                None => {
                    *slot = Some(Arc::clone(&packet));
                    None
                }
            }
        };

        if let Some(latest) = stale_against {
            self.notify(|o| o.stale_packet_rejected(packet.timestamp(), latest));
            return UpperBodyUpdate {
                accepted: false,
                sync: None,
            };
        }

        self.notify(|o| o.upper_body_accepted(&packet, addr));
        let sync = self
            .latest_lower_body()
            .filter(|_| packet.is_populated())
            .map(|lower| SyncObservation::between(&packet, &lower));
        self.report_sync(sync);

        UpperBodyUpdate {
            accepted: true,
            sync,
        }
    }

    /// Replace the latest lower-body snapshot. Always stored, whatever the
    /// staleness policy; producers own their ordering.
    pub fn update_lower_body(&self, snapshot: PoseSnapshot) -> LowerBodyUpdate {
        let snapshot = Arc::new(snapshot);

        let sequence = {
            let mut slot = self.lower.lock();
            slot.updates += 1;
            slot.latest = Some(Arc::clone(&snapshot));
            slot.updates
        };

        let sampled = sequence % self.config.sample_every.max(1) == 0;
        if sampled {
            self.notify(|o| o.lower_body_sampled(&snapshot, sequence));
        }

        let sync = self
            .latest_upper_body()
            .filter(|upper| upper.is_populated())
            .map(|upper| SyncObservation::between(&upper, &snapshot));
        self.report_sync(sync);

        LowerBodyUpdate {
            sequence,
            sampled,
            sync,
        }
    }

    pub fn latest_upper_body(&self) -> Option<Arc<UpperBodyPacket>> {
        self.upper.lock().clone()
    }

    pub fn latest_lower_body(&self) -> Option<Arc<PoseSnapshot>> {
        self.lower.lock().latest.clone()
    }

    /// Number of `update_lower_body` calls since construction.
    pub fn lower_body_updates(&self) -> u64 {
        self.lower.lock().updates
    }

    pub fn state(&self) -> WorkspaceState {
        let upper = self.upper.lock().is_some();
        let lower = self.lower.lock().latest.is_some();
        match (upper, lower) {
            (false, false) => WorkspaceState::Empty,
            (true, false) => WorkspaceState::UpperOnly,
            (false, true) => WorkspaceState::LowerOnly,
            (true, true) => WorkspaceState::Ready,
        }
    }

    /// Offset between the current latest values, if both exist.
    ///
    /// An upper-body packet that decoded to an empty object (or to no object
    /// at all) carries nothing to compare, and does not count.
    pub fn sync_observation(&self) -> Option<SyncObservation> {
        let upper = self.latest_upper_body().filter(|p| p.is_populated())?;
        let lower = self.latest_lower_body()?;
        Some(SyncObservation::between(&upper, &lower))
    }

    /// Listener handler feeding decoded datagrams into [`Self::update_upper_body`].
    pub fn packet_handler(
        self: &Arc<Self>,
    ) -> impl FnMut(Value, SocketAddr) -> anyhow::Result<()> + Send + 'static {
        let workspace = Arc::clone(self);
        move |payload, addr| {
            workspace.update_upper_body(UpperBodyPacket::from_value(payload), addr);
            Ok(())
        }
    }

    fn rejects(&self, incoming: Option<f64>, latest: f64) -> bool {
        match (self.config.staleness, incoming) {
            (StalenessPolicy::RejectOlder, Some(ts)) => ts < latest,
            _ => false,
        }
    }

    fn report_sync(&self, sync: Option<SyncObservation>) {
        if let Some(observation) = sync {
            self.notify(|o| o.sync_observed(&observation));
        }
    }

    fn notify<F: Fn(&dyn WorkspaceObserver)>(&self, f: F) {
        for observer in &self.observers {
            f(observer.as_ref());
        }
    }
}

impl Default for FusionWorkspace {
    fn default() -> Self {
        Self::new(WorkspaceConfig::default())
    }
}

impl fmt::Debug for FusionWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusionWorkspace")
            .field("state", &self.state())
            .field("lower_body_updates", &self.lower_body_updates())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Upper(f64),
        Sampled(u64),
        Stale(f64),
        Sync(f64),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl WorkspaceObserver for Recorder {
        fn upper_body_accepted(&self, packet: &UpperBodyPacket, _addr: SocketAddr) {
            self.events.lock().push(Event::Upper(packet.timestamp()));
        }
        fn lower_body_sampled(&self, _snapshot: &PoseSnapshot, sequence: u64) {
            self.events.lock().push(Event::Sampled(sequence));
        }
        fn stale_packet_rejected(&self, incoming: f64, _latest: f64) {
            self.events.lock().push(Event::Stale(incoming));
        }
        fn sync_observed(&self, observation: &SyncObservation) {
            self.events.lock().push(Event::Sync(observation.delta));
        }
    }

    fn addr() -> SocketAddr {
        "192.168.0.42:50000".parse().unwrap()
    }

    fn upper(ts: f64) -> UpperBodyPacket {
        UpperBodyPacket::from_value(json!({
            "timestamp": ts,
            "joints": [{"name": "Head", "pose": {"position": {"x": 0.0, "y": 1.7, "z": 0.0}}}]
        }))
    }

    fn lower(ts: f64) -> PoseSnapshot {
        PoseSnapshot::from_landmarks(ts, [("left_ankle", Landmark::new(0.1, 0.9, 0.0, 0.8))])
    }

    fn recorded(config: WorkspaceConfig) -> (FusionWorkspace, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let ws = FusionWorkspace::new(config).with_observer(recorder.clone());
        (ws, recorder)
    }

    #[test]
    fn test_state_transitions() {
        let ws = FusionWorkspace::default();
        assert_eq!(ws.state(), WorkspaceState::Empty);
        ws.update_upper_body(upper(1.0), addr());
        assert_eq!(ws.state(), WorkspaceState::UpperOnly);

        let ws = FusionWorkspace::default();
        ws.update_lower_body(lower(1.0));
        assert_eq!(ws.state(), WorkspaceState::LowerOnly);
        ws.update_upper_body(upper(1.0), addr());
        assert_eq!(ws.state(), WorkspaceState::Ready);
    }

    #[test]
    fn test_upper_body_stored_as_decoded() {
        let ws = FusionWorkspace::default();
        let value = json!({"timestamp": 3.0, "hmd": {"position": {"x": 1}}, "extra": [1, 2]});
        ws.update_upper_body(UpperBodyPacket::from_value(value.clone()), addr());
        let latest = ws.latest_upper_body().unwrap();
        assert_eq!(latest.raw(), &value);
    }

    #[test]
    fn test_lower_body_round_trip() {
        let ws = FusionWorkspace::default();
        let snap = PoseSnapshot::from_landmarks(4.0, [("nose", Landmark::new(1.0, 2.0, 3.0, 0.9))]);
        ws.update_lower_body(snap.clone());
        let latest = ws.latest_lower_body().unwrap();
        assert_eq!(*latest, snap);
        assert_eq!(latest.get("nose"), Some(&Landmark::new(1.0, 2.0, 3.0, 0.9)));
    }

    #[test]
    fn test_last_write_wins_by_arrival() {
        let ws = FusionWorkspace::default();
        ws.update_upper_body(upper(20.0), addr());
        let report = ws.update_upper_body(upper(10.0), addr());
        assert!(report.accepted);
        assert_eq!(ws.latest_upper_body().unwrap().timestamp(), 10.0);

        ws.update_lower_body(lower(20.0));
        ws.update_lower_body(lower(10.0));
        assert_eq!(ws.latest_lower_body().unwrap().timestamp(), 10.0);
    }

    #[test]
    fn test_sync_delta_after_lower_update() {
        let (ws, rec) = recorded(WorkspaceConfig::default());
        ws.update_upper_body(upper(10.0), addr());
        let report = ws.update_lower_body(lower(10.25));

        let sync = report.sync.expect("both sources present");
        assert_eq!(sync.upper_timestamp, 10.0);
        assert_eq!(sync.lower_timestamp, 10.25);
        assert!((sync.delta - 0.25).abs() < 1e-9);
        assert_eq!(rec.take(), vec![Event::Upper(10.0), Event::Sync(sync.delta)]);
    }

    #[test]
    fn test_sync_delta_after_upper_update() {
        let ws = FusionWorkspace::default();
        ws.update_lower_body(lower(5.0));
        let report = ws.update_upper_body(upper(5.5), addr());
        let sync = report.sync.unwrap();
        assert!((sync.delta + 0.5).abs() < 1e-9);
        assert_eq!(ws.sync_observation(), Some(sync));
    }

    #[test]
    fn test_no_sync_when_one_side_missing() {
        let (ws, rec) = recorded(WorkspaceConfig::default());
        assert!(ws.update_upper_body(upper(1.0), addr()).sync.is_none());
        assert!(ws.sync_observation().is_none());

        let ws2 = FusionWorkspace::default();
        assert!(ws2.update_lower_body(lower(1.0)).sync.is_none());
        assert!(!rec.take().iter().any(|e| matches!(e, Event::Sync(_))));
    }

    #[test]
    fn test_sync_uses_zero_for_missing_upper_timestamp() {
        let ws = FusionWorkspace::default();
        ws.update_upper_body(UpperBodyPacket::from_value(json!({"hmd": {}})), addr());
        let sync = ws.update_lower_body(lower(2.0)).sync.unwrap();
        assert_eq!(sync.upper_timestamp, 0.0);
        assert_eq!(sync.delta, 2.0);
    }

    #[test]
    fn test_no_sync_for_empty_upper_body_packet() {
        let (ws, rec) = recorded(WorkspaceConfig::default());
        ws.update_upper_body(UpperBodyPacket::from_value(json!({})), addr());
        assert_eq!(ws.update_lower_body(lower(7.0)).sync, None);
        assert_eq!(ws.sync_observation(), None);
        assert_eq!(ws.state(), WorkspaceState::Ready);

        let ws = FusionWorkspace::default();
        ws.update_lower_body(lower(7.0));
        assert_eq!(ws.update_upper_body(UpperBodyPacket::from_value(json!([1, 2])), addr()).sync, None);
        assert!(!rec.take().iter().any(|e| matches!(e, Event::Sync(_))));
    }

    #[test]
    fn test_counter_counts_every_call() {
        let ws = FusionWorkspace::default();
        assert_eq!(ws.lower_body_updates(), 0);
        for i in 0..7 {
            let report = ws.update_lower_body(lower(i as f64));
            assert_eq!(report.sequence, i + 1);
        }
        assert_eq!(ws.lower_body_updates(), 7);
    }

    #[test]
    fn test_sampling_every_sixtieth_call() {
        let (ws, rec) = recorded(WorkspaceConfig::default());
        let mut sampled = Vec::new();
        for i in 1..=125u64 {
            let report = ws.update_lower_body(lower(i as f64));
            if report.sampled {
                sampled.push(report.sequence);
            }
        }
        assert_eq!(sampled, vec![60, 120]);
        let events = rec.take();
        assert_eq!(events, vec![Event::Sampled(60), Event::Sampled(120)]);
    }

    #[test]
    fn test_sampling_interval_configurable() {
        let config = WorkspaceConfig {
            sample_every: 3,
            ..WorkspaceConfig::default()
        };
        let ws = FusionWorkspace::new(config);
        let sampled: Vec<bool> = (0..6).map(|i| ws.update_lower_body(lower(i as f64)).sampled).collect();
        assert_eq!(sampled, vec![false, false, true, false, false, true]);

        // zero is treated as "every call"
        let ws = FusionWorkspace::new(WorkspaceConfig {
            sample_every: 0,
            ..WorkspaceConfig::default()
        });
        assert!(ws.update_lower_body(lower(0.0)).sampled);
    }

    #[test]
    fn test_reject_older_policy() {
        let config = WorkspaceConfig {
            staleness: StalenessPolicy::RejectOlder,
            ..WorkspaceConfig::default()
        };
        let (ws, rec) = recorded(config);

        assert!(ws.update_upper_body(upper(20.0), addr()).accepted);
        let report = ws.update_upper_body(upper(10.0), addr());
        assert!(!report.accepted);
        assert!(report.sync.is_none());
        assert_eq!(ws.latest_upper_body().unwrap().timestamp(), 20.0);

        // equal timestamps are not older
        assert!(ws.update_upper_body(upper(20.0), addr()).accepted);

        let events = rec.take();
        assert!(events.contains(&Event::Stale(10.0)));
    }

    #[test]
    fn test_reject_older_still_stores_every_lower_body_snapshot() {
        let (ws, rec) = recorded(WorkspaceConfig {
            staleness: StalenessPolicy::RejectOlder,
            ..WorkspaceConfig::default()
        });
        ws.update_lower_body(lower(30.0));
        let report = ws.update_lower_body(lower(25.0));
        assert_eq!(report.sequence, 2);
        assert_eq!(ws.latest_lower_body().unwrap().timestamp(), 25.0);
        assert_eq!(ws.lower_body_updates(), 2);
        assert!(!rec.take().iter().any(|e| matches!(e, Event::Stale(_))));
    }

    #[test]
    fn test_reject_older_ignores_packets_without_timestamp() {
        let ws = FusionWorkspace::new(WorkspaceConfig {
            staleness: StalenessPolicy::RejectOlder,
            ..WorkspaceConfig::default()
        });
        ws.update_upper_body(upper(20.0), addr());
        let report = ws.update_upper_body(UpperBodyPacket::from_value(json!({})), addr());
        assert!(report.accepted);
        assert!(ws.update_upper_body(upper(1.0), addr()).accepted);
    }

    #[test]
    fn test_packet_handler_updates_upper_body() {
        let ws = Arc::new(FusionWorkspace::default());
        let mut handler = ws.packet_handler();
        let value = json!({"timestamp": 7.0});
        handler(value.clone(), addr()).unwrap();
        assert_eq!(ws.latest_upper_body().unwrap().raw(), &value);
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        const WRITES: u64 = 2_000;
        let ws = Arc::new(FusionWorkspace::default());

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..WRITES {
                    let ts = i as f64;
                    // every field of a write carries the same value
                    ws.update_upper_body(
                        UpperBodyPacket::from_value(json!({
                            "timestamp": ts,
                            "hmd": {"position": {"x": ts, "y": ts, "z": ts}}
                        })),
                        addr(),
                    );
                }
            });
            for _ in 0..2 {
                s.spawn(|| {
                    for i in 0..WRITES {
                        let v = i as f64;
                        ws.update_lower_body(PoseSnapshot::from_landmarks(
                            v,
                            [
                                ("left_knee", Landmark::new(v, v, v, v)),
                                ("right_knee", Landmark::new(v, v, v, v)),
                            ],
                        ));
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..WRITES {
                    if let Some(p) = ws.latest_upper_body() {
                        let pos = p.hmd().position;
                        assert_eq!(pos.x, p.timestamp());
                        assert_eq!(pos.y, p.timestamp());
                        assert_eq!(pos.z, p.timestamp());
                    }
                    if let Some(snap) = ws.latest_lower_body() {
                        for lm in snap.landmarks().values() {
                            assert_eq!(lm.x, snap.timestamp());
                            assert_eq!(lm.confidence, snap.timestamp());
                        }
                    }
                }
            });
        });

        assert_eq!(ws.lower_body_updates(), 2 * WRITES);
        assert_eq!(ws.state(), WorkspaceState::Ready);
    }
}
