use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use anyhow::{Context, Result};

use super::LowerBodySource;
use crate::pose::snapshot::wall_clock_secs;
use crate::pose::PoseSnapshot;

/// Plays back recorded lower-body snapshots, one JSON record per line:
///
/// ```text
/// {"timestamp": 1718000000.5, "landmarks": {"left_knee": {"x": 0.1, "y": 0.4, "z": 0.0, "visibility": 0.97}}}
/// ```
pub struct ReplaySource<R = BufReader<File>> {
    lines: Lines<R>,
    line_no: usize,
    restamp: bool,
}

impl ReplaySource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, restamp: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file), restamp))
    }
}

impl<R: BufRead> ReplaySource<R> {
    /// `restamp` replaces recorded timestamps with the current wall clock,
    /// so replayed data lines up with live HMD packets.
    pub fn from_reader(reader: R, restamp: bool) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            restamp,
        }
    }
}

impl<R: BufRead + Send + 'static> LowerBodySource for ReplaySource<R> {
    fn next_snapshot(&mut self) -> Result<Option<PoseSnapshot>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.with_context(|| format!("read error at line {}", self.line_no))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let snapshot: PoseSnapshot = serde_json::from_str(line)
                .with_context(|| format!("invalid snapshot at line {}", self.line_no))?;
            let snapshot = if self.restamp {
                snapshot.restamped(wall_clock_secs())
            } else {
                snapshot
            };
            return Ok(Some(snapshot));
        }
        Ok(None)
    }
}
