//! Per-image telemetry log.
//!
//! One CSV row per captured image, keyed by sequence number, in the
//! autopilot's native units. Downstream tools read it back with
//! [`load_telemetry_log`].

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::link::VehicleLink;

use super::snapshot::TelemetrySnapshot;

/// On-disk row layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TelemetryRecord {
    sequence_number: u64,
    timestamp_ms: u64,
    gps_fix_quality: u8,
    lat_e7: i32,
    lon_e7: i32,
    relative_alt_mm: i32,
    absolute_alt_mm: i32,
    pitch: f32,
    roll: f32,
    yaw: f32,
}

impl TelemetryRecord {
    fn new(sequence_number: u64, s: &TelemetrySnapshot) -> Self {
        Self {
            sequence_number,
            timestamp_ms: s.timestamp_ms,
            gps_fix_quality: s.gps_fix_quality,
            lat_e7: s.lat_e7,
            lon_e7: s.lon_e7,
            relative_alt_mm: s.relative_alt_mm,
            absolute_alt_mm: s.absolute_alt_mm,
            pitch: s.pitch,
            roll: s.roll,
            yaw: s.yaw,
        }
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp_ms: self.timestamp_ms,
            gps_fix_quality: self.gps_fix_quality,
            lat_e7: self.lat_e7,
            lon_e7: self.lon_e7,
            relative_alt_mm: self.relative_alt_mm,
            absolute_alt_mm: self.absolute_alt_mm,
            pitch: self.pitch,
            roll: self.roll,
            yaw: self.yaw,
        }
    }
}

/// Snapshots kept in memory, counted back from the newest image. Detection
/// results only ever refer to recent images; the CSV log keeps everything.
pub const DEFAULT_RETENTION: u64 = 1024;

/// Snapshots vehicle telemetry for each captured image.
pub struct TelemetryLogger {
    /// Source of telemetry; `None` runs unlinked and logs nothing.
    link: Option<Arc<dyn VehicleLink>>,

    /// CSV sink, absent for in-memory loggers.
    writer: Option<Writer<File>>,
    path: Option<PathBuf>,

    /// Recent snapshots by sequence number, pruned to `retention` entries
    /// behind the newest one.
    snapshots: BTreeMap<u64, TelemetrySnapshot>,
    retention: u64,
}

impl TelemetryLogger {
    /// Log to `path`, appending if the file already has rows.
    pub fn create<P: AsRef<Path>>(path: P, link: Option<Arc<dyn VehicleLink>>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open telemetry log {}", path.display()))?;
        let empty = file.metadata()?.len() == 0;
        let writer = WriterBuilder::new().has_headers(empty).from_writer(file);

        Ok(Self {
            link,
            writer: Some(writer),
            path: Some(path),
            snapshots: BTreeMap::new(),
            retention: DEFAULT_RETENTION,
        })
    }

    /// Keep snapshots in memory only.
    pub fn in_memory(link: Option<Arc<dyn VehicleLink>>) -> Self {
        Self {
            link,
            writer: None,
            path: None,
            snapshots: BTreeMap::new(),
            retention: DEFAULT_RETENTION,
        }
    }

    /// Keep only the last `retention` sequence numbers in memory.
    pub fn with_retention(mut self, retention: u64) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot the current telemetry for image `sequence_number`.
    ///
    /// Returns `None` without error when there is no link or the autopilot
    /// has not reported yet. A snapshot is written at most once per image.
    pub fn log_capture(&mut self, sequence_number: u64) -> Option<TelemetrySnapshot> {
        let snapshot = self.link.as_ref()?.read_telemetry()?;
        self.record(sequence_number, snapshot);
        self.snapshots.get(&sequence_number).copied()
    }

    /// Store a snapshot for `sequence_number` unless one already exists.
    pub fn record(&mut self, sequence_number: u64, snapshot: TelemetrySnapshot) {
        if self.snapshots.contains_key(&sequence_number) {
            warn!(sequence_number, "telemetry already logged for image, keeping first");
            return;
        }
        self.snapshots.insert(sequence_number, snapshot);
        self.prune();

        if let Some(writer) = self.writer.as_mut() {
            let row = TelemetryRecord::new(sequence_number, &snapshot);
            let written = writer
                .serialize(row)
                .and_then(|_| writer.flush().map_err(csv::Error::from));
            if let Err(e) = written {
                warn!(sequence_number, "failed to persist telemetry: {}", e);
            } else {
                debug!(sequence_number, "telemetry logged");
            }
        }
    }

    /// Drop snapshots older than the retention window.
    fn prune(&mut self) {
        let Some(&newest) = self.snapshots.keys().next_back() else {
            return;
        };
        let cutoff = newest.saturating_sub(self.retention - 1);
        if self.snapshots.keys().next().is_some_and(|&oldest| oldest < cutoff) {
            self.snapshots = self.snapshots.split_off(&cutoff);
        }
    }

    pub fn get(&self, sequence_number: u64) -> Option<&TelemetrySnapshot> {
        self.snapshots.get(&sequence_number)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Read a telemetry log written by [`TelemetryLogger`].
pub fn load_telemetry_log<P: AsRef<Path>>(path: P) -> Result<HashMap<u64, TelemetrySnapshot>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut entries = HashMap::new();
    for rec in rdr.deserialize() {
        let rec: TelemetryRecord = rec?;
        entries.insert(rec.sequence_number, rec.snapshot());
    }
    Ok(entries)
}
