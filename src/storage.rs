use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::{TripError, TripResult};
use crate::geo_sampler::{GeoEvent, PositionSource, WatchId, WatchOptions};
use crate::live_status::TripSnapshot;
use crate::range::FuelState;
use crate::types::{PositionFix, SpeedSample};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TripLogMetadata {
    pub started_at: String,
    pub fuel: Option<FuelState>,
    pub fix_count: usize,
    pub sample_count: usize,
}

/// Recorded trip: every fix, the sampling window and the final snapshot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TripLog {
    pub metadata: TripLogMetadata,
    pub fixes: Vec<PositionFix>,
    pub samples: Vec<SpeedSample>,
    pub summary: Option<TripSnapshot>,
}

impl TripLog {
    pub fn new(fuel: Option<FuelState>) -> Self {
        Self {
            metadata: TripLogMetadata {
                started_at: chrono::Local::now().to_rfc3339(),
                fuel,
                fix_count: 0,
                sample_count: 0,
            },
            fixes: Vec::new(),
            samples: Vec::new(),
            summary: None,
        }
    }

    pub fn record_fix(&mut self, fix: PositionFix) {
        self.fixes.push(fix);
        self.metadata.fix_count = self.fixes.len();
    }

    pub fn finish(&mut self, samples: Vec<SpeedSample>, summary: TripSnapshot) {
        self.metadata.sample_count = samples.len();
        self.samples = samples;
        self.summary = Some(summary);
    }

    /// Write as JSON, gzip-compressed when the path ends in `.gz`
    pub fn save(&self, path: &Path) -> TripResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        log::info!(
            "Trip log saved: {} ({} fixes, {} samples)",
            path.display(),
            self.fixes.len(),
            self.samples.len()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> TripResult<Self> {
        let file = File::open(path)?;
        let log = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        Ok(log)
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Re-emits a recorded trip's fixes with their original spacing
///
/// `speedup` compresses time (2.0 replays twice as fast). After the last fix
/// the subscription stays open and silent, as a parked receiver would.
pub struct ReplaySource {
    fixes: Vec<PositionFix>,
    speedup: f64,
    next_id: u64,
    task: Option<(WatchId, JoinHandle<()>)>,
}

impl ReplaySource {
    pub fn new(fixes: Vec<PositionFix>, speedup: f64) -> Self {
        Self {
            fixes,
            speedup: if speedup > 0.0 { speedup } else { 1.0 },
            next_id: 0,
            task: None,
        }
    }

    pub fn from_log(log: &TripLog, speedup: f64) -> Self {
        Self::new(log.fixes.clone(), speedup)
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}

impl PositionSource for ReplaySource {
    fn watch(
        &mut self,
        _options: &WatchOptions,
        tx: UnboundedSender<GeoEvent>,
    ) -> TripResult<WatchId> {
        if self.fixes.is_empty() {
            return Err(TripError::PositionUnavailable(
                "replay log has no fixes".to_string(),
            ));
        }
        if let Some((id, _)) = &self.task {
            let id = *id;
            self.clear_watch(id);
        }

        self.next_id += 1;
        let id = WatchId(self.next_id);
        let fixes = self.fixes.clone();
        let speedup = self.speedup;

        let handle = tokio::spawn(async move {
            let mut previous_ts: Option<f64> = None;
            for fix in fixes {
                if let Some(prev) = previous_ts {
                    let gap = ((fix.timestamp - prev) / speedup).max(0.0);
                    tokio::time::sleep(Duration::from_secs_f64(gap)).await;
                }
                previous_ts = Some(fix.timestamp);
                if tx.send(GeoEvent::Fix(fix)).is_err() {
                    return;
                }
            }
            log::info!("[replay] end of log");
            tx.closed().await;
        });

        self.task = Some((id, handle));
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        if let Some((active, handle)) = self.task.take() {
            if active == id {
                handle.abort();
            } else {
                self.task = Some((active, handle));
            }
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fixes() -> Vec<PositionFix> {
        (0..4)
            .map(|i| PositionFix::new(12.0 + i as f64 * 0.001, 77.0, Some(12.5), 1000.0 + i as f64))
            .collect()
    }

    fn sample_log() -> TripLog {
        let mut log = TripLog::new(Some(FuelState::new(5.0, 44.0)));
        for fix in fixes() {
            log.record_fix(fix);
        }
        log.finish(
            vec![SpeedSample::new(45.0, 1000.0), SpeedSample::new(47.0, 1003.0)],
            TripSnapshot::new(),
        );
        log
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trip.json");
        let log = sample_log();
        log.save(&path).unwrap();

        let loaded = TripLog::load(&path).unwrap();
        assert_eq!(loaded, log);
        assert_eq!(loaded.metadata.fix_count, 4);
        assert_eq!(loaded.metadata.sample_count, 2);
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trip.json.gz");
        let log = sample_log();
        log.save(&path).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(TripLog::load(&path).unwrap(), log);
    }

    #[test]
    fn test_load_missing_is_storage_error() {
        let err = TripLog::load(Path::new("/nonexistent/trip.json")).unwrap_err();
        assert!(matches!(err, TripError::Storage(_)));
    }

    #[test]
    fn test_empty_replay_is_unavailable() {
        let mut source = ReplaySource::new(Vec::new(), 1.0);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            source.watch(&WatchOptions::default(), tx),
            Err(TripError::PositionUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_preserves_spacing() {
        let mut source = ReplaySource::new(fixes(), 2.0);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = source.watch(&WatchOptions::default(), tx).unwrap();

        let started = tokio::time::Instant::now();
        let mut received = Vec::new();
        for _ in 0..4 {
            match rx.recv().await {
                Some(GeoEvent::Fix(fix)) => received.push(fix.timestamp),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(received, vec![1000.0, 1001.0, 1002.0, 1003.0]);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));

        // Subscription stays open after the last fix
        let idle = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(idle.is_err());

        source.clear_watch(id);
        tokio::task::yield_now().await;
        assert!(rx.recv().await.is_none());
    }
}
