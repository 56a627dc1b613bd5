use chrono::Utc;
use log::{debug, error, info};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::LabError;
use crate::psu::PowerSupply;
use crate::storage::save_series;
use crate::types::{RecordBound, Sample, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Running,
    Flushing,
    Done,
}

/// Series that has not been persisted yet.
///
/// Dropping it without calling [`PendingSeries::flush`] (e.g. while unwinding
/// from a panic in the instrument driver) still writes it out.
struct PendingSeries<'a> {
    series: Series,
    destination: &'a Path,
    flushed: bool,
}

impl<'a> PendingSeries<'a> {
    fn new(destination: &'a Path) -> Self {
        Self {
            series: Series::new(destination.display().to_string()),
            destination,
            flushed: false,
        }
    }

    fn flush(&mut self) -> Result<(), LabError> {
        self.flushed = true;
        save_series(&self.series, self.destination)
    }

    fn into_series(mut self) -> Series {
        std::mem::replace(&mut self.series, Series::new(String::new()))
    }
}

impl Drop for PendingSeries<'_> {
    fn drop(&mut self) {
        if !self.flushed {
            if let Err(e) = self.flush() {
                error!("Emergency flush of {:?} failed: {}", self.destination, e);
            }
        }
    }
}

/// Periodically samples a power supply and persists the collected series
/// once recording stops.
pub struct SamplingRecorder<P: PowerSupply> {
    supply: P,
    token: CancellationToken,
    state: RecorderState,
}

impl<P: PowerSupply> SamplingRecorder<P> {
    pub fn new(supply: P, token: CancellationToken) -> Self {
        Self {
            supply,
            token,
            state: RecorderState::Idle,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Sample every `period` until `bound` elapses or the token is cancelled,
    /// then write the series to `destination` exactly once.
    ///
    /// The write happens on every exit path. If the instrument fails mid-run
    /// the partial series is still saved and the instrument error is returned.
    pub fn record(
        &mut self,
        destination: &Path,
        period: Duration,
        bound: RecordBound,
    ) -> Result<Series, LabError> {
        info!(
            "Recording to {:?} every {:.3} s, {}",
            destination,
            period.as_secs_f64(),
            bound
        );

        let mut pending = PendingSeries::new(destination);
        self.state = RecorderState::Running;
        let loop_result = self.acquire(&mut pending.series, period, bound);

        self.state = RecorderState::Flushing;
        let flush_result = pending.flush();
        self.state = RecorderState::Done;

        match (loop_result, flush_result) {
            (Ok(()), Ok(())) => Ok(pending.into_series()),
            (Ok(()), Err(e)) => {
                error!("Could not persist recording: {}", e);
                Err(e)
            }
            (Err(e), Ok(())) => {
                error!(
                    "Recording aborted after {} samples: {}",
                    pending.series.len(),
                    e
                );
                Err(e)
            }
            (Err(e), Err(flush_err)) => {
                error!("Recording aborted: {}; persisting also failed: {}", e, flush_err);
                Err(e)
            }
        }
    }

    fn acquire(
        &mut self,
        series: &mut Series,
        period: Duration,
        bound: RecordBound,
    ) -> Result<(), LabError> {
        let start = Instant::now();

        loop {
            if self.token.is_cancelled() {
                info!("Recording interrupted after {} samples", series.len());
                return Ok(());
            }

            let reading = self.supply.read()?;
            series.push(Sample::new(Utc::now(), reading));
            info!(
                "voltage_V={:.6},current_A={:.6}",
                reading.voltage_v, reading.current_a
            );

            let elapsed = start.elapsed();
            if bound.is_reached(elapsed) {
                debug!(
                    "Duration reached after {:.3} s with {} samples",
                    elapsed.as_secs_f64(),
                    series.len()
                );
                return Ok(());
            }

            if !period.is_zero() && self.token.sleep(period) {
                info!("Recording interrupted after {} samples", series.len());
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psu::PlaceholderSupply;
    use crate::storage::load_series;
    use crate::types::Reading;
    use tempfile::tempdir;

    /// Supply that cancels the session after a fixed number of reads
    struct CancelAfter {
        reads: usize,
        limit: usize,
        token: CancellationToken,
    }

    impl PowerSupply for CancelAfter {
        fn read(&mut self) -> Result<Reading, LabError> {
            self.reads += 1;
            if self.reads == self.limit {
                self.token.cancel();
            }
            Ok(Reading::new(self.reads as f64, 0.01))
        }
    }

    struct FailAfter {
        reads: usize,
        limit: usize,
    }

    impl PowerSupply for FailAfter {
        fn read(&mut self) -> Result<Reading, LabError> {
            if self.reads == self.limit {
                return Err(LabError::Instrument("serial port closed".to_string()));
            }
            self.reads += 1;
            Ok(Reading::new(5.0, 0.2))
        }
    }

    #[test]
    fn test_bounded_recording_persists_series() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bounded.json");
        let mut recorder =
            SamplingRecorder::new(PlaceholderSupply::default(), CancellationToken::new());

        let series = recorder
            .record(
                &path,
                Duration::from_millis(20),
                RecordBound::Bounded(Duration::from_millis(100)),
            )
            .unwrap();

        assert_eq!(recorder.state(), RecorderState::Done);
        assert!(series.len() >= 2);
        assert_eq!(load_series(&path).unwrap(), series);
    }

    #[test]
    fn test_cancellation_keeps_completed_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cancelled.json");
        let token = CancellationToken::new();
        let supply = CancelAfter {
            reads: 0,
            limit: 3,
            token: token.clone(),
        };
        let mut recorder = SamplingRecorder::new(supply, token);

        let series = recorder
            .record(&path, Duration::from_millis(5), RecordBound::Unbounded)
            .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.voltages(), vec![1.0, 2.0, 3.0]);
        assert_eq!(load_series(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_cancelled_before_start_writes_empty_series() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let token = CancellationToken::new();
        token.cancel();
        let mut recorder = SamplingRecorder::new(PlaceholderSupply::default(), token);

        let series = recorder
            .record(&path, Duration::ZERO, RecordBound::Unbounded)
            .unwrap();

        assert!(series.is_empty());
        assert!(load_series(&path).unwrap().is_empty());
    }

    #[test]
    fn test_instrument_failure_still_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("failed.json");
        let mut recorder = SamplingRecorder::new(
            FailAfter { reads: 0, limit: 2 },
            CancellationToken::new(),
        );

        let err = recorder
            .record(&path, Duration::ZERO, RecordBound::Unbounded)
            .unwrap_err();

        assert!(matches!(err, LabError::Instrument(_)));
        assert_eq!(recorder.state(), RecorderState::Done);
        assert_eq!(load_series(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_unwritable_destination_reports_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("run.json");
        let mut recorder =
            SamplingRecorder::new(PlaceholderSupply::default(), CancellationToken::new());

        let err = recorder
            .record(
                &path,
                Duration::ZERO,
                RecordBound::Bounded(Duration::from_millis(10)),
            )
            .unwrap_err();

        assert!(matches!(err, LabError::Storage { .. }));
        assert_eq!(recorder.state(), RecorderState::Done);
    }
}
