//! Crash detection over a stream of impact samples.
//!
//! The sensor side pushes [`ImpactSample`]s into a channel; the detector
//! classifies each one and reports the first sample severe enough to start
//! an emergency countdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::severity::{ImpactSample, SeverityLevel, Thresholds};

/// How often the watch loop rechecks its stop flag while idle.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A sample that crossed the detection threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashSignal {
    /// The triggering sample.
    pub sample: ImpactSample,
    /// Its severity.
    pub severity: SeverityLevel,
}

/// Cloneable stop switch for a running detector.
#[derive(Debug, Clone, Default)]
pub struct DetectorHandle {
    stop_signal: Arc<AtomicBool>,
}

impl DetectorHandle {
    /// Create a handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the detector to stop.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Clear the stop flag so the detector can be reused.
    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }
}

/// Classifies samples against thresholds.
#[derive(Debug, Clone)]
pub struct CrashDetector {
    thresholds: Thresholds,
    min_severity: SeverityLevel,
}

impl CrashDetector {
    /// Detector that reports anything at or above MILD.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            min_severity: SeverityLevel::Mild,
        }
    }

    /// Only report samples at or above `min_severity`.
    #[must_use]
    pub fn with_min_severity(mut self, min_severity: SeverityLevel) -> Self {
        self.min_severity = min_severity;
        self
    }

    /// Thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Classify one sample; `Some` if it counts as a crash.
    #[must_use]
    pub fn assess(&self, sample: &ImpactSample) -> Option<CrashSignal> {
        let severity = sample.severity(&self.thresholds);
        (severity > SeverityLevel::None && severity >= self.min_severity).then(|| CrashSignal {
            sample: sample.clone(),
            severity,
        })
    }

    /// Consume samples until one is a crash, the channel closes, or `handle`
    /// is stopped.
    pub async fn watch(
        &self,
        samples: &mut mpsc::Receiver<ImpactSample>,
        handle: &DetectorHandle,
    ) -> Option<CrashSignal> {
        let mut seen: u64 = 0;
        while !handle.should_stop() {
            let sample = match tokio::time::timeout(STOP_POLL_INTERVAL, samples.recv()).await {
                Ok(Some(sample)) => sample,
                Ok(None) => {
                    debug!("Sample stream closed after {} sample(s)", seen);
                    return None;
                }
                Err(_) => continue,
            };
            seen += 1;

            if let Some(signal) = self.assess(&sample) {
                info!(
                    "Crash detected: force {:.1} classified {}",
                    sample.force_magnitude, signal.severity
                );
                return Some(signal);
            }
        }
        debug!("Detector stopped after {} sample(s)", seen);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_stop_and_reset() {
        let handle = DetectorHandle::new();
        let other = handle.clone();
        assert!(!handle.should_stop());

        other.stop();
        assert!(handle.should_stop());

        handle.reset();
        assert!(!other.should_stop());
    }

    #[test]
    fn test_assess_default_minimum() {
        let detector = CrashDetector::new(Thresholds::default());
        assert!(detector.assess(&ImpactSample::with_force(3.0)).is_none());
        let signal = detector.assess(&ImpactSample::with_force(20.0)).unwrap();
        assert_eq!(signal.severity, SeverityLevel::Moderate);
    }

    #[test]
    fn test_assess_custom_minimum() {
        let detector =
            CrashDetector::new(Thresholds::default()).with_min_severity(SeverityLevel::Severe);
        assert!(detector.assess(&ImpactSample::with_force(20.0)).is_none());
        assert!(detector.assess(&ImpactSample::with_force(40.0)).is_some());
    }

    #[test]
    fn test_none_minimum_still_ignores_quiet_samples() {
        let detector =
            CrashDetector::new(Thresholds::default()).with_min_severity(SeverityLevel::None);
        assert!(detector.assess(&ImpactSample::with_force(1.0)).is_none());
    }

    #[tokio::test]
    async fn test_watch_returns_first_crash() {
        let (tx, mut rx) = mpsc::channel(8);
        for force in [1.0, 2.5, 16.0, 50.0] {
            tx.send(ImpactSample::with_force(force)).await.unwrap();
        }

        let detector = CrashDetector::new(Thresholds::default());
        let signal = detector.watch(&mut rx, &DetectorHandle::new()).await.unwrap();
        assert_eq!(signal.severity, SeverityLevel::Moderate);
        assert!((signal.sample.force_magnitude - 16.0).abs() < f64::EPSILON);

        // The severe sample is still queued for the next watch
        let next = detector.watch(&mut rx, &DetectorHandle::new()).await.unwrap();
        assert_eq!(next.severity, SeverityLevel::Severe);
    }

    #[tokio::test]
    async fn test_watch_ends_when_stream_closes() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(ImpactSample::with_force(1.0)).await.unwrap();
        drop(tx);

        let detector = CrashDetector::new(Thresholds::default());
        assert!(detector.watch(&mut rx, &DetectorHandle::new()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_on_signal() {
        let (_tx, mut rx) = mpsc::channel::<ImpactSample>(8);
        let handle = DetectorHandle::new();
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.stop();
        });

        let detector = CrashDetector::new(Thresholds::default());
        assert!(detector.watch(&mut rx, &handle).await.is_none());
    }
}
