use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use screen_motion_common::config::Config;
use screen_motion_common::frame::{Frame, Region};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::filter::gate::{self, Timeline};
use crate::filter::mask::{self, MaskError, MaskedFrame};
use crate::filter::motion::{ClassifyError, MotionClassifier, MotionVerdict};
use crate::source::{capture_with_timeout, CaptureError, FrameSource};

use super::writer::ArtifactWriter;

enum LoopState {
    /// No baseline yet; the next capture only seeds it.
    Idle,
    /// Comparing every capture against the previous (masked) one.
    Watching { baseline: MaskedFrame },
}

/// What a single cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// First frame stored as baseline, nothing compared.
    Warmup,
    NoMotion(MotionVerdict),
    Motion {
        verdict: MotionVerdict,
        emission: Emission,
    },
}

/// What happened to the artifact of a positive verdict.
#[derive(Debug, PartialEq, Eq)]
pub enum Emission {
    Written(PathBuf),
    /// Suppressed by the minimum capture interval.
    Debounced,
    /// The write failed; the error has been logged.
    Failed(String),
}

#[derive(Debug)]
pub struct CycleReport {
    pub captured_at_ms: i64,
    pub duration: Duration,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    pub artifacts: u64,
}

/// Errors that stop the loop. Write failures are not among them.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Mask(#[from] MaskError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// Drives capture → mask → classify → gate → write, one frame per cycle.
pub struct MotionLoop<S: FrameSource> {
    state: LoopState,
    source: Arc<S>,
    monitor_index: usize,
    capture_timeout: Duration,
    poll_interval: Duration,
    ignore_regions: Vec<Region>,
    classifier: MotionClassifier,
    min_capture_interval: Duration,
    writer: Arc<ArtifactWriter>,
    timeline: Timeline,
    /// Gate time of the last admitted artifact, on `timeline`.
    last_emitted_ms: Option<i64>,
}

impl<S: FrameSource> MotionLoop<S> {
    pub fn new(source: Arc<S>, monitor_index: usize, config: &Config) -> Self {
        let detection = &config.detection;
        let ignored_outlines = if config.output.annotate_ignored {
            detection.ignore_regions.clone()
        } else {
            Vec::new()
        };

        Self {
            state: LoopState::Idle,
            source,
            monitor_index,
            capture_timeout: config.capture.timeout(),
            poll_interval: config.capture.poll_interval(),
            ignore_regions: detection.ignore_regions.clone(),
            classifier: MotionClassifier::new(
                u8::try_from(detection.threshold).unwrap_or(u8::MAX),
                detection.min_area,
                detection.dilate_radius,
            ),
            min_capture_interval: config.output.min_capture_interval(),
            writer: Arc::new(ArtifactWriter::new(
                config.output.directory.clone(),
                config.output.jpeg_quality,
                ignored_outlines,
            )),
            timeline: Timeline::default(),
            last_emitted_ms: None,
        }
    }

    /// Run one cycle. Errors returned here are fatal for the loop.
    pub async fn step(&mut self) -> Result<CycleReport, LoopError> {
        let started = Instant::now();

        let frame = capture_with_timeout(
            Arc::clone(&self.source),
            self.monitor_index,
            self.capture_timeout,
        )
        .await?;
        let captured_at_ms = frame.captured_at_ms();
        let gate_ms = self.timeline.advance(captured_at_ms);
        let current = mask::apply(&frame, &self.ignore_regions)?;

        let verdict = match &self.state {
            LoopState::Idle => None,
            LoopState::Watching { baseline } => {
                Some(self.classifier.classify(baseline, &current)?)
            }
        };

        let outcome = match verdict {
            None => {
                let (width, height) = current.dimensions();
                info!(width, height, ts = captured_at_ms, "first frame, storing baseline");
                CycleOutcome::Warmup
            }
            Some(verdict) if verdict.is_motion => {
                info!(
                    regions = verdict.regions.len(),
                    total_changed_area = verdict.total_changed_area,
                    largest = ?verdict.largest(),
                    ts = captured_at_ms,
                    "motion detected"
                );
                let emission = self.emit(frame, gate_ms, &verdict).await;
                CycleOutcome::Motion { verdict, emission }
            }
            Some(verdict) => CycleOutcome::NoMotion(verdict),
        };

        self.state = LoopState::Watching { baseline: current };

        Ok(CycleReport {
            captured_at_ms,
            duration: started.elapsed(),
            outcome,
        })
    }

    /// Apply the capture gate and, if admitted, write the artifact.
    ///
    /// The gate is advanced on admission even if the write then fails.
    async fn emit(&mut self, frame: Frame, gate_ms: i64, verdict: &MotionVerdict) -> Emission {
        let now_ms = frame.captured_at_ms();
        if !gate::admit(gate_ms, self.last_emitted_ms, self.min_capture_interval) {
            debug!(
                now_ms,
                gate_ms,
                last_emitted_ms = self.last_emitted_ms,
                min_interval_ms = self.min_capture_interval.as_millis() as u64,
                "capture suppressed by minimum interval"
            );
            return Emission::Debounced;
        }
        self.last_emitted_ms = Some(gate_ms);

        let writer = Arc::clone(&self.writer);
        let regions = verdict.regions.clone();
        match tokio::task::spawn_blocking(move || writer.write(&frame, &regions)).await {
            Ok(Ok(path)) => Emission::Written(path),
            Ok(Err(e)) => {
                error!(error = %e, ts = now_ms, "failed to save motion capture");
                Emission::Failed(e.to_string())
            }
            Err(e) => {
                error!(error = %e, ts = now_ms, "capture writer task failed");
                Emission::Failed(e.to_string())
            }
        }
    }

    /// Cycle until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation is checked between cycles, so a write in progress is
    /// always finished before this returns.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopSummary, LoopError> {
        info!(
            monitor = self.monitor_index,
            output_dir = self.writer.directory().display().to_string(),
            "entering motion loop"
        );
        let mut summary = LoopSummary::default();

        while !cancel.is_cancelled() {
            let report = self.step().await?;
            summary.cycles += 1;

            let took_ms = report.duration.as_millis() as u64;
            let ts = report.captured_at_ms;
            match &report.outcome {
                CycleOutcome::Warmup => debug!(took_ms, ts, "warm-up cycle"),
                CycleOutcome::NoMotion(verdict) => debug!(
                    took_ms,
                    ts,
                    total_changed_area = verdict.total_changed_area,
                    "no motion"
                ),
                CycleOutcome::Motion { verdict, emission } => {
                    if matches!(emission, Emission::Written(_)) {
                        summary.artifacts += 1;
                    }
                    debug!(took_ms, ts, regions = verdict.regions.len(), ?emission, "motion cycle");
                }
            }

            if !self.poll_interval.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(
            cycles = summary.cycles,
            artifacts = summary.artifacts,
            "motion loop stopped"
        );
        Ok(summary)
    }
}
