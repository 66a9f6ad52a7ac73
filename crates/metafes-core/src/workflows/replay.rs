use super::session::{MetadynamicsSession, StepOutcome};
use crate::core::models::frame::{CvSample, Frame};
use crate::core::models::hill::HillRecord;
use crate::engine::cancel::CancellationToken;
use crate::engine::config::MetadynamicsConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    pub hills: Vec<HillRecord>,
    pub samples: Vec<CvSample>,
    /// Frames whose hill was refused by the boundary policy.
    pub rejected: usize,
}

/// Feeds a recorded trajectory through a fresh session, optionally seeded
/// with hills from an earlier run.
#[instrument(skip_all, name = "replay_workflow")]
pub fn run(
    frames: impl IntoIterator<Item = Frame>,
    config: MetadynamicsConfig,
    restart: Option<Vec<HillRecord>>,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<ReplayResult, EngineError> {
    let frames: Vec<Frame> = frames.into_iter().collect();
    let mut session = MetadynamicsSession::new(config);
    if let Some(records) = restart {
        session.restore_hills(records)?;
    }
    session.start()?;

    reporter.report(Progress::PhaseStart { name: "Replay" });
    reporter.report(Progress::TaskStart {
        total_steps: frames.len() as u64,
    });

    let mut rejected = 0;
    for frame in frames {
        if cancel.is_cancelled() {
            warn!("Replay cancelled; keeping hills deposited so far");
            session.finish()?;
            return Err(EngineError::Cancelled);
        }
        if let StepOutcome::Rejected(_) = session.record_frame(frame)? {
            rejected += 1;
        }
        reporter.report(Progress::TaskAdvance { steps: 1 });
    }
    session.finish()?;

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let observer = session.observer();
    let result = ReplayResult {
        hills: observer.hills(),
        samples: observer.cv_samples(),
        rejected,
    };
    info!(
        frames = result.samples.len(),
        hills = result.hills.len(),
        rejected,
        "Replay complete"
    );
    Ok(result)
}
