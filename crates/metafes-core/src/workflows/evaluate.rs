use crate::core::io::colvar::ColvarLog;
use crate::core::models::frame::{CvSample, Frame};
use crate::core::models::variable::{CollectiveVariable, evaluate_all};
use crate::engine::cancel::CancellationToken;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluates every variable on every frame, in frame order.
#[instrument(skip_all, name = "cv_evaluation_workflow")]
pub fn run(
    frames: &[Frame],
    variables: &[CollectiveVariable],
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<ColvarLog, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "CV Evaluation",
    });
    reporter.report(Progress::TaskStart {
        total_steps: frames.len() as u64,
    });
    cancel.check()?;

    let evaluate_frame = |frame: &Frame| {
        let values = evaluate_all(variables, &frame.positions).map_err(|(index, source)| {
            EngineError::Variable {
                name: variables[index].name.clone(),
                source,
            }
        });
        reporter.report(Progress::TaskAdvance { steps: 1 });
        values.map(|values| CvSample::new(frame.time, values))
    };

    let iterator = frames.iter();

    #[cfg(feature = "parallel")]
    let iterator = frames.par_iter();

    let samples = iterator
        .map(evaluate_frame)
        .collect::<Result<Vec<_>, _>>()?;

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);
    info!(frames = samples.len(), "Evaluated collective variables");

    Ok(ColvarLog::new(
        variables.iter().map(|cv| cv.name.clone()).collect(),
        samples,
    ))
}
