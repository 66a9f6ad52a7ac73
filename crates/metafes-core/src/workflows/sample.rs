use crate::core::io::colvar::ColvarLog;
use crate::core::io::xyz::XyzTrajectory;
use crate::engine::config::{ConfigError, MetadynamicsConfig};
use crate::engine::error::EngineError;
use crate::engine::sampler::{ConfigurationSampler, CvBounds, SampledConfigurations};
use crate::engine::series::SeriesWriter;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Samples frames of a finished run from its CV time series and trajectory.
///
/// Rows are paired by position; the shorter of the two inputs limits the
/// frames considered.
#[instrument(skip_all, name = "sampling_workflow")]
pub fn run(
    colvar: ColvarLog,
    trajectory: XyzTrajectory,
    config: &MetadynamicsConfig,
    bounds: &[CvBounds],
    max_count: usize,
) -> Result<Option<SampledConfigurations>, EngineError> {
    let configured: Vec<&str> = config.variables.iter().map(|cv| cv.name.as_str()).collect();
    if colvar.names != configured {
        return Err(ConfigError::InvalidParameter {
            name: "variables".to_string(),
            reason: format!(
                "CV series columns {:?} do not match configured variables {:?}",
                colvar.names, configured
            ),
        }
        .into());
    }
    if colvar.samples.len() != trajectory.frames.len() {
        warn!(
            samples = colvar.samples.len(),
            frames = trajectory.frames.len(),
            "CV series and trajectory differ in length; sampling the common prefix"
        );
    }

    let cv_samples = SeriesWriter::from_items(colvar.samples);
    let frames = SeriesWriter::from_items(trajectory.frames.into_iter().map(Arc::new));
    let sampler = ConfigurationSampler::new(
        cv_samples.reader(),
        frames.reader(),
        config.dimension(),
        config.sampler,
    );
    let result = sampler.sample(bounds, max_count)?;
    match &result {
        Some(sampled) => info!(
            returned = sampled.len(),
            matched = sampled.matched,
            "Configurations sampled"
        ),
        None => info!("No frame lies inside the requested bounds"),
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::frame::{CvSample, Frame};
    use crate::core::models::variable::CollectiveVariable;
    use crate::engine::config::MetadynamicsConfigBuilder;
    use nalgebra::Point3;

    fn config() -> MetadynamicsConfig {
        MetadynamicsConfigBuilder::new()
            .variable(CollectiveVariable::distance("d", [0, 1], 0.1))
            .initial_height(1.0)
            .pace(1)
            .build()
            .unwrap()
    }

    fn inputs(count: usize) -> (ColvarLog, XyzTrajectory) {
        let samples = (0..count)
            .map(|i| CvSample::new(i as f64, vec![0.5 + 0.1 * i as f64]))
            .collect();
        let frames = (0..count)
            .map(|i| Frame::new(i as f64, vec![Point3::origin(), Point3::new(0.5 + 0.1 * i as f64, 0.0, 0.0)]))
            .collect();
        (
            ColvarLog::new(vec!["d".to_string()], samples),
            XyzTrajectory::new(vec!["C".to_string(), "C".to_string()], frames),
        )
    }

    #[test]
    fn samples_frames_inside_bounds() {
        let (colvar, trajectory) = inputs(10);
        let result = run(colvar, trajectory, &config(), &[CvBounds::closed(0.75, 1.05)], 10)
            .unwrap()
            .unwrap();
        assert_eq!(result.frame_indices(), vec![3, 4, 5]);
        for s in result.iter() {
            assert_eq!(s.frame.positions[1].x, s.cv_values[0]);
        }
    }

    #[test]
    fn column_names_must_match_configuration() {
        let (mut colvar, trajectory) = inputs(3);
        colvar.names = vec!["phi".to_string()];
        assert!(run(colvar, trajectory, &config(), &[CvBounds::unbounded()], 1).is_err());
    }

    #[test]
    fn shorter_input_limits_the_frames_considered() {
        let (colvar, mut trajectory) = inputs(6);
        trajectory.frames.truncate(4);
        let result = run(colvar, trajectory, &config(), &[CvBounds::unbounded()], 10)
            .unwrap()
            .unwrap();
        assert_eq!(result.considered, 4);
    }
}
