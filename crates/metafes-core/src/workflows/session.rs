use crate::core::io::hills::HillLog;
use crate::core::models::frame::{CvSample, Frame};
use crate::core::models::hill::HillRecord;
use crate::core::models::variable::evaluate_all;
use crate::engine::accumulator::{BiasAccumulator, BiasReader};
use crate::engine::cancel::CancellationToken;
use crate::engine::config::{ConfigError, MetadynamicsConfig, ViolationMode};
use crate::engine::error::EngineError;
use crate::engine::estimator::{FreeEnergyEstimator, FreeEnergySurface, Projection};
use crate::engine::grid::GridAxis;
use crate::engine::progress::ProgressReporter;
use crate::engine::sampler::{ConfigurationSampler, CvBounds, SampledConfigurations};
use crate::engine::series::{SampleSource, SeriesReader, SeriesWriter};
use crate::engine::snapshot::{Publisher, Subscriber};
use crate::engine::state::RunState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to a recorded frame.
#[derive(Debug)]
pub enum StepOutcome {
    Recorded,
    Deposited(HillRecord),
    /// The frame was kept but its hill was refused.
    Rejected(EngineError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CvQuery {
    Latest(Option<f64>),
    /// `(time, value)` pairs.
    Series(Vec<(f64, f64)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FreeEnergy {
    Surface(FreeEnergySurface),
    Projection(Projection),
}

impl FreeEnergy {
    /// Column headers and rows, one row per grid point with the free energy last.
    pub fn columns(&self) -> (Vec<String>, Vec<Vec<f64>>) {
        match self {
            FreeEnergy::Surface(surface) => {
                let mut headers = surface.names().to_vec();
                headers.push("free_energy".to_string());
                let rows = surface
                    .points()
                    .map(|(mut point, value)| {
                        point.push(value);
                        point
                    })
                    .collect();
                (headers, rows)
            }
            FreeEnergy::Projection(projection) => {
                let headers = vec![projection.name.clone(), "free_energy".to_string()];
                let rows = projection
                    .positions
                    .iter()
                    .zip(&projection.values)
                    .map(|(&s, &f)| vec![s, f])
                    .collect();
                (headers, rows)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub state: RunState,
    pub hills: usize,
    pub frames: usize,
    pub last_time: Option<f64>,
    pub bias_version: u64,
}

/// Read-only view of a session, usable from any thread.
///
/// Every query works on the latest published state and never blocks the
/// recording thread for longer than a pointer copy.
#[derive(Debug, Clone)]
pub struct SessionObserver {
    config: Arc<MetadynamicsConfig>,
    bias: BiasReader,
    cv_samples: SeriesReader<CvSample>,
    frames: SeriesReader<Arc<Frame>>,
    state: Subscriber<RunState>,
    reporter: ProgressReporter,
}

impl SessionObserver {
    pub fn config(&self) -> &MetadynamicsConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        let bias = self.bias.snapshot();
        SessionStatus {
            state: self.state.latest().value,
            hills: bias.value.hill_count(),
            frames: self.frames.committed_len(),
            last_time: self.cv_samples.last().map(|s| s.time),
            bias_version: bias.version,
        }
    }

    pub fn hills(&self) -> Vec<HillRecord> {
        self.bias.snapshot().value.hills().iter().cloned().collect()
    }

    pub fn hill_log(&self) -> HillLog {
        HillLog::for_variables(&self.config.variables, self.hills())
    }

    pub fn cv_samples(&self) -> Vec<CvSample> {
        self.cv_samples.to_vec()
    }

    pub fn get_collective_variable(
        &self,
        index: usize,
        time_series: bool,
    ) -> Result<CvQuery, EngineError> {
        let count = self.config.dimension();
        if index >= count {
            return Err(EngineError::IndexOutOfRange { index, count });
        }
        if time_series {
            Ok(CvQuery::Series(
                self.cv_samples
                    .to_vec()
                    .into_iter()
                    .map(|s| (s.time, s.values[index]))
                    .collect(),
            ))
        } else {
            Ok(CvQuery::Latest(
                self.cv_samples.last().map(|s| s.values[index]),
            ))
        }
    }

    /// The full surface on the default axes, or its projection onto `index`.
    ///
    /// `kt` defaults to the well-tempered temperature; a projection of a
    /// plain run needs it explicitly.
    pub fn get_free_energy(
        &self,
        index: Option<usize>,
        kt: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<FreeEnergy, EngineError> {
        let estimator = FreeEnergyEstimator::new(self.bias.clone());
        let axes = estimator.default_axes()?;
        self.free_energy_on(&axes, index, kt, cancel)
    }

    pub fn free_energy_on(
        &self,
        axes: &[GridAxis],
        index: Option<usize>,
        kt: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<FreeEnergy, EngineError> {
        if let Some(index) = index {
            let count = self.config.dimension();
            if index >= count {
                return Err(EngineError::IndexOutOfRange { index, count });
            }
        }
        let surface =
            FreeEnergyEstimator::new(self.bias.clone()).surface(axes, cancel, &self.reporter)?;
        match index {
            None => Ok(FreeEnergy::Surface(surface)),
            Some(index) => {
                let kt = kt
                    .or_else(|| self.config.well_tempered.map(|wt| wt.thermal_energy()))
                    .ok_or(ConfigError::MissingParameter("kt"))?;
                Ok(FreeEnergy::Projection(surface.project(index, kt)?))
            }
        }
    }

    pub fn sample_configurations(
        &self,
        bounds: &[CvBounds],
        max_count: usize,
    ) -> Result<Option<SampledConfigurations>, EngineError> {
        ConfigurationSampler::new(
            self.cv_samples.clone(),
            self.frames.clone(),
            self.config.dimension(),
            self.config.sampler,
        )
        .sample(bounds, max_count)
    }
}

/// A metadynamics run driven one frame at a time.
///
/// The session is the only writer of its bias and sample logs; readers use
/// [`MetadynamicsSession::observer`].
#[derive(Debug)]
pub struct MetadynamicsSession {
    config: Arc<MetadynamicsConfig>,
    accumulator: BiasAccumulator,
    cv_samples: SeriesWriter<CvSample>,
    frames: SeriesWriter<Arc<Frame>>,
    state: RunState,
    state_publisher: Publisher<RunState>,
    observer: SessionObserver,
}

impl MetadynamicsSession {
    pub fn new(config: MetadynamicsConfig) -> Self {
        let config = Arc::new(config);
        let accumulator = BiasAccumulator::new(&config);
        let cv_samples = SeriesWriter::new();
        let frames = SeriesWriter::new();
        let state_publisher = Publisher::new(RunState::Configured);
        let observer = SessionObserver {
            config: Arc::clone(&config),
            bias: accumulator.reader(),
            cv_samples: cv_samples.reader(),
            frames: frames.reader(),
            state: state_publisher.subscribe(),
            reporter: ProgressReporter::new(),
        };
        Self {
            config,
            accumulator,
            cv_samples,
            frames,
            state: RunState::Configured,
            state_publisher,
            observer,
        }
    }

    pub fn config(&self) -> &MetadynamicsConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn observer(&self) -> SessionObserver {
        self.observer.clone()
    }

    pub fn accumulator(&self) -> &BiasAccumulator {
        &self.accumulator
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(RunState::start)?;
        info!(
            variables = self.config.dimension(),
            pace = self.config.pace,
            well_tempered = self.config.well_tempered.is_some(),
            "Metadynamics run started"
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.transition(RunState::pause)
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.transition(RunState::resume)
    }

    pub fn finish(&mut self) -> Result<(), EngineError> {
        self.transition(RunState::finish)?;
        self.cv_samples.close();
        self.frames.close();
        info!(
            frames = self.frames.len(),
            hills = self.accumulator.hill_count(),
            "Metadynamics run finished"
        );
        Ok(())
    }

    fn transition(
        &mut self,
        step: fn(RunState) -> Result<RunState, EngineError>,
    ) -> Result<(), EngineError> {
        self.state = step(self.state)?;
        self.state_publisher.publish(self.state);
        Ok(())
    }

    /// Seeds the bias from a previous run's hills. Only allowed before the
    /// run starts or while it is paused.
    pub fn restore_hills(
        &mut self,
        records: impl IntoIterator<Item = HillRecord>,
    ) -> Result<usize, EngineError> {
        if !matches!(self.state, RunState::Configured | RunState::Paused) {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                action: "restore hills into",
            });
        }
        let count = self.accumulator.append_records(records)?;
        info!(count, "Restored hills from a previous run");
        Ok(count)
    }

    /// Evaluates every variable on `frame`, logs it, and deposits a hill on
    /// frames `0, pace, 2·pace, ...`.
    pub fn record_frame(&mut self, frame: Frame) -> Result<StepOutcome, EngineError> {
        if !self.state.accepts_frames() {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                action: "record a frame in",
            });
        }

        let values = evaluate_all(&self.config.variables, &frame.positions).map_err(
            |(index, source)| EngineError::Variable {
                name: self.config.variables[index].name.clone(),
                source,
            },
        )?;

        let frame_index = self.frames.len();
        let time = frame.time;
        self.cv_samples.push(CvSample::new(time, values.clone()));
        self.frames.push(Arc::new(frame));

        if frame_index % self.config.pace != 0 {
            return Ok(StepOutcome::Recorded);
        }

        match self.accumulator.deposit_at(time, &values) {
            Ok(hill) => {
                debug!(frame = frame_index, height = hill.height, "Deposited hill");
                Ok(StepOutcome::Deposited(hill))
            }
            Err(err @ EngineError::InvalidCvValue { .. }) => match self.config.violation {
                ViolationMode::Soft => {
                    warn!(frame = frame_index, "Hill rejected: {}", err);
                    Ok(StepOutcome::Rejected(err))
                }
                ViolationMode::Hard => {
                    warn!(frame = frame_index, "Finishing run after violation: {}", err);
                    self.finish()?;
                    Err(err)
                }
            },
            Err(err) => Err(err),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.observer.status()
    }

    pub fn get_collective_variable(
        &self,
        index: usize,
        time_series: bool,
    ) -> Result<CvQuery, EngineError> {
        self.observer.get_collective_variable(index, time_series)
    }

    pub fn get_free_energy(
        &self,
        index: Option<usize>,
        kt: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<FreeEnergy, EngineError> {
        self.observer.get_free_energy(index, kt, cancel)
    }

    pub fn sample_configurations(
        &self,
        bounds: &[CvBounds],
        max_count: usize,
    ) -> Result<Option<SampledConfigurations>, EngineError> {
        self.observer.sample_configurations(bounds, max_count)
    }

    pub fn hill_log(&self) -> HillLog {
        HillLog::for_variables(
            &self.config.variables,
            self.accumulator.hills().iter().cloned().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::variable::CollectiveVariable;
    use crate::engine::config::{MetadynamicsConfigBuilder, WellTemperedConfig};
    use nalgebra::Point3;
    use std::thread;

    /// Atoms 0-3 span a torsion of `phi`; atoms 1 and 4 are `d` apart.
    fn frame(time: f64, phi: f64, d: f64) -> Frame {
        Frame::new(
            time,
            vec![
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(phi.cos(), phi.sin(), 1.0),
                Point3::new(0.0, -d, 0.0),
            ],
        )
    }

    fn builder() -> MetadynamicsConfigBuilder {
        MetadynamicsConfigBuilder::new()
            .variable(CollectiveVariable::torsion("phi", [0, 1, 2, 3], 0.35))
            .variable(
                CollectiveVariable::distance("d", [1, 4], 0.1).with_bounds(Some(0.5), Some(2.0)),
            )
            .initial_height(1.0)
            .pace(3)
    }

    fn started(config: MetadynamicsConfig) -> MetadynamicsSession {
        let mut session = MetadynamicsSession::new(config);
        session.start().unwrap();
        session
    }

    #[test]
    fn frames_are_rejected_unless_running() {
        let mut session = MetadynamicsSession::new(builder().build().unwrap());
        assert!(matches!(
            session.record_frame(frame(0.0, 0.0, 1.0)),
            Err(EngineError::InvalidTransition {
                from: RunState::Configured,
                ..
            })
        ));
        session.start().unwrap();
        session.pause().unwrap();
        assert!(session.record_frame(frame(0.0, 0.0, 1.0)).is_err());
        session.resume().unwrap();
        assert!(session.record_frame(frame(0.0, 0.0, 1.0)).is_ok());
    }

    #[test]
    fn hills_are_deposited_every_pace_frames() {
        let mut session = started(builder().build().unwrap());
        let mut deposited = Vec::new();
        for i in 0..7 {
            let outcome = session.record_frame(frame(i as f64, 0.1 * i as f64, 1.0)).unwrap();
            if let StepOutcome::Deposited(hill) = outcome {
                deposited.push(hill.time);
            }
        }
        assert_eq!(deposited, vec![0.0, 3.0, 6.0]);
        let status = session.status();
        assert_eq!(status.hills, 3);
        assert_eq!(status.frames, 7);
        assert_eq!(status.last_time, Some(6.0));
        assert_eq!(status.state, RunState::Running);
    }

    #[test]
    fn soft_violation_keeps_frame_and_skips_hill() {
        let mut session = started(builder().pace(1).build().unwrap());
        let outcome = session.record_frame(frame(0.0, 0.0, 2.5)).unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Rejected(EngineError::InvalidCvValue { index: 1, .. })
        ));
        assert_eq!(session.status().frames, 1);
        assert_eq!(session.status().hills, 0);
        assert!(matches!(
            session.record_frame(frame(1.0, 0.0, 1.0)).unwrap(),
            StepOutcome::Deposited(_)
        ));
    }

    #[test]
    fn hard_violation_finishes_the_run() {
        let config = builder().pace(1).violation(ViolationMode::Hard).build().unwrap();
        let mut session = started(config);
        assert!(matches!(
            session.record_frame(frame(0.0, 0.0, 2.5)),
            Err(EngineError::InvalidCvValue { .. })
        ));
        assert_eq!(session.state(), RunState::Finished);
        assert!(session.record_frame(frame(1.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn frames_missing_atoms_report_the_variable() {
        let mut session = started(builder().build().unwrap());
        let short = Frame::new(0.0, vec![Point3::origin(); 3]);
        match session.record_frame(short) {
            Err(EngineError::Variable { name, .. }) => assert_eq!(name, "phi"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(session.status().frames, 0);
    }

    #[test]
    fn collective_variable_queries_return_latest_and_series() {
        let mut session = started(builder().build().unwrap());
        assert_eq!(
            session.get_collective_variable(1, false).unwrap(),
            CvQuery::Latest(None)
        );
        session.record_frame(frame(0.0, 0.5, 1.0)).unwrap();
        session.record_frame(frame(0.5, 0.6, 1.25)).unwrap();

        match session.get_collective_variable(0, false).unwrap() {
            CvQuery::Latest(Some(phi)) => assert!((phi - 0.6).abs() < 1e-9),
            other => panic!("unexpected result: {:?}", other),
        }
        match session.get_collective_variable(1, true).unwrap() {
            CvQuery::Series(series) => {
                assert_eq!(series.len(), 2);
                assert_eq!(series[1].0, 0.5);
                assert!((series[1].1 - 1.25).abs() < 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            session.get_collective_variable(2, false),
            Err(EngineError::IndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn projection_requires_kt_unless_well_tempered() {
        let mut session = started(builder().pace(1).build().unwrap());
        session.record_frame(frame(0.0, 0.0, 1.0)).unwrap();
        let cancel = CancellationToken::new();
        assert!(matches!(
            session.get_free_energy(Some(0), None, &cancel),
            Err(EngineError::Config(ConfigError::MissingParameter("kt")))
        ));
        assert!(matches!(
            session.get_free_energy(Some(0), Some(2.5), &cancel).unwrap(),
            FreeEnergy::Projection(_)
        ));

        let wt = WellTemperedConfig {
            bias_factor: 10.0,
            temperature: 300.0,
        };
        let mut session = started(builder().pace(1).well_tempered(Some(wt)).build().unwrap());
        session.record_frame(frame(0.0, 0.0, 1.0)).unwrap();
        assert!(session.get_free_energy(Some(1), None, &cancel).is_ok());
    }

    #[test]
    fn free_energy_columns_end_with_the_energy() {
        let mut session = started(builder().pace(1).build().unwrap());
        session.record_frame(frame(0.0, 0.0, 1.0)).unwrap();
        let fes = session
            .get_free_energy(None, None, &CancellationToken::new())
            .unwrap();
        let (headers, rows) = fes.columns();
        assert_eq!(headers, vec!["phi", "d", "free_energy"]);
        assert_eq!(rows.len(), 100 * 101);
        assert!(rows.iter().all(|row| row.len() == 3));
        assert!(rows.iter().any(|row| row[2] == 0.0));
    }

    #[test]
    fn full_bounds_sample_returns_every_recorded_frame() {
        let mut session = started(builder().build().unwrap());
        for i in 0..12 {
            session
                .record_frame(frame(i as f64, -1.0 + 0.15 * i as f64, 0.6 + 0.1 * i as f64))
                .unwrap();
        }
        let result = session
            .sample_configurations(&[CvBounds::unbounded(); 2], 100)
            .unwrap()
            .unwrap();
        assert_eq!(result.len(), 12);
        assert!(
            session
                .sample_configurations(&[CvBounds::closed(3.0, 3.1), CvBounds::unbounded()], 5)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn observer_tracks_a_session_recording_on_another_thread() {
        let mut session = started(builder().pace(1).build().unwrap());
        let observer = session.observer();
        let writer = thread::spawn(move || {
            for i in 0..50 {
                session
                    .record_frame(frame(i as f64, 0.02 * i as f64, 1.0))
                    .unwrap();
            }
            session.finish().unwrap();
            session
        });

        let mut last_hills = 0;
        loop {
            let status = observer.status();
            assert!(status.hills >= last_hills);
            last_hills = status.hills;
            if status.state == RunState::Finished {
                break;
            }
            thread::yield_now();
        }
        let session = writer.join().unwrap();
        assert_eq!(observer.status().hills, 50);
        assert_eq!(observer.hills(), session.hill_log().records);
    }

    #[test]
    fn restore_hills_is_refused_while_running() {
        let mut session = MetadynamicsSession::new(builder().build().unwrap());
        let hill = HillRecord::new(0.0, vec![0.0, 1.0], vec![0.35, 0.1], 1.0);
        assert_eq!(session.restore_hills(vec![hill.clone()]).unwrap(), 1);
        session.start().unwrap();
        assert!(session.restore_hills(vec![hill]).is_err());
        assert_eq!(session.status().hills, 1);
    }
}
