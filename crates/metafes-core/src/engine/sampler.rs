use super::config::{ConfigError, SamplerConfig};
use super::error::EngineError;
use super::series::{SampleSource, SourceError};
use crate::core::models::frame::{CvSample, Frame};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;
use tracing::{debug, warn};

/// Accepted interval of one collective variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CvBounds {
    pub lower: Bound<f64>,
    pub upper: Bound<f64>,
}

impl CvBounds {
    pub fn new(lower: Bound<f64>, upper: Bound<f64>) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn closed(lower: f64, upper: f64) -> Self {
        Self::new(Bound::Included(lower), Bound::Included(upper))
    }

    pub fn contains(&self, value: f64) -> bool {
        !value.is_nan() && RangeBounds::contains(self, &value)
    }
}

impl Default for CvBounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RangeBounds<f64> for CvBounds {
    fn start_bound(&self) -> Bound<&f64> {
        self.lower.as_ref()
    }

    fn end_bound(&self) -> Bound<&f64> {
        self.upper.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSample {
    pub frame_index: usize,
    pub time: f64,
    pub cv_values: Vec<f64>,
    pub frame: Arc<Frame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledConfigurations {
    /// Ordered by frame index.
    pub samples: Vec<ConfigurationSample>,
    /// Frames inside the bounds, before subsampling.
    pub matched: usize,
    /// Frames committed when the query started.
    pub considered: usize,
}

impl SampledConfigurations {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_indices(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.frame_index).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigurationSample> {
        self.samples.iter()
    }
}

/// Draws recorded frames whose collective variables fall inside given bounds.
#[derive(Debug, Clone)]
pub struct ConfigurationSampler<C, F> {
    cv_samples: C,
    frames: F,
    dimension: usize,
    config: SamplerConfig,
}

impl<C, F> ConfigurationSampler<C, F>
where
    C: SampleSource<CvSample>,
    F: SampleSource<Arc<Frame>>,
{
    /// # Arguments
    ///
    /// * `cv_samples` - Recorded CV values, one per frame and in frame order.
    /// * `frames` - The recorded frames.
    /// * `dimension` - Number of collective variables per sample.
    /// * `config` - Default seed and stale-read retry budget.
    pub fn new(cv_samples: C, frames: F, dimension: usize, config: SamplerConfig) -> Self {
        Self {
            cv_samples,
            frames,
            dimension,
            config,
        }
    }

    /// Up to `max_count` frames chosen uniformly without replacement among
    /// those inside `bounds`, or `None` if no committed frame matches.
    ///
    /// Only frames committed when the call starts are considered. Uses the
    /// configured seed, so equal inputs give equal draws.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigurationSampler::sample_with_seed`].
    pub fn sample(
        &self,
        bounds: &[CvBounds],
        max_count: usize,
    ) -> Result<Option<SampledConfigurations>, EngineError> {
        self.sample_with_seed(bounds, max_count, self.config.seed)
    }

    /// [`ConfigurationSampler::sample`] with an explicit seed.
    ///
    /// # Arguments
    ///
    /// * `bounds` - One interval per variable; a frame matches if every value
    ///   lies inside its interval.
    /// * `max_count` - Upper limit on the number of frames returned.
    /// * `seed` - Seed of the `StdRng` driving the draw.
    ///
    /// # Return
    ///
    /// `Ok(None)` if no committed frame matches. Otherwise the chosen frames
    /// ordered by index, with the match and candidate counts.
    ///
    /// # Errors
    ///
    /// * [`EngineError::Config`] if `max_count` is zero.
    /// * [`EngineError::DimensionMismatch`] if `bounds` or a recorded sample
    ///   has the wrong number of values.
    /// * [`EngineError::StaleQuery`] if a source closed before an item it
    ///   reported as committed became readable.
    pub fn sample_with_seed(
        &self,
        bounds: &[CvBounds],
        max_count: usize,
        seed: u64,
    ) -> Result<Option<SampledConfigurations>, EngineError> {
        if max_count == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_count".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if bounds.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                found: bounds.len(),
            });
        }

        let considered = self
            .cv_samples
            .committed_len()
            .min(self.frames.committed_len());

        let mut matches: Vec<(usize, CvSample)> = Vec::new();
        for i in 0..considered {
            let Some(sample) = self.fetch(&self.cv_samples, i)? else {
                continue;
            };
            if sample.values.len() != self.dimension {
                return Err(EngineError::DimensionMismatch {
                    expected: self.dimension,
                    found: sample.values.len(),
                });
            }
            if bounds
                .iter()
                .zip(&sample.values)
                .all(|(b, &v)| b.contains(v))
            {
                matches.push((i, sample));
            }
        }

        if matches.is_empty() {
            debug!(considered, "No recorded frame lies inside the requested bounds");
            return Ok(None);
        }

        let amount = max_count.min(matches.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut chosen = index::sample(&mut rng, matches.len(), amount).into_vec();
        chosen.sort_unstable();

        let mut samples = Vec::with_capacity(amount);
        for k in chosen {
            let (frame_index, cv) = &matches[k];
            let Some(frame) = self.fetch(&self.frames, *frame_index)? else {
                continue;
            };
            samples.push(ConfigurationSample {
                frame_index: *frame_index,
                time: cv.time,
                cv_values: cv.values.clone(),
                frame,
            });
        }

        debug!(
            considered,
            matched = matches.len(),
            returned = samples.len(),
            "Sampled configurations"
        );
        Ok(Some(SampledConfigurations {
            samples,
            matched: matches.len(),
            considered,
        }))
    }

    /// Reads one item, retrying while the source catches up.
    ///
    /// `Ok(None)` means the item stayed unavailable on an open source.
    fn fetch<T, S: SampleSource<T>>(&self, source: &S, i: usize) -> Result<Option<T>, EngineError> {
        let mut last_committed = 0;
        for _ in 0..=self.config.max_stale_retries {
            match source.get(i) {
                Ok(item) => return Ok(Some(item)),
                Err(SourceError::Stale {
                    requested,
                    committed,
                }) => {
                    if source.is_closed() {
                        return Err(EngineError::StaleQuery {
                            requested,
                            committed,
                        });
                    }
                    last_committed = committed;
                    std::thread::yield_now();
                }
            }
        }
        warn!(
            index = i,
            committed = last_committed,
            "Skipping an item that stayed uncommitted after retries"
        );
        Ok(None)
    }
}
