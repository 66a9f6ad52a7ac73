//! # metafes Core Library
//!
//! History-dependent Gaussian biasing over collective variables (metadynamics),
//! free-energy reconstruction from the accumulated bias, and retrieval of
//! representative configurations from regions of collective-variable space.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`CollectiveVariable`,
//!   `HillRecord`, `Frame`), geometry, the Gaussian kernel, energy units and the
//!   plain-text file formats exchanged with simulation engines.
//!
//! - **[`engine`]: The Logic Core.** Stateful components: the single-writer
//!   `BiasAccumulator` with its snapshot readers, the optional `BiasGrid`, the
//!   free-energy estimator, live sample logs and the configuration sampler.
//!
//! - **[`workflows`]: The Public API.** The `MetadynamicsSession` owned by the
//!   caller, plus complete procedures such as surface reconstruction from a hill
//!   log and replaying a recorded trajectory.

pub mod core;
pub mod engine;
pub mod workflows;
