//! # Engine Module
//!
//! Stateful machinery behind a metadynamics run: hill accumulation, bias lookup,
//! free-energy reconstruction and configuration retrieval.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run parameters assembled through a builder
//! - **Error Handling** ([`error`]) - Engine-wide error type
//! - **Snapshots** ([`snapshot`], [`log`]) - Single-writer publication of immutable state
//! - **Bias** ([`accumulator`], [`grid`]) - Hill deposition and exact or gridded lookup
//! - **Estimation** ([`estimator`]) - Free-energy surfaces and 1-D projections
//! - **Sampling** ([`series`], [`sampler`]) - Live sample logs and region queries
//! - **Run Control** ([`state`], [`cancel`], [`progress`]) - Lifecycle, cancellation and progress
//!
//! ## Concurrency
//!
//! Every stateful component has exactly one writer, which owns it mutably.
//! Readers obtain cloneable handles that hand out complete, versioned
//! snapshots; a reader never sees a partially applied deposit and never holds
//! a lock across a computation.

pub mod accumulator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod estimator;
pub mod grid;
pub mod log;
pub mod progress;
pub mod sampler;
pub mod series;
pub mod snapshot;
pub mod state;
