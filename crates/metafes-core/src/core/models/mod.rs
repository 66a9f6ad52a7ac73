//! Data models for collective-variable biased sampling.
//!
//! - [`variable`] - Collective variable definitions and their evaluation
//! - [`hill`] - Deposited Gaussian hills
//! - [`frame`] - Trajectory frames and collective-variable samples

pub mod frame;
pub mod hill;
pub mod variable;
