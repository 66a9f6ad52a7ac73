//! # Workflows
//!
//! Entry points that tie the engine components together.
//!
//! - [`session`]: a metadynamics run fed one frame at a time, with a
//!   thread-safe observer for live queries.
//! - [`replay`]: drives a session from a recorded trajectory.
//! - [`evaluate`]: collective variables of every frame of a trajectory.
//! - [`reconstruct`]: free energy from a saved hill log.
//! - [`sample`]: configuration sampling over saved CV and trajectory files.

pub mod evaluate;
pub mod reconstruct;
pub mod replay;
pub mod sample;
pub mod session;
