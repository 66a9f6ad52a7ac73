//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! - **Models** ([`models`]) - Collective variables, hill records, frames and CV samples
//! - **Kernel** ([`kernel`]) - Evaluation of truncated and exact Gaussian hills
//! - **Units** ([`units`]) - Energy unit conversion and the Boltzmann constant
//! - **File I/O** ([`io`]) - Hill logs, CV time series, XYZ trajectories and tables
//! - **Utilities** ([`utils`]) - Geometry and periodic arithmetic
//!
//! All energies inside the library are expressed in kJ/mol and temperatures in
//! Kelvin; conversion happens at the edges through [`units`].

pub mod io;
pub mod kernel;
pub mod models;
pub mod units;
pub mod utils;
