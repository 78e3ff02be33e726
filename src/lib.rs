//! Neural network gas optics and two-stream fluxes
//!
//! Gas optical properties are predicted per layer by small dense networks,
//! one trained below and one above the tropopause. The resulting optical
//! depths and sources feed a no-scattering longwave solver and a two-stream
//! shortwave solver, and the g-point fluxes are reduced to broadband or
//! per-band fluxes.
//!
//! NOTE: the Python bindings live in the `python` module and are only built
//! with the `python` feature. The other modules don't use `pyo3`.

pub mod error;
pub mod fluxes;
pub mod gas_concs;
pub mod gas_optics;
pub mod network;
pub mod optics;
pub mod rte;
pub mod solver;

#[cfg(feature = "python")]
mod python;

pub use error::{RadiationError, Result};
pub use fluxes::{FluxReduce, FluxesBroadband, FluxesByband};
pub use gas_concs::{GasConcs, VmrField};
pub use gas_optics::{GasOpticsNn, SolarSourceComponents};
pub use network::weights::WeightFile;
pub use optics::{OpticalProps1Scl, OpticalProps2Str, SourceFuncLw, SpectralDisc};
pub use rte::{expand_and_transpose, rte_lw, rte_sw};
pub use solver::{
    ColumnProfile, LongwaveBoundary, LongwaveSolution, RadiationSolverLongwave,
    RadiationSolverShortwave, ShortwaveBoundary, ShortwaveSolution, SolveOptions,
};
