//! End-to-end radiation solvers
//!
//! A solver owns a [`GasOpticsNn`] and runs gas optics followed by the flux
//! solver for one set of columns, returning the fluxes and, on request, the
//! intermediate optical properties and per-band fluxes.

use std::path::Path;

use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{check_shape, RadiationError, Result};
use crate::fluxes::{FluxReduce, FluxesBroadband, FluxesByband};
use crate::gas_concs::GasConcs;
use crate::gas_optics::{GasOpticsNn, SolarSourceComponents};
use crate::optics::{OpticalProps1Scl, OpticalProps2Str, SourceFuncLw, SpectralDisc};
use crate::rte::{rte_lw, rte_sw};

/// Which optional outputs a solve should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveOptions {
    /// Return the optical properties and sources computed by gas optics.
    pub output_optical: bool,
    /// Return fluxes per band as well as broadband.
    pub output_bnd_fluxes: bool,
}

/// The atmospheric state of a set of columns.
#[derive(Debug, Clone, Copy)]
pub struct ColumnProfile<'a> {
    /// Layer pressure in Pa, dimensioned as (`ncol`, `nlay`).
    pub play: ArrayView2<'a, f64>,
    /// Level pressure in Pa, dimensioned as (`ncol`, `nlev`).
    pub plev: ArrayView2<'a, f64>,
    /// Layer temperature in K, dimensioned as (`ncol`, `nlay`).
    pub tlay: ArrayView2<'a, f64>,
    /// Level temperature in K, dimensioned as (`ncol`, `nlev`); interpolated
    /// from `tlay` if absent.
    pub tlev: Option<ArrayView2<'a, f64>>,
    /// Dry air molecules per cm², dimensioned as (`ncol`, `nlay`); computed
    /// from `plev` and water vapor if absent.
    pub col_dry: Option<ArrayView2<'a, f64>>,
}

impl<'a> ColumnProfile<'a> {
    pub fn new(play: ArrayView2<'a, f64>, plev: ArrayView2<'a, f64>, tlay: ArrayView2<'a, f64>) -> Self {
        Self {
            play,
            plev,
            tlay,
            tlev: None,
            col_dry: None,
        }
    }

    pub fn ncol(&self) -> usize {
        self.play.nrows()
    }

    pub fn nlay(&self) -> usize {
        self.play.ncols()
    }

    /// Whether layer index 0 is at the top of the atmosphere, judged from the
    /// level pressures. Every column must be ordered the same way up.
    pub fn top_at_1(&self) -> Result<bool> {
        let (ncol, nlev) = self.plev.dim();
        if nlev < 2 {
            return Err(RadiationError::shape(
                "plev",
                &[ncol, self.nlay() + 1],
                self.plev.shape(),
            ));
        }
        let mut columns = self
            .plev
            .outer_iter()
            .map(|plev| plev[0] < plev[nlev - 1]);
        let top_at_1 = columns.next().unwrap_or(false);
        if columns.any(|top_first| top_first != top_at_1) {
            return Err(RadiationError::InvalidProfile(
                "columns aren't all ordered the same way up".to_owned(),
            ));
        }
        Ok(top_at_1)
    }
}

/// Longwave surface and top boundary conditions.
#[derive(Debug, Clone, Copy)]
pub struct LongwaveBoundary<'a> {
    /// Surface temperature in K, dimensioned as (`ncol`).
    pub tsfc: ArrayView1<'a, f64>,
    /// Surface emissivity, dimensioned as (`nband`, `ncol`).
    pub emis_sfc: ArrayView2<'a, f64>,
    /// Incident downward flux at the top, dimensioned as (`ncol`, `ngpt`).
    pub inc_flux: Option<ArrayView2<'a, f64>>,
}

/// Shortwave surface and top boundary conditions.
#[derive(Debug, Clone, Copy)]
pub struct ShortwaveBoundary<'a> {
    /// Cosine of the solar zenith angle, dimensioned as (`ncol`).
    pub mu0: ArrayView1<'a, f64>,
    /// Factor applied to the solar source of each column, dimensioned as
    /// (`ncol`); 1 if absent.
    pub tsi_scaling: Option<ArrayView1<'a, f64>>,
    /// Direct beam surface albedo, dimensioned as (`nband`, `ncol`).
    pub sfc_alb_dir: ArrayView2<'a, f64>,
    /// Diffuse surface albedo, dimensioned as (`nband`, `ncol`).
    pub sfc_alb_dif: ArrayView2<'a, f64>,
    /// Incident diffuse flux at the top, dimensioned as (`ncol`, `ngpt`).
    pub inc_flux_dif: Option<ArrayView2<'a, f64>>,
}

/// Optical properties and sources behind a longwave solution.
#[derive(Debug, Clone)]
pub struct LongwaveOptics {
    pub optical_props: OpticalProps1Scl,
    pub sources: SourceFuncLw,
}

#[derive(Debug, Clone)]
pub struct LongwaveSolution {
    pub fluxes: FluxesBroadband,
    pub bnd_fluxes: Option<FluxesByband>,
    pub optics: Option<LongwaveOptics>,
}

/// Optical properties and solar source behind a shortwave solution.
#[derive(Debug, Clone)]
pub struct ShortwaveOptics {
    pub optical_props: OpticalProps2Str,
    /// Solar source after `tsi_scaling`, dimensioned as (`ncol`, `ngpt`).
    pub toa_source: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct ShortwaveSolution {
    pub fluxes: FluxesBroadband,
    pub bnd_fluxes: Option<FluxesByband>,
    pub optics: Option<ShortwaveOptics>,
}

/// Run `solve` into per-band fluxes if requested, broadband fluxes otherwise.
fn reduce_fluxes(
    options: SolveOptions,
    ncol: usize,
    nlev: usize,
    nband: usize,
    solve: impl FnOnce(&mut dyn FluxReduce) -> Result<()>,
) -> Result<(FluxesBroadband, Option<FluxesByband>)> {
    if options.output_bnd_fluxes {
        let mut bnd_fluxes = FluxesByband::new(ncol, nlev, nband);
        solve(&mut bnd_fluxes)?;
        Ok((bnd_fluxes.broadband.clone(), Some(bnd_fluxes)))
    } else {
        let mut fluxes = FluxesBroadband::new(ncol, nlev);
        solve(&mut fluxes)?;
        Ok((fluxes, None))
    }
}

pub struct RadiationSolverLongwave {
    gas_optics: GasOpticsNn,
}

impl RadiationSolverLongwave {
    /// `gas_optics` must be a longwave instance.
    pub fn new(gas_optics: GasOpticsNn) -> Result<Self> {
        if !gas_optics.source_is_internal() {
            return Err(RadiationError::InvalidConfig(
                "the longwave solver needs longwave gas optics".to_owned(),
            ));
        }
        Ok(Self { gas_optics })
    }

    pub fn load(
        gas_names: Vec<String>,
        spectral: SpectralDisc,
        file_name_weights: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::new(GasOpticsNn::load_longwave(gas_names, spectral, file_name_weights)?)
    }

    pub fn gas_optics(&self) -> &GasOpticsNn {
        &self.gas_optics
    }

    pub fn n_gpt(&self) -> usize {
        self.gas_optics.ngpt()
    }

    pub fn n_bnd(&self) -> usize {
        self.gas_optics.nband()
    }

    pub fn band_lims_gpoint(&self) -> &Array2<usize> {
        self.gas_optics.spectral().band_lims_gpoint()
    }

    pub fn band_lims_wavenumber(&self) -> &Array2<f64> {
        self.gas_optics.spectral().band_lims_wavenum()
    }

    pub fn solve(
        &self,
        gas_concs: &GasConcs,
        profile: &ColumnProfile,
        boundary: &LongwaveBoundary,
        options: SolveOptions,
    ) -> Result<LongwaveSolution> {
        let (ncol, nlay) = (profile.ncol(), profile.nlay());
        let spectral = self.gas_optics.spectral();
        let top_at_1 = profile.top_at_1()?;
        debug!("longwave solve of {ncol} columns with {nlay} layers, top at index 0: {top_at_1}");

        let mut optical_props = OpticalProps1Scl::new(ncol, nlay, spectral.clone());
        let mut sources = SourceFuncLw::new(ncol, nlay, spectral.ngpt());
        self.gas_optics.gas_optics_lw(
            profile.play,
            profile.plev,
            profile.tlay,
            boundary.tsfc,
            gas_concs,
            &mut optical_props,
            &mut sources,
            profile.col_dry,
            profile.tlev,
        )?;

        let (fluxes, bnd_fluxes) =
            reduce_fluxes(options, ncol, nlay + 1, spectral.nband(), |fluxes| {
                rte_lw(
                    &optical_props,
                    top_at_1,
                    &sources,
                    boundary.emis_sfc,
                    boundary.inc_flux,
                    fluxes,
                )
            })?;

        Ok(LongwaveSolution {
            fluxes,
            bnd_fluxes,
            optics: options.output_optical.then(|| LongwaveOptics {
                optical_props,
                sources,
            }),
        })
    }
}

pub struct RadiationSolverShortwave {
    gas_optics: GasOpticsNn,
}

impl RadiationSolverShortwave {
    /// `gas_optics` must be a shortwave instance.
    pub fn new(gas_optics: GasOpticsNn) -> Result<Self> {
        if !gas_optics.source_is_external() {
            return Err(RadiationError::InvalidConfig(
                "the shortwave solver needs shortwave gas optics".to_owned(),
            ));
        }
        Ok(Self { gas_optics })
    }

    pub fn load(
        gas_names: Vec<String>,
        spectral: SpectralDisc,
        solar: SolarSourceComponents,
        file_name_weights: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::new(GasOpticsNn::load_shortwave(
            gas_names,
            spectral,
            solar,
            file_name_weights,
        )?)
    }

    pub fn gas_optics(&self) -> &GasOpticsNn {
        &self.gas_optics
    }

    /// Solar variability is the one piece of state that may change between
    /// solves.
    pub fn gas_optics_mut(&mut self) -> &mut GasOpticsNn {
        &mut self.gas_optics
    }

    pub fn n_gpt(&self) -> usize {
        self.gas_optics.ngpt()
    }

    pub fn n_bnd(&self) -> usize {
        self.gas_optics.nband()
    }

    pub fn band_lims_gpoint(&self) -> &Array2<usize> {
        self.gas_optics.spectral().band_lims_gpoint()
    }

    pub fn band_lims_wavenumber(&self) -> &Array2<f64> {
        self.gas_optics.spectral().band_lims_wavenum()
    }

    pub fn solve(
        &self,
        gas_concs: &GasConcs,
        profile: &ColumnProfile,
        boundary: &ShortwaveBoundary,
        options: SolveOptions,
    ) -> Result<ShortwaveSolution> {
        let (ncol, nlay) = (profile.ncol(), profile.nlay());
        let spectral = self.gas_optics.spectral();
        let top_at_1 = profile.top_at_1()?;
        debug!("shortwave solve of {ncol} columns with {nlay} layers, top at index 0: {top_at_1}");
        if let Some(tsi_scaling) = boundary.tsi_scaling {
            check_shape("tsi_scaling", &[ncol], tsi_scaling.shape())?;
        }

        let mut optical_props = OpticalProps2Str::new(ncol, nlay, spectral.clone());
        let mut toa_source = Array2::zeros((ncol, spectral.ngpt()));
        self.gas_optics.gas_optics_sw(
            profile.play,
            profile.plev,
            profile.tlay,
            gas_concs,
            &mut optical_props,
            &mut toa_source,
            profile.col_dry,
        )?;

        if let Some(tsi_scaling) = boundary.tsi_scaling {
            for (mut row, &scaling) in toa_source.outer_iter_mut().zip(tsi_scaling) {
                row *= scaling;
            }
        }

        let (fluxes, bnd_fluxes) =
            reduce_fluxes(options, ncol, nlay + 1, spectral.nband(), |fluxes| {
                rte_sw(
                    &optical_props,
                    top_at_1,
                    boundary.mu0,
                    toa_source.view(),
                    boundary.sfc_alb_dir,
                    boundary.sfc_alb_dif,
                    boundary.inc_flux_dif,
                    fluxes,
                )
            })?;

        Ok(ShortwaveSolution {
            fluxes,
            bnd_fluxes,
            optics: options.output_optical.then(|| ShortwaveOptics {
                optical_props,
                toa_source,
            }),
        })
    }
}
