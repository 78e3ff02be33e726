//! Spectral discretisation and optical property containers
//!
//! The containers are allocated by the caller with a fixed spectral extent.
//! Gas optics writes into them; the flux solvers read from them.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{check_shape, RadiationError, Result};

/// Mapping between bands and spectral points (g-points).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSpectralDisc")]
pub struct SpectralDisc {
    /// Inclusive `[first, last]` g-point index of each band, dimensioned as
    /// (`nband`, 2).
    band2gpt: Array2<usize>,
    /// Lower and upper wavenumber limit of each band in cm⁻¹, dimensioned as
    /// (`nband`, 2).
    band_lims_wavenum: Array2<f64>,
}

/// Unvalidated form of [`SpectralDisc`] as it appears in a coefficient file.
#[derive(Deserialize)]
struct RawSpectralDisc {
    band2gpt: Array2<usize>,
    band_lims_wavenum: Array2<f64>,
}

impl TryFrom<RawSpectralDisc> for SpectralDisc {
    type Error = RadiationError;

    fn try_from(raw: RawSpectralDisc) -> Result<Self> {
        Self::new(raw.band2gpt, raw.band_lims_wavenum)
    }
}

impl SpectralDisc {
    /// Bands must be contiguous and cover the g-points starting from zero.
    pub fn new(band2gpt: Array2<usize>, band_lims_wavenum: Array2<f64>) -> Result<Self> {
        let nband = band2gpt.nrows();
        if nband == 0 {
            return Err(RadiationError::InvalidConfig(
                "at least one band is required".to_owned(),
            ));
        }
        check_shape("band2gpt", &[nband, 2], band2gpt.shape())?;
        check_shape("band_lims_wavenum", &[nband, 2], band_lims_wavenum.shape())?;

        let mut next = 0;
        for (iband, lims) in band2gpt.outer_iter().enumerate() {
            if lims[0] != next || lims[1] < lims[0] {
                return Err(RadiationError::InvalidConfig(format!(
                    "band {iband} spans g-points {}..={}, expected it to start at {next}",
                    lims[0], lims[1]
                )));
            }
            next = lims[1] + 1;
        }

        for (iband, lims) in band_lims_wavenum.outer_iter().enumerate() {
            if !(lims[0] > 0. && lims[1] > lims[0]) {
                return Err(RadiationError::InvalidConfig(format!(
                    "band {iband} has invalid wavenumber limits {}..{}",
                    lims[0], lims[1]
                )));
            }
        }

        Ok(Self {
            band2gpt,
            band_lims_wavenum,
        })
    }

    pub fn nband(&self) -> usize {
        self.band2gpt.nrows()
    }

    pub fn ngpt(&self) -> usize {
        self.band2gpt[[self.nband() - 1, 1]] + 1
    }

    /// Inclusive g-point limits of each band.
    pub fn band_lims_gpoint(&self) -> &Array2<usize> {
        &self.band2gpt
    }

    pub fn band_lims_wavenum(&self) -> &Array2<f64> {
        &self.band_lims_wavenum
    }

    /// The g-points belonging to band `iband`.
    pub fn gpts(&self, iband: usize) -> std::ops::RangeInclusive<usize> {
        self.band2gpt[[iband, 0]]..=self.band2gpt[[iband, 1]]
    }

    /// The band index of each g-point.
    pub fn gpt2band(&self) -> Vec<usize> {
        let mut gpt2band = vec![0; self.ngpt()];
        for iband in 0..self.nband() {
            for igpt in self.gpts(iband) {
                gpt2band[igpt] = iband;
            }
        }
        gpt2band
    }

    /// Centre wavenumber of each band in cm⁻¹.
    pub fn band_centers(&self) -> Vec<f64> {
        self.band_lims_wavenum
            .outer_iter()
            .map(|lims| 0.5 * (lims[0] + lims[1]))
            .collect()
    }
}

/// Absorption-only optical properties (longwave).
#[derive(Debug, Clone)]
pub struct OpticalProps1Scl {
    spectral: SpectralDisc,
    /// Optical depth, dimensioned as (`ncol`, `nlay`, `ngpt`).
    pub tau: Array3<f64>,
}

impl OpticalProps1Scl {
    pub fn new(ncol: usize, nlay: usize, spectral: SpectralDisc) -> Self {
        let ngpt = spectral.ngpt();
        Self {
            spectral,
            tau: Array3::zeros((ncol, nlay, ngpt)),
        }
    }

    pub fn spectral(&self) -> &SpectralDisc {
        &self.spectral
    }

    pub fn ncol(&self) -> usize {
        self.tau.dim().0
    }

    pub fn nlay(&self) -> usize {
        self.tau.dim().1
    }

    pub fn ngpt(&self) -> usize {
        self.tau.dim().2
    }
}

/// Two-stream optical properties (shortwave).
#[derive(Debug, Clone)]
pub struct OpticalProps2Str {
    spectral: SpectralDisc,
    /// Optical depth, dimensioned as (`ncol`, `nlay`, `ngpt`).
    pub tau: Array3<f64>,
    /// Single-scatter albedo, same dimensions as `tau`.
    pub ssa: Array3<f64>,
    /// Asymmetry parameter, same dimensions as `tau`.
    pub g: Array3<f64>,
}

impl OpticalProps2Str {
    pub fn new(ncol: usize, nlay: usize, spectral: SpectralDisc) -> Self {
        let ngpt = spectral.ngpt();
        Self {
            spectral,
            tau: Array3::zeros((ncol, nlay, ngpt)),
            ssa: Array3::zeros((ncol, nlay, ngpt)),
            g: Array3::zeros((ncol, nlay, ngpt)),
        }
    }

    pub fn spectral(&self) -> &SpectralDisc {
        &self.spectral
    }

    pub fn ncol(&self) -> usize {
        self.tau.dim().0
    }

    pub fn nlay(&self) -> usize {
        self.tau.dim().1
    }

    pub fn ngpt(&self) -> usize {
        self.tau.dim().2
    }

    /// Check that `ssa` and `g` match `tau`.
    pub(crate) fn validate(&self) -> Result<()> {
        check_shape("ssa", self.tau.shape(), self.ssa.shape())?;
        check_shape("g", self.tau.shape(), self.g.shape())?;
        check_shape("tau", &[self.ncol(), self.nlay(), self.spectral.ngpt()], self.tau.shape())
    }
}

/// Longwave Planck sources.
///
/// For layer `ilay`, `lev_source_inc` is the source at the bounding level on
/// the increasing-index side (level `ilay + 1`) and `lev_source_dec` the one
/// on the decreasing-index side (level `ilay`).
#[derive(Debug, Clone)]
pub struct SourceFuncLw {
    /// Layer source, dimensioned as (`ncol`, `nlay`, `ngpt`).
    pub lay_source: Array3<f64>,
    pub lev_source_inc: Array3<f64>,
    pub lev_source_dec: Array3<f64>,
    /// Surface source, dimensioned as (`ncol`, `ngpt`).
    pub sfc_source: Array2<f64>,
}

impl SourceFuncLw {
    pub fn new(ncol: usize, nlay: usize, ngpt: usize) -> Self {
        Self {
            lay_source: Array3::zeros((ncol, nlay, ngpt)),
            lev_source_inc: Array3::zeros((ncol, nlay, ngpt)),
            lev_source_dec: Array3::zeros((ncol, nlay, ngpt)),
            sfc_source: Array2::zeros((ncol, ngpt)),
        }
    }

    pub(crate) fn validate(&self, ncol: usize, nlay: usize, ngpt: usize) -> Result<()> {
        check_shape("lay_source", &[ncol, nlay, ngpt], self.lay_source.shape())?;
        check_shape("lev_source_inc", &[ncol, nlay, ngpt], self.lev_source_inc.shape())?;
        check_shape("lev_source_dec", &[ncol, nlay, ngpt], self.lev_source_dec.shape())?;
        check_shape("sfc_source", &[ncol, ngpt], self.sfc_source.shape())
    }
}
