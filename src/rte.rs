//! Flux solvers
//!
//! [`rte_sw`] solves the two-stream equations with a direct beam, and
//! [`rte_lw`] integrates emission and absorption without scattering. Both
//! accept layers ordered either way up (`top_at_1`), solve each column
//! independently, and hand the g-point fluxes to a [`FluxReduce`].

pub mod kernels;

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use self::kernels::{ColumnBuf, LwColumnSources};
use crate::error::{check_shape, RadiationError, Result};
use crate::fluxes::FluxReduce;
use crate::optics::{OpticalProps1Scl, OpticalProps2Str, SourceFuncLw, SpectralDisc};

/// Broadcast a per-band field `arr_in` (`nband`, `ncol`) to every g-point of
/// each band, giving (`ncol`, `ngpt`).
pub fn expand_and_transpose(spectral: &SpectralDisc, arr_in: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (nband, ncol) = arr_in.dim();
    check_shape("arr_in", &[spectral.nband(), ncol], &[nband, ncol])?;

    let mut arr_out = Array2::zeros((ncol, spectral.ngpt()));
    for iband in 0..nband {
        let band = arr_in.row(iband);
        for igpt in spectral.gpts(iband) {
            arr_out.column_mut(igpt).assign(&band);
        }
    }
    Ok(arr_out)
}

/// Set the top level of `gpt_flux` (`ncol`, `nlev`, `ngpt`) to the incident
/// flux `inc_flux` (`ncol`, `ngpt`) and every other level to zero.
///
/// With `mu0`, the incident flux is a beam projected onto the horizontal by
/// the cosine of the solar zenith angle of each column, and is zero where the
/// sun is at or below the horizon. Without `inc_flux` the top level is zero
/// too.
pub fn apply_bc(
    gpt_flux: &mut Array3<f64>,
    top_at_1: bool,
    inc_flux: Option<ArrayView2<f64>>,
    mu0: Option<ArrayView1<f64>>,
) {
    gpt_flux.fill(0.);
    let top = if top_at_1 { 0 } else { gpt_flux.len_of(Axis(1)) - 1 };
    if let Some(inc_flux) = inc_flux {
        let mut top_flux = gpt_flux.index_axis_mut(Axis(1), top);
        top_flux.assign(&inc_flux);
        if let Some(mu0) = mu0 {
            for (mut row, &mu0) in top_flux.outer_iter_mut().zip(mu0) {
                row *= mu0.max(0.);
            }
        }
    }
}

/// Maps positions counted from the top of the atmosphere to array indices.
#[derive(Debug, Clone, Copy)]
struct Orientation {
    top_at_1: bool,
    nlay: usize,
}

impl Orientation {
    /// Index of the `k`th layer from the top.
    fn layer(self, k: usize) -> usize {
        if self.top_at_1 {
            k
        } else {
            self.nlay - 1 - k
        }
    }

    /// Index of the `k`th level from the top.
    fn level(self, k: usize) -> usize {
        if self.top_at_1 {
            k
        } else {
            self.nlay - k
        }
    }

    /// Values of g-point `igpt` of column `icol` of a layer field, from the
    /// top down.
    fn column(self, field: &Array3<f64>, icol: usize, igpt: usize) -> ColumnBuf {
        (0..self.nlay)
            .map(|k| field[[icol, self.layer(k), igpt]])
            .collect()
    }
}

/// Fluxes of one column, each dimensioned as (`nlev`, `ngpt`).
struct ColumnFluxes {
    up: Array2<f64>,
    dn: Array2<f64>,
    dir: Array2<f64>,
}

impl ColumnFluxes {
    fn new(nlev: usize, ngpt: usize) -> Self {
        Self {
            up: Array2::zeros((nlev, ngpt)),
            dn: Array2::zeros((nlev, ngpt)),
            dir: Array2::zeros((nlev, ngpt)),
        }
    }
}

/// Shortwave two-stream fluxes.
///
/// `mu0` (`ncol`) is the cosine of the solar zenith angle, `inc_flux` (`ncol`,
/// `ngpt`) the incident solar flux normal to the beam, and `sfc_alb_dir` and
/// `sfc_alb_dif` (`nband`, `ncol`) the surface albedos for direct and diffuse
/// radiation. `inc_flux_dif` (`ncol`, `ngpt`) is the incident diffuse flux,
/// zero if absent. The downward flux passed to `fluxes` includes the direct
/// beam.
#[allow(clippy::too_many_arguments)]
pub fn rte_sw(
    atmos: &OpticalProps2Str,
    top_at_1: bool,
    mu0: ArrayView1<f64>,
    inc_flux: ArrayView2<f64>,
    sfc_alb_dir: ArrayView2<f64>,
    sfc_alb_dif: ArrayView2<f64>,
    inc_flux_dif: Option<ArrayView2<f64>>,
    fluxes: &mut dyn FluxReduce,
) -> Result<()> {
    atmos.validate()?;
    let (ncol, nlay, ngpt) = atmos.tau.dim();
    let spectral = atmos.spectral();
    let nband = spectral.nband();
    check_shape("mu0", &[ncol], mu0.shape())?;
    check_shape("inc_flux", &[ncol, ngpt], inc_flux.shape())?;
    check_shape("sfc_alb_dir", &[nband, ncol], sfc_alb_dir.shape())?;
    check_shape("sfc_alb_dif", &[nband, ncol], sfc_alb_dif.shape())?;
    if let Some(inc_flux_dif) = inc_flux_dif {
        check_shape("inc_flux_dif", &[ncol, ngpt], inc_flux_dif.shape())?;
    }
    if mu0.iter().any(|&mu0| !(mu0 <= 1.)) {
        return Err(RadiationError::InvalidProfile(
            "cosine of the solar zenith angle can't exceed 1".to_owned(),
        ));
    }

    let sfc_alb_dir = expand_and_transpose(spectral, sfc_alb_dir)?;
    let sfc_alb_dif = expand_and_transpose(spectral, sfc_alb_dif)?;

    let nlev = nlay + 1;
    let mut gpt_flux_dir = Array3::zeros((ncol, nlev, ngpt));
    let mut gpt_flux_dn = Array3::zeros((ncol, nlev, ngpt));
    apply_bc(&mut gpt_flux_dir, top_at_1, Some(inc_flux), Some(mu0));
    apply_bc(&mut gpt_flux_dn, top_at_1, inc_flux_dif, None);

    let orientation = Orientation { top_at_1, nlay };
    let top = orientation.level(0);
    let columns: Vec<ColumnFluxes> = (0..ncol)
        .into_par_iter()
        .map(|icol| {
            let mut column = ColumnFluxes::new(nlev, ngpt);
            for igpt in 0..ngpt {
                let layers = kernels::sw_two_stream(
                    &orientation.column(&atmos.tau, icol, igpt),
                    &orientation.column(&atmos.ssa, icol, igpt),
                    &orientation.column(&atmos.g, icol, igpt),
                    mu0[icol],
                );
                let (flux_dir, source_up, source_dn, source_sfc) = kernels::sw_source_2str(
                    &layers,
                    sfc_alb_dir[[icol, igpt]],
                    gpt_flux_dir[[icol, top, igpt]],
                );
                let (flux_up, flux_dn) = kernels::adding(
                    &layers,
                    sfc_alb_dif[[icol, igpt]],
                    &source_up,
                    &source_dn,
                    source_sfc,
                    gpt_flux_dn[[icol, top, igpt]],
                );

                for k in 0..nlev {
                    let ilev = orientation.level(k);
                    column.up[[ilev, igpt]] = flux_up[k];
                    column.dn[[ilev, igpt]] = flux_dn[k] + flux_dir[k];
                    column.dir[[ilev, igpt]] = flux_dir[k];
                }
            }
            column
        })
        .collect();

    let mut gpt_flux_up = Array3::zeros((ncol, nlev, ngpt));
    for (icol, column) in columns.into_iter().enumerate() {
        gpt_flux_up.index_axis_mut(Axis(0), icol).assign(&column.up);
        gpt_flux_dn.index_axis_mut(Axis(0), icol).assign(&column.dn);
        gpt_flux_dir.index_axis_mut(Axis(0), icol).assign(&column.dir);
    }

    fluxes.reduce(
        gpt_flux_up.view(),
        gpt_flux_dn.view(),
        spectral,
        Some(gpt_flux_dir.view()),
    )
}

/// Longwave fluxes without scattering.
///
/// `sfc_emis` (`nband`, `ncol`) is the surface emissivity and `inc_flux`
/// (`ncol`, `ngpt`) the incident downward flux at the top of the atmosphere,
/// zero if absent.
pub fn rte_lw(
    optical_props: &OpticalProps1Scl,
    top_at_1: bool,
    sources: &SourceFuncLw,
    sfc_emis: ArrayView2<f64>,
    inc_flux: Option<ArrayView2<f64>>,
    fluxes: &mut dyn FluxReduce,
) -> Result<()> {
    let (ncol, nlay, ngpt) = optical_props.tau.dim();
    let spectral = optical_props.spectral();
    check_shape("tau", &[ncol, nlay, spectral.ngpt()], optical_props.tau.shape())?;
    sources.validate(ncol, nlay, ngpt)?;
    check_shape("sfc_emis", &[spectral.nband(), ncol], sfc_emis.shape())?;
    if let Some(inc_flux) = inc_flux {
        check_shape("inc_flux", &[ncol, ngpt], inc_flux.shape())?;
    }
    if optical_props.tau.iter().any(|&tau| !(tau >= 0.)) {
        return Err(RadiationError::InvalidProfile(
            "optical depth must be non-negative".to_owned(),
        ));
    }
    if sfc_emis.iter().any(|emis| !(0. ..=1.).contains(emis)) {
        return Err(RadiationError::InvalidProfile(
            "surface emissivity must be within [0, 1]".to_owned(),
        ));
    }

    let sfc_emis = expand_and_transpose(spectral, sfc_emis)?;

    let nlev = nlay + 1;
    let mut gpt_flux_dn = Array3::zeros((ncol, nlev, ngpt));
    apply_bc(&mut gpt_flux_dn, top_at_1, inc_flux, None);

    // Radiation moving down crosses layers in increasing index order when
    // the top is at index 0
    let (lev_source_dn, lev_source_up) = if top_at_1 {
        (&sources.lev_source_inc, &sources.lev_source_dec)
    } else {
        (&sources.lev_source_dec, &sources.lev_source_inc)
    };

    let orientation = Orientation { top_at_1, nlay };
    let top = orientation.level(0);
    let columns: Vec<ColumnFluxes> = (0..ncol)
        .into_par_iter()
        .map(|icol| {
            let mut column = ColumnFluxes::new(nlev, ngpt);
            for igpt in 0..ngpt {
                let lay_source = orientation.column(&sources.lay_source, icol, igpt);
                let lev_source_dn = orientation.column(lev_source_dn, icol, igpt);
                let lev_source_up = orientation.column(lev_source_up, icol, igpt);
                let column_sources = LwColumnSources {
                    lay_source: &lay_source,
                    lev_source_dn: &lev_source_dn,
                    lev_source_up: &lev_source_up,
                    sfc_source: sources.sfc_source[[icol, igpt]],
                };

                let (flux_up, flux_dn) = kernels::lw_solver_noscat(
                    &orientation.column(&optical_props.tau, icol, igpt),
                    &column_sources,
                    sfc_emis[[icol, igpt]],
                    gpt_flux_dn[[icol, top, igpt]],
                );

                for k in 0..nlev {
                    let ilev = orientation.level(k);
                    column.up[[ilev, igpt]] = flux_up[k];
                    column.dn[[ilev, igpt]] = flux_dn[k];
                }
            }
            column
        })
        .collect();

    let mut gpt_flux_up = Array3::zeros((ncol, nlev, ngpt));
    for (icol, column) in columns.into_iter().enumerate() {
        gpt_flux_up.index_axis_mut(Axis(0), icol).assign(&column.up);
        gpt_flux_dn.index_axis_mut(Axis(0), icol).assign(&column.dn);
    }

    fluxes.reduce(gpt_flux_up.view(), gpt_flux_dn.view(), spectral, None)
}
