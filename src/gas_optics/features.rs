//! Network input features and derived column quantities

use std::ops::Range;

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};

use crate::error::{RadiationError, Result};
use crate::gas_concs::GasConcs;
use crate::network::Atmosphere;

/// Mixing ratios are floored to this before taking logarithms.
pub(crate) const VMR_FLOOR: f64 = 1e-12;

/// Which gases feed the networks, and in what order.
///
/// A feature vector is `[ln h2o, ozone..., ln extra..., ln play, tlay]`. The
/// ozone features are `ln o3` and, when there are two of them, `o3` in ppmv,
/// since ozone spans too many orders of magnitude for one encoding to cover
/// both the troposphere and the stratosphere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    n_o3: usize,
    extra_gases: Vec<String>,
}

impl FeatureLayout {
    pub fn new(n_o3: usize, extra_gases: Vec<String>) -> Self {
        Self { n_o3, extra_gases }
    }

    pub fn n_o3(&self) -> usize {
        self.n_o3
    }

    /// Number of features for one layer.
    pub fn n_features(&self) -> usize {
        1 + self.n_o3 + self.extra_gases.len() + 2
    }

    /// Gases that must be in the concentration store.
    pub fn required_gases(&self) -> Vec<&str> {
        let mut gases = vec!["h2o"];
        if self.n_o3 > 0 {
            gases.push("o3");
        }
        gases.extend(self.extra_gases.iter().map(String::as_str));
        gases
    }

    /// Fetch every required gas, broadcast to (`ncol`, `nlay`).
    pub(crate) fn gather(&self, gas_concs: &GasConcs, ncol: usize, nlay: usize) -> Result<LayerGases> {
        let h2o = gas_concs.vmr_2d("h2o", ncol, nlay)?;
        let o3 = if self.n_o3 > 0 {
            Some(gas_concs.vmr_2d("o3", ncol, nlay)?)
        } else {
            None
        };
        let extras = self
            .extra_gases
            .iter()
            .map(|name| gas_concs.vmr_2d(name, ncol, nlay))
            .collect::<Result<Vec<_>>>()?;
        Ok(LayerGases { h2o, o3, extras })
    }

    /// Write the features of layer `ilay` of column `icol` into the first
    /// [`FeatureLayout::n_features`] entries of `row`.
    pub(crate) fn write(
        &self,
        gases: &LayerGases,
        icol: usize,
        ilay: usize,
        play: f64,
        tlay: f64,
        mut row: ArrayViewMut1<f64>,
    ) {
        let ln_vmr = |vmr: f64| vmr.max(VMR_FLOOR).ln();

        let mut k = 0;
        let mut push = |value: f64| {
            row[k] = value;
            k += 1;
        };

        push(ln_vmr(gases.h2o[[icol, ilay]]));
        if let Some(o3) = &gases.o3 {
            let o3 = o3[[icol, ilay]];
            push(ln_vmr(o3));
            if self.n_o3 > 1 {
                push(o3 * 1e6);
            }
        }
        for extra in &gases.extras {
            push(ln_vmr(extra[[icol, ilay]]));
        }
        push(play.ln());
        push(tlay);
    }
}

/// Mixing ratios of the feature gases, each dimensioned as (`ncol`, `nlay`).
#[derive(Debug)]
pub(crate) struct LayerGases {
    pub(crate) h2o: Array2<f64>,
    o3: Option<Array2<f64>>,
    extras: Vec<Array2<f64>>,
}

/// Per-column routing regime of layers to the two trained networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Every layer is below the tropopause (higher pressure).
    LowerAtmosphere,
    /// Every layer is above the tropopause.
    UpperAtmosphere,
    /// The column straddles the tropopause.
    Both,
}

/// Where a column crosses the tropopause reference pressure.
///
/// Layers are monotonic in pressure, so each regime is a contiguous range of
/// layer indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TropopauseSplit {
    regime: Regime,
    /// First layer index of the second group (upper if the surface is at
    /// index 0, lower otherwise).
    idx_tropo: usize,
    top_at_1: bool,
    nlay: usize,
}

impl TropopauseSplit {
    /// Split one column of layer pressures `play`, oriented by its level
    /// pressures `plev`. Layers with a pressure above `press_ref_trop` belong
    /// to the lower atmosphere.
    pub fn new(play: ArrayView1<f64>, plev: ArrayView1<f64>, press_ref_trop: f64) -> Self {
        let nlay = play.len();
        let top_at_1 = plev.len() > 1 && plev[0] < plev[plev.len() - 1];
        let n_lower = play.iter().filter(|&&p| p > press_ref_trop).count();

        let regime = match n_lower {
            0 => Regime::UpperAtmosphere,
            n if n == nlay => Regime::LowerAtmosphere,
            _ => Regime::Both,
        };
        let idx_tropo = if top_at_1 { nlay - n_lower } else { n_lower };

        Self {
            regime,
            idx_tropo,
            top_at_1,
            nlay,
        }
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    pub fn idx_tropo(&self) -> usize {
        self.idx_tropo
    }

    /// Whether layer index 0 is at the top of the atmosphere.
    pub fn top_at_1(&self) -> bool {
        self.top_at_1
    }

    /// Layer indices routed to `atmosphere`; empty if none are.
    pub fn layers(&self, atmosphere: Atmosphere) -> Range<usize> {
        match (self.top_at_1, atmosphere) {
            (true, Atmosphere::Upper) | (false, Atmosphere::Lower) => 0..self.idx_tropo,
            (true, Atmosphere::Lower) | (false, Atmosphere::Upper) => self.idx_tropo..self.nlay,
        }
    }

    /// Index of the layer touching the surface.
    pub fn bottom_layer(&self) -> usize {
        if self.top_at_1 {
            self.nlay - 1
        } else {
            0
        }
    }
}

/// Check that pressures are positive and strictly monotonic in the same
/// direction for layers and levels, and temperatures are positive.
pub(crate) fn validate_profile(
    play: ArrayView2<f64>,
    plev: ArrayView2<f64>,
    tlay: ArrayView2<f64>,
) -> Result<()> {
    if play.iter().chain(plev.iter()).any(|&p| !(p > 0.)) {
        return Err(RadiationError::InvalidProfile(
            "pressures must be positive".to_owned(),
        ));
    }
    if tlay.iter().any(|&t| !(t > 0.)) {
        return Err(RadiationError::InvalidProfile(
            "temperatures must be positive".to_owned(),
        ));
    }

    for (icol, (play, plev)) in play
        .axis_iter(Axis(0))
        .zip(plev.axis_iter(Axis(0)))
        .enumerate()
    {
        let increasing = plev[0] < plev[plev.len() - 1];
        let monotonic = |p: ArrayView1<f64>| {
            p.windows(2)
                .into_iter()
                .all(|w| if increasing { w[0] < w[1] } else { w[0] > w[1] })
        };
        if !monotonic(play) || !monotonic(plev) {
            return Err(RadiationError::InvalidProfile(format!(
                "pressures of column {icol} aren't strictly monotonic in one direction"
            )));
        }
    }
    Ok(())
}

/// Number of dry air molecules per cm² in each layer, dimensioned as
/// (`ncol`, `nlay`), from the level pressures in Pa and the water vapor
/// mixing ratio.
pub fn get_col_dry(vmr_h2o: ArrayView2<f64>, plev: ArrayView2<f64>) -> Array2<f64> {
    #![allow(clippy::excessive_precision)]
    /// Molar mass of dry air (kg/mol)
    const M_DRY: f64 = 0.028964;
    /// Molar mass of water (kg/mol)
    const M_H2O: f64 = 0.018016;
    /// Avogadro constant (1/mol)
    const AVOGAD: f64 = 6.02214076e23;
    /// Standard gravity (m/s²)
    const G0: f64 = 9.80665;

    let (ncol, nlay) = vmr_h2o.dim();
    Array2::from_shape_fn((ncol, nlay), |(icol, ilay)| {
        let h2o = vmr_h2o[[icol, ilay]];
        let delta_plev = (plev[[icol, ilay]] - plev[[icol, ilay + 1]]).abs();
        // Mean molar mass of moist air
        let m_air = (M_DRY + M_H2O * h2o) / (1. + h2o);
        // Total molecules per m², converted to per cm²
        let col_tot = delta_plev * AVOGAD / (m_air * G0) * 1e-4;
        col_tot / (1. + h2o)
    })
}

/// Level temperatures interpolated linearly in pressure from the layer
/// temperatures, extrapolated at the top and bottom levels.
pub fn interpolate_tlev(
    play: ArrayView2<f64>,
    plev: ArrayView2<f64>,
    tlay: ArrayView2<f64>,
) -> Array2<f64> {
    let (ncol, nlay) = play.dim();
    Array2::from_shape_fn((ncol, nlay + 1), |(icol, ilev)| {
        if nlay == 1 {
            return tlay[[icol, 0]];
        }
        // Interpolate (or extrapolate) between the two nearest layers
        let upper = ilev.clamp(1, nlay - 1);
        let lower = upper - 1;
        let (p0, p1) = (play[[icol, lower]], play[[icol, upper]]);
        let (t0, t1) = (tlay[[icol, lower]], tlay[[icol, upper]]);
        t0 + (plev[[icol, ilev]] - p0) * (t1 - t0) / (p1 - p0)
    })
}
