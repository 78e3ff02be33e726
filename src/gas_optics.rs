//! Neural-network gas optics
//!
//! [`GasOpticsNn`] turns an atmospheric profile and gas concentrations into
//! spectrally resolved optical depth, and either single-scatter albedo
//! (shortwave) or Planck sources (longwave). Layers are routed by pressure to
//! the lower- or upper-atmosphere network of each predictor.

pub mod features;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::path::Path;

use self::features::{get_col_dry, interpolate_tlev, validate_profile, FeatureLayout, LayerGases};
pub use self::features::{Regime, TropopauseSplit};
use crate::error::{check_shape, RadiationError, Result};
use crate::gas_concs::GasConcs;
use crate::network::weights::WeightFile;
use crate::network::{output_block, Atmosphere, GptMap, Network};
use crate::optics::{OpticalProps1Scl, OpticalProps2Str, SourceFuncLw, SpectralDisc};

/// Networks predict optical depth per this many dry air molecules per cm².
const COL_DRY_UNIT: f64 = 1e24;

/// Offset of the Mg II index in the facular term of the solar source.
const A_OFFSET: f64 = 0.1495954;
/// Offset of the sunspot index in the sunspot term of the solar source.
const B_OFFSET: f64 = 0.00066696;

/// Second radiation constant `h c / k` in cm K.
const C2: f64 = 1.4387769;

/// Reference solar spectra and default variability indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarSourceComponents {
    /// Quiet-sun irradiance per g-point.
    pub quiet: Vec<f64>,
    /// Facular contribution per g-point.
    pub facular: Vec<f64>,
    /// Sunspot contribution per g-point.
    pub sunspot: Vec<f64>,
    /// Default total solar irradiance (W/m²).
    pub tsi_default: f64,
    /// Default Mg II index.
    pub mg_default: f64,
    /// Default sunspot index.
    pub sb_default: f64,
}

/// A network together with the maps from its output blocks to g-points.
#[derive(Debug, Clone)]
struct MappedNetwork {
    network: Network,
    gpt_map: GptMap,
}

impl MappedNetwork {
    /// Width of each output block.
    fn block_width(&self) -> usize {
        self.gpt_map.n_compressed()
    }
}

#[derive(Debug, Clone)]
enum Predictors {
    Longwave {
        tlw: MappedNetwork,
        plk: MappedNetwork,
    },
    Shortwave {
        tsw: MappedNetwork,
        ssa: MappedNetwork,
        solar: Box<SolarSource>,
    },
}

#[derive(Debug, Clone)]
struct SolarSource {
    components: SolarSourceComponents,
    /// Effective solar source per g-point.
    solar_source: Array1<f64>,
}

/// Gas optics driven by neural networks.
///
/// The networks, spectral metadata and solar source are fixed at construction;
/// every gas optics call is a pure function of its arguments and this state,
/// so one instance can be shared between threads.
#[derive(Debug, Clone)]
pub struct GasOpticsNn {
    gas_names: Vec<String>,
    spectral: SpectralDisc,
    layout: FeatureLayout,
    /// Tropopause reference pressure (Pa) the networks were trained with.
    press_ref_trop: f64,
    predictors: Predictors,
}

/// Optical properties of one column, dimensioned as (`nlay`, `ngpt`).
struct ColumnLw {
    tau: Array2<f64>,
    lay_source: Array2<f64>,
    lev_source_inc: Array2<f64>,
    lev_source_dec: Array2<f64>,
    sfc_source: Array1<f64>,
}

struct ColumnSw {
    tau: Array2<f64>,
    ssa: Array2<f64>,
}

/// Call-scoped inputs shared by all columns.
struct Profile<'a> {
    play: ArrayView2<'a, f64>,
    tlay: ArrayView2<'a, f64>,
    gases: LayerGases,
    col_dry: Array2<f64>,
    splits: Vec<TropopauseSplit>,
}

impl GasOpticsNn {
    /// Longwave gas optics from a weight file on disk.
    pub fn load_longwave(
        gas_names: Vec<String>,
        spectral: SpectralDisc,
        file_name_weights: impl AsRef<Path>,
    ) -> Result<Self> {
        let weights = WeightFile::from_path(file_name_weights)?;
        Self::new_longwave(gas_names, spectral, &weights)
    }

    /// Shortwave gas optics from a weight file on disk.
    pub fn load_shortwave(
        gas_names: Vec<String>,
        spectral: SpectralDisc,
        solar: SolarSourceComponents,
        file_name_weights: impl AsRef<Path>,
    ) -> Result<Self> {
        let weights = WeightFile::from_path(file_name_weights)?;
        Self::new_shortwave(gas_names, spectral, solar, &weights)
    }

    /// Longwave gas optics using the `tlw` and `plk` networks.
    pub fn new_longwave(
        gas_names: Vec<String>,
        spectral: SpectralDisc,
        weights: &WeightFile,
    ) -> Result<Self> {
        let layout = FeatureLayout::new(weights.n_o3, weights.extra_gases.clone());
        check_gas_names(&gas_names, &layout)?;

        let n_features = layout.n_features();
        // The Planck network also sees the two bounding level temperatures
        let [tlw, plk] =
            initialize_networks(weights, &spectral, [("tlw", n_features, 1), ("plk", n_features + 2, 3)])?;

        info!(
            "longwave gas optics: {} g-points in {} bands, tropopause at {} Pa",
            spectral.ngpt(),
            spectral.nband(),
            weights.press_ref_trop
        );

        Ok(Self {
            gas_names,
            spectral,
            layout,
            press_ref_trop: weights.press_ref_trop,
            predictors: Predictors::Longwave { tlw, plk },
        })
    }

    /// Shortwave gas optics using the `tsw` and `ssa` networks.
    pub fn new_shortwave(
        gas_names: Vec<String>,
        spectral: SpectralDisc,
        solar: SolarSourceComponents,
        weights: &WeightFile,
    ) -> Result<Self> {
        let layout = FeatureLayout::new(weights.n_o3, weights.extra_gases.clone());
        check_gas_names(&gas_names, &layout)?;

        let ngpt = spectral.ngpt();
        for (name, component) in [
            ("solar_src_quiet", &solar.quiet),
            ("solar_src_facular", &solar.facular),
            ("solar_src_sunspot", &solar.sunspot),
        ] {
            check_shape(name, &[ngpt], &[component.len()])?;
        }

        let n_features = layout.n_features();
        let [tsw, ssa] =
            initialize_networks(weights, &spectral, [("tsw", n_features, 1), ("ssa", n_features, 1)])?;

        info!(
            "shortwave gas optics: {} g-points in {} bands, tropopause at {} Pa",
            ngpt,
            spectral.nband(),
            weights.press_ref_trop
        );

        let (mg_default, sb_default) = (solar.mg_default, solar.sb_default);
        let mut gas_optics = Self {
            gas_names,
            spectral,
            layout,
            press_ref_trop: weights.press_ref_trop,
            predictors: Predictors::Shortwave {
                tsw,
                ssa,
                solar: Box::new(SolarSource {
                    components: solar,
                    solar_source: Array1::zeros(ngpt),
                }),
            },
        };
        gas_optics.set_solar_variability(mg_default, sb_default)?;
        Ok(gas_optics)
    }

    pub fn spectral(&self) -> &SpectralDisc {
        &self.spectral
    }

    pub fn ngpt(&self) -> usize {
        self.spectral.ngpt()
    }

    pub fn nband(&self) -> usize {
        self.spectral.nband()
    }

    pub fn gas_names(&self) -> &[String] {
        &self.gas_names
    }

    /// Gases that must be present in the concentration store.
    pub fn required_gases(&self) -> Vec<&str> {
        self.layout.required_gases()
    }

    pub fn press_ref_trop(&self) -> f64 {
        self.press_ref_trop
    }

    /// Whether this instance computes internal (Planck) sources.
    pub fn source_is_internal(&self) -> bool {
        matches!(self.predictors, Predictors::Longwave { .. })
    }

    /// Whether this instance computes an external (solar) source.
    pub fn source_is_external(&self) -> bool {
        matches!(self.predictors, Predictors::Shortwave { .. })
    }

    /// Effective solar source per g-point (shortwave only).
    pub fn solar_source(&self) -> Option<&Array1<f64>> {
        match &self.predictors {
            Predictors::Shortwave { solar, .. } => Some(&solar.solar_source),
            Predictors::Longwave { .. } => None,
        }
    }

    /// Total solar irradiance of the effective solar source (shortwave only).
    pub fn get_tsi(&self) -> Option<f64> {
        self.solar_source().map(|src| src.sum())
    }

    /// Default total solar irradiance of the reference spectra (shortwave
    /// only).
    pub fn tsi_default(&self) -> Option<f64> {
        match &self.predictors {
            Predictors::Shortwave { solar, .. } => Some(solar.components.tsi_default),
            Predictors::Longwave { .. } => None,
        }
    }

    /// Recompute the effective solar source from the Mg II index `mg_index`
    /// and the sunspot index `sb_index`.
    pub fn set_solar_variability(&mut self, mg_index: f64, sb_index: f64) -> Result<()> {
        let solar = self.solar_mut()?;
        let SolarSourceComponents {
            quiet,
            facular,
            sunspot,
            ..
        } = &solar.components;

        solar.solar_source = quiet
            .iter()
            .zip(facular)
            .zip(sunspot)
            .map(|((quiet, facular), sunspot)| {
                quiet + (mg_index - A_OFFSET) * facular + (sb_index - B_OFFSET) * sunspot
            })
            .collect();
        debug!(
            "solar variability set to Mg index {mg_index}, sunspot index {sb_index}, TSI {}",
            solar.solar_source.sum()
        );
        Ok(())
    }

    /// Scale the effective solar source so it sums to `tsi` (W/m²).
    pub fn set_tsi(&mut self, tsi: f64) -> Result<()> {
        let solar = self.solar_mut()?;
        let total = solar.solar_source.sum();
        if !(tsi >= 0.) || !(total > 0.) {
            return Err(RadiationError::InvalidConfig(format!(
                "can't scale a solar source of {total} W/m² to {tsi} W/m²"
            )));
        }
        solar.solar_source *= tsi / total;
        Ok(())
    }

    fn solar_mut(&mut self) -> Result<&mut SolarSource> {
        match &mut self.predictors {
            Predictors::Shortwave { solar, .. } => Ok(solar.as_mut()),
            Predictors::Longwave { .. } => Err(RadiationError::InvalidConfig(
                "longwave gas optics has no solar source".to_owned(),
            )),
        }
    }

    /// Longwave gas optics.
    ///
    /// Writes optical depth into `optical_props` and the Planck sources into
    /// `sources`. `col_dry` (`ncol`, `nlay`) is computed from `plev` and water
    /// vapor when absent, and `tlev` (`ncol`, `nlev`) is interpolated from
    /// `tlay` when absent. Nothing is written if an error is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn gas_optics_lw<'a>(
        &self,
        play: ArrayView2<'a, f64>,
        plev: ArrayView2<f64>,
        tlay: ArrayView2<'a, f64>,
        tsfc: ArrayView1<f64>,
        gas_concs: &GasConcs,
        optical_props: &mut OpticalProps1Scl,
        sources: &mut SourceFuncLw,
        col_dry: Option<ArrayView2<f64>>,
        tlev: Option<ArrayView2<f64>>,
    ) -> Result<()> {
        let (tlw, plk) = match &self.predictors {
            Predictors::Longwave { tlw, plk } => (tlw, plk),
            Predictors::Shortwave { .. } => {
                return Err(RadiationError::InvalidConfig(
                    "longwave gas optics called on a shortwave instance".to_owned(),
                ))
            }
        };

        let (ncol, nlay) = play.dim();
        let ngpt = self.ngpt();
        check_shape("tsfc", &[ncol], tsfc.shape())?;
        if let Some(tlev) = tlev {
            check_shape("tlev", &[ncol, nlay + 1], tlev.shape())?;
        }
        check_shape("tau", &[ncol, nlay, ngpt], optical_props.tau.shape())?;
        sources.validate(ncol, nlay, ngpt)?;
        if tsfc.iter().any(|&t| !(t > 0.)) {
            return Err(RadiationError::InvalidProfile(
                "surface temperatures must be positive".to_owned(),
            ));
        }

        let profile = self.profile(play, plev, tlay, gas_concs, col_dry)?;
        let tlev = match tlev {
            Some(tlev) => tlev.to_owned(),
            None => interpolate_tlev(play, plev, tlay),
        };

        let columns: Vec<ColumnLw> = (0..ncol)
            .into_par_iter()
            .map(|icol| self.compute_tau_sources_nn(tlw, plk, &profile, tlev.row(icol), tsfc[icol], icol))
            .collect();

        for (icol, column) in columns.into_iter().enumerate() {
            optical_props.tau.index_axis_mut(Axis(0), icol).assign(&column.tau);
            sources.lay_source.index_axis_mut(Axis(0), icol).assign(&column.lay_source);
            sources
                .lev_source_inc
                .index_axis_mut(Axis(0), icol)
                .assign(&column.lev_source_inc);
            sources
                .lev_source_dec
                .index_axis_mut(Axis(0), icol)
                .assign(&column.lev_source_dec);
            sources.sfc_source.row_mut(icol).assign(&column.sfc_source);
        }
        Ok(())
    }

    /// Shortwave gas optics.
    ///
    /// Writes optical depth, single-scatter albedo and a zero asymmetry
    /// parameter into `optical_props`, and the effective solar source into
    /// each column of `toa_src` (`ncol`, `ngpt`). Nothing is written if an
    /// error is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn gas_optics_sw<'a>(
        &self,
        play: ArrayView2<'a, f64>,
        plev: ArrayView2<f64>,
        tlay: ArrayView2<'a, f64>,
        gas_concs: &GasConcs,
        optical_props: &mut OpticalProps2Str,
        toa_src: &mut Array2<f64>,
        col_dry: Option<ArrayView2<f64>>,
    ) -> Result<()> {
        let (tsw, ssa, solar) = match &self.predictors {
            Predictors::Shortwave { tsw, ssa, solar } => (tsw, ssa, solar),
            Predictors::Longwave { .. } => {
                return Err(RadiationError::InvalidConfig(
                    "shortwave gas optics called on a longwave instance".to_owned(),
                ))
            }
        };

        let (ncol, nlay) = play.dim();
        let ngpt = self.ngpt();
        check_shape("tau", &[ncol, nlay, ngpt], optical_props.tau.shape())?;
        optical_props.validate()?;
        check_shape("toa_src", &[ncol, ngpt], toa_src.shape())?;

        let profile = self.profile(play, plev, tlay, gas_concs, col_dry)?;

        let columns: Vec<ColumnSw> = (0..ncol)
            .into_par_iter()
            .map(|icol| self.compute_tau_ssa_nn(tsw, ssa, &profile, icol))
            .collect();

        for (icol, column) in columns.into_iter().enumerate() {
            optical_props.tau.index_axis_mut(Axis(0), icol).assign(&column.tau);
            optical_props.ssa.index_axis_mut(Axis(0), icol).assign(&column.ssa);
        }
        optical_props.g.fill(0.);
        for mut row in toa_src.outer_iter_mut() {
            row.assign(&solar.solar_source);
        }
        Ok(())
    }

    /// Validate the profile and collect everything the columns share.
    fn profile<'a>(
        &self,
        play: ArrayView2<'a, f64>,
        plev: ArrayView2<f64>,
        tlay: ArrayView2<'a, f64>,
        gas_concs: &GasConcs,
        col_dry: Option<ArrayView2<f64>>,
    ) -> Result<Profile<'a>> {
        let (ncol, nlay) = play.dim();
        if nlay == 0 {
            return Err(RadiationError::shape("play", &[ncol, 1], play.shape()));
        }
        check_shape("tlay", &[ncol, nlay], tlay.shape())?;
        check_shape("plev", &[ncol, nlay + 1], plev.shape())?;
        if let Some(col_dry) = col_dry {
            check_shape("col_dry", &[ncol, nlay], col_dry.shape())?;
            if col_dry.iter().any(|&n| !(n.is_finite() && n >= 0.)) {
                return Err(RadiationError::InvalidProfile(
                    "dry air columns must be finite and non-negative".to_owned(),
                ));
            }
        }
        validate_profile(play, plev, tlay)?;

        let gases = self.layout.gather(gas_concs, ncol, nlay)?;
        let col_dry = match col_dry {
            Some(col_dry) => col_dry.to_owned(),
            None => get_col_dry(gases.h2o.view(), plev),
        };

        let splits: Vec<_> = play
            .outer_iter()
            .zip(plev.outer_iter())
            .map(|(play, plev)| TropopauseSplit::new(play, plev, self.press_ref_trop))
            .collect();
        let census = |regime| splits.iter().filter(|s| s.regime() == regime).count();
        debug!(
            "{ncol} columns: {} lower only, {} upper only, {} straddling the tropopause",
            census(Regime::LowerAtmosphere),
            census(Regime::UpperAtmosphere),
            census(Regime::Both)
        );

        Ok(Profile {
            play,
            tlay,
            gases,
            col_dry,
            splits,
        })
    }

    /// Build the features for `layers` of column `icol`, optionally with the
    /// two bounding level temperatures appended.
    fn features(
        &self,
        profile: &Profile,
        icol: usize,
        layers: std::ops::Range<usize>,
        tlev: Option<ArrayView1<f64>>,
    ) -> Array2<f64> {
        let n_features = self.layout.n_features();
        let width = if tlev.is_some() { n_features + 2 } else { n_features };
        let mut inputs = Array2::zeros((layers.len(), width));

        for (mut row, ilay) in inputs.outer_iter_mut().zip(layers) {
            self.layout.write(
                &profile.gases,
                icol,
                ilay,
                profile.play[[icol, ilay]],
                profile.tlay[[icol, ilay]],
                row.view_mut(),
            );
            if let Some(tlev) = tlev {
                row[n_features] = tlev[ilay];
                row[n_features + 1] = tlev[ilay + 1];
            }
        }
        inputs
    }

    fn compute_tau_ssa_nn(
        &self,
        tsw: &MappedNetwork,
        ssa: &MappedNetwork,
        profile: &Profile,
        icol: usize,
    ) -> ColumnSw {
        let nlay = profile.play.ncols();
        let ngpt = self.ngpt();
        let mut column = ColumnSw {
            tau: Array2::zeros((nlay, ngpt)),
            ssa: Array2::zeros((nlay, ngpt)),
        };

        let split = &profile.splits[icol];
        for atmosphere in [Atmosphere::Lower, Atmosphere::Upper] {
            let layers = split.layers(atmosphere);
            if layers.is_empty() {
                continue;
            }

            let inputs = self.features(profile, icol, layers.clone(), None);
            let tau_out = tsw.network.infer_batch(atmosphere, inputs.view());
            let ssa_out = ssa.network.infer_batch(atmosphere, inputs.view());

            for (irow, ilay) in layers.enumerate() {
                let col_dry = profile.col_dry[[icol, ilay]] / COL_DRY_UNIT;
                expand_row(tsw, &tau_out, irow, 0, &mut column.tau, ilay, |tau| {
                    tau.max(0.) * col_dry
                });
                expand_row(ssa, &ssa_out, irow, 0, &mut column.ssa, ilay, |ssa| {
                    ssa.max(0.).min(1.)
                });
            }
        }
        column
    }

    fn compute_tau_sources_nn(
        &self,
        tlw: &MappedNetwork,
        plk: &MappedNetwork,
        profile: &Profile,
        tlev: ArrayView1<f64>,
        tsfc: f64,
        icol: usize,
    ) -> ColumnLw {
        let nlay = profile.play.ncols();
        let ngpt = self.ngpt();
        let mut column = ColumnLw {
            tau: Array2::zeros((nlay, ngpt)),
            lay_source: Array2::zeros((nlay, ngpt)),
            lev_source_inc: Array2::zeros((nlay, ngpt)),
            lev_source_dec: Array2::zeros((nlay, ngpt)),
            sfc_source: Array1::zeros(ngpt),
        };

        let split = &profile.splits[icol];
        for atmosphere in [Atmosphere::Lower, Atmosphere::Upper] {
            let layers = split.layers(atmosphere);
            if layers.is_empty() {
                continue;
            }

            let tau_inputs = self.features(profile, icol, layers.clone(), None);
            let plk_inputs = self.features(profile, icol, layers.clone(), Some(tlev));
            let tau_out = tlw.network.infer_batch(atmosphere, tau_inputs.view());
            let plk_out = plk.network.infer_batch(atmosphere, plk_inputs.view());

            let non_negative = |src: f64| src.max(0.);
            for (irow, ilay) in layers.enumerate() {
                let col_dry = profile.col_dry[[icol, ilay]] / COL_DRY_UNIT;
                expand_row(tlw, &tau_out, irow, 0, &mut column.tau, ilay, |tau| {
                    tau.max(0.) * col_dry
                });
                expand_row(plk, &plk_out, irow, 0, &mut column.lay_source, ilay, non_negative);
                expand_row(plk, &plk_out, irow, 1, &mut column.lev_source_inc, ilay, non_negative);
                expand_row(plk, &plk_out, irow, 2, &mut column.lev_source_dec, ilay, non_negative);
            }
        }

        let ibot = split.bottom_layer();
        let sfc_factor = self.lay2sfc_factor(profile.tlay[[icol, ibot]], tsfc);
        for (igpt, iband) in self.spectral.gpt2band().into_iter().enumerate() {
            column.sfc_source[igpt] = column.lay_source[[ibot, igpt]] * sfc_factor[iband];
        }
        column
    }

    /// Ratio of the Planck function at the surface temperature `tsfc` to that
    /// at the bottom layer temperature `tlay`, at the centre of each band.
    fn lay2sfc_factor(&self, tlay: f64, tsfc: f64) -> SmallVec<[f64; 16]> {
        self.spectral
            .band_centers()
            .into_iter()
            .map(|nu| (C2 * nu / tlay).exp_m1() / (C2 * nu / tsfc).exp_m1())
            .collect()
    }
}

/// Expand block `iblock` of network output row `irow` into row `ilay` of
/// `field`, transforming each value with `f`.
fn expand_row(
    network: &MappedNetwork,
    outputs: &Array2<f64>,
    irow: usize,
    iblock: usize,
    field: &mut Array2<f64>,
    ilay: usize,
    f: impl Fn(f64) -> f64,
) {
    let block = output_block(outputs, irow, iblock, network.block_width());
    network.gpt_map.expand_into(block, field.row_mut(ilay), f);
}

/// Every feature gas must be one the instance knows about.
fn check_gas_names(gas_names: &[String], layout: &FeatureLayout) -> Result<()> {
    for gas in layout.required_gases() {
        if !gas_names.iter().any(|name| name == gas) {
            return Err(RadiationError::InvalidConfig(format!(
                "networks use gas \"{gas}\", which isn't in the gas names"
            )));
        }
    }
    Ok(())
}

/// Build the named networks from `weights`, checking each input width and
/// mapping each output (split into `n_blocks` blocks) onto the g-points.
fn initialize_networks<const N: usize>(
    weights: &WeightFile,
    spectral: &SpectralDisc,
    specs: [(&str, usize, usize); N],
) -> Result<[MappedNetwork; N]> {
    let mut networks = Vec::with_capacity(N);
    for (name, n_inputs, n_blocks) in specs {
        let (network, gpt_map) = weights.network(name)?;
        if network.n_inputs() != n_inputs {
            return Err(RadiationError::InvalidConfig(format!(
                "\"{name}\" network takes {} inputs, expected {n_inputs}",
                network.n_inputs()
            )));
        }
        if network.n_outputs() % n_blocks != 0 {
            return Err(RadiationError::InvalidConfig(format!(
                "\"{name}\" network has {} outputs, not a multiple of {n_blocks}",
                network.n_outputs()
            )));
        }
        let gpt_map = GptMap::new(network.n_outputs() / n_blocks, spectral, gpt_map.as_deref())?;
        info!(
            "\"{name}\" network: {} inputs, hidden layers {:?}, {} outputs",
            network.n_inputs(),
            network.stack(Atmosphere::Lower).hidden_widths(),
            network.n_outputs()
        );
        networks.push(MappedNetwork { network, gpt_map });
    }

    networks.try_into().map_err(|_| {
        RadiationError::InvalidConfig("couldn't build every network".to_owned())
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gas_concs::VmrField;
    use crate::network::weights::tests::{constant_stack, weight_file};
    use crate::network::weights::NetworkWeights;
    use crate::optics::tests::three_bands;
    use approx::assert_relative_eq;
    use ndarray::array;

    pub(crate) fn solar_components() -> SolarSourceComponents {
        SolarSourceComponents {
            quiet: vec![100., 200., 300., 150., 50., 10.],
            facular: vec![1., 2., 3., 1.5, 0.5, 0.1],
            sunspot: vec![-0.1, -0.2, -0.3, -0.15, -0.05, -0.01],
            tsi_default: 1360.8,
            mg_default: 0.1567652,
            sb_default: 902.7126,
        }
    }

    fn gas_names() -> Vec<String> {
        vec!["h2o".to_owned(), "o3".to_owned(), "co2".to_owned()]
    }

    fn gas_concs() -> GasConcs {
        let mut gas_concs = GasConcs::new();
        gas_concs.set_vmr("h2o", VmrField::Scalar(1e-3)).unwrap();
        gas_concs.set_vmr("o3", VmrField::Scalar(1e-6)).unwrap();
        gas_concs
    }

    /// A profile of three columns: surface-first and straddling the
    /// tropopause, top-first and straddling it, and entirely below it.
    fn profile() -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        let plev = array![
            [100000., 60000., 20000., 5000., 1000.],
            [1000., 5000., 20000., 60000., 100000.],
            [100000., 90000., 80000., 70000., 60000.],
        ];
        let play = array![
            [80000., 40000., 12000., 3000.],
            [3000., 12000., 40000., 80000.],
            [95000., 85000., 75000., 65000.],
        ];
        let tlay = array![
            [280., 250., 220., 210.],
            [210., 220., 250., 280.],
            [285., 280., 275., 270.],
        ];
        (play, plev, tlay)
    }

    #[test]
    fn longwave_routes_layers_by_pressure() {
        let weights = weight_file(&[("tlw", 4, 6), ("plk", 6, 18)]);
        let gas_optics = GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).unwrap();
        assert!(gas_optics.source_is_internal());
        assert!(gas_optics.get_tsi().is_none());

        let (play, plev, tlay) = profile();
        let tsfc = array![280., 280., 285.];
        let mut optical_props = OpticalProps1Scl::new(3, 4, three_bands());
        let mut sources = SourceFuncLw::new(3, 4, 6);
        gas_optics
            .gas_optics_lw(
                play.view(),
                plev.view(),
                tlay.view(),
                tsfc.view(),
                &gas_concs(),
                &mut optical_props,
                &mut sources,
                None,
                None,
            )
            .unwrap();

        // The lower stacks predict 0.5, the upper ones 0.25
        for (icol, lower_layers) in [(0, vec![0, 1, 2]), (1, vec![1, 2, 3]), (2, vec![0, 1, 2, 3])] {
            for ilay in 0..4 {
                let expected = if lower_layers.contains(&ilay) { 0.5 } else { 0.25 };
                for igpt in 0..6 {
                    assert_eq!(sources.lay_source[[icol, ilay, igpt]], expected);
                    assert_eq!(sources.lev_source_inc[[icol, ilay, igpt]], expected);
                }
            }
        }

        // Optical depth scales with the dry air column
        let col_dry = get_col_dry(
            Array2::from_elem((3, 4), 1e-3).view(),
            plev.view(),
        );
        assert_relative_eq!(
            optical_props.tau[[0, 0, 3]],
            0.5 * col_dry[[0, 0]] / COL_DRY_UNIT,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            optical_props.tau[[1, 0, 3]],
            0.25 * col_dry[[1, 0]] / COL_DRY_UNIT,
            max_relative = 1e-12
        );
    }

    #[test]
    fn surface_source_follows_surface_temperature() {
        let weights = weight_file(&[("tlw", 4, 6), ("plk", 6, 18)]);
        let gas_optics = GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).unwrap();
        let (play, plev, tlay) = profile();

        let run = |tsfc: Array1<f64>| {
            let mut optical_props = OpticalProps1Scl::new(3, 4, three_bands());
            let mut sources = SourceFuncLw::new(3, 4, 6);
            gas_optics
                .gas_optics_lw(
                    play.view(),
                    plev.view(),
                    tlay.view(),
                    tsfc.view(),
                    &gas_concs(),
                    &mut optical_props,
                    &mut sources,
                    None,
                    None,
                )
                .unwrap();
            sources
        };

        // Surface at the bottom layer temperature emits the layer source
        let sources = run(array![280., 280., 285.]);
        for igpt in 0..6 {
            assert_relative_eq!(sources.sfc_source[[0, igpt]], sources.lay_source[[0, 0, igpt]]);
            assert_relative_eq!(sources.sfc_source[[1, igpt]], sources.lay_source[[1, 3, igpt]]);
        }

        // A warmer surface emits more, most of all at high wavenumbers
        let warm = run(array![300., 300., 300.]);
        let ratio: Vec<_> = (0..6)
            .map(|igpt| warm.sfc_source[[0, igpt]] / warm.lay_source[[0, 0, igpt]])
            .collect();
        assert!(ratio.iter().all(|&r| r > 1.));
        assert!(ratio[5] > ratio[2] && ratio[2] > ratio[0]);
    }

    #[test]
    fn shortwave_clamps_network_outputs() {
        let mut weights = weight_file(&[("tsw", 4, 3)]);
        weights.networks.insert(
            "ssa".to_owned(),
            NetworkWeights {
                lower: constant_stack(4, 4, 6, 1.7),
                upper: constant_stack(4, 4, 6, -0.3),
                gpt_map: None,
            },
        );
        if let Some(tsw) = weights.networks.get_mut("tsw") {
            tsw.upper = constant_stack(4, 4, 3, -2.);
        }

        let gas_optics =
            GasOpticsNn::new_shortwave(gas_names(), three_bands(), solar_components(), &weights)
                .unwrap();
        let (play, plev, tlay) = profile();
        let mut optical_props = OpticalProps2Str::new(3, 4, three_bands());
        optical_props.g.fill(0.3);
        let mut toa_src = Array2::zeros((3, 6));
        gas_optics
            .gas_optics_sw(
                play.view(),
                plev.view(),
                tlay.view(),
                &gas_concs(),
                &mut optical_props,
                &mut toa_src,
                None,
            )
            .unwrap();

        assert!(optical_props.tau.iter().all(|&tau| tau >= 0.));
        assert!(optical_props.ssa.iter().all(|&ssa| (0. ..=1.).contains(&ssa)));
        assert!(optical_props.g.iter().all(|&g| g == 0.));
        // Upper layers saturate at zero
        assert_eq!(optical_props.tau[[0, 3, 0]], 0.);
        assert_eq!(optical_props.ssa[[0, 3, 0]], 0.);
        assert_eq!(optical_props.ssa[[0, 0, 0]], 1.);

        let solar_source = gas_optics.solar_source().unwrap();
        for row in toa_src.outer_iter() {
            assert_eq!(row, solar_source.view());
        }
    }

    #[test]
    fn solar_variability_defaults_are_reproduced() {
        let weights = weight_file(&[("tsw", 4, 6), ("ssa", 4, 6)]);
        let components = solar_components();
        let mut gas_optics =
            GasOpticsNn::new_shortwave(gas_names(), three_bands(), components.clone(), &weights)
                .unwrap();
        let initial = gas_optics.solar_source().unwrap().clone();

        gas_optics.set_solar_variability(0.17, 1200.).unwrap();
        assert_ne!(gas_optics.solar_source().unwrap(), &initial);

        gas_optics
            .set_solar_variability(components.mg_default, components.sb_default)
            .unwrap();
        assert_eq!(gas_optics.solar_source().unwrap(), &initial);

        gas_optics.set_tsi(1361.).unwrap();
        assert_relative_eq!(gas_optics.get_tsi().unwrap(), 1361., max_relative = 1e-12);
        assert_eq!(gas_optics.tsi_default(), Some(1360.8));
    }

    #[test]
    fn missing_gas_fails_before_writing() {
        let weights = weight_file(&[("tlw", 4, 6), ("plk", 6, 18)]);
        let gas_optics = GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).unwrap();
        let (play, plev, tlay) = profile();
        let mut gas_concs = GasConcs::new();
        gas_concs.set_vmr("h2o", VmrField::Scalar(1e-3)).unwrap();

        let mut optical_props = OpticalProps1Scl::new(3, 4, three_bands());
        optical_props.tau.fill(-1.);
        let mut sources = SourceFuncLw::new(3, 4, 6);
        let result = gas_optics.gas_optics_lw(
            play.view(),
            plev.view(),
            tlay.view(),
            array![280., 280., 285.].view(),
            &gas_concs,
            &mut optical_props,
            &mut sources,
            None,
            None,
        );
        assert!(matches!(result, Err(RadiationError::MissingGas(name)) if name == "o3"));
        assert!(optical_props.tau.iter().all(|&tau| tau == -1.));
    }

    #[test]
    fn shape_errors() {
        let weights = weight_file(&[("tlw", 4, 6), ("plk", 6, 18)]);
        let gas_optics = GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).unwrap();
        let (play, plev, tlay) = profile();
        let mut optical_props = OpticalProps1Scl::new(3, 4, three_bands());
        let mut sources = SourceFuncLw::new(3, 4, 6);

        let result = gas_optics.gas_optics_lw(
            play.view(),
            plev.slice(ndarray::s![.., ..4]),
            tlay.view(),
            array![280., 280., 285.].view(),
            &gas_concs(),
            &mut optical_props,
            &mut sources,
            None,
            None,
        );
        assert!(matches!(
            result,
            Err(RadiationError::InconsistentShape { name: "plev", .. })
        ));

        let result = gas_optics.gas_optics_lw(
            play.view(),
            plev.view(),
            tlay.view(),
            array![280., 280.].view(),
            &gas_concs(),
            &mut optical_props,
            &mut sources,
            None,
            None,
        );
        assert!(matches!(
            result,
            Err(RadiationError::InconsistentShape { name: "tsfc", .. })
        ));
    }

    #[test]
    fn construction_checks_networks() {
        // Planck network must see two extra inputs
        let weights = weight_file(&[("tlw", 4, 6), ("plk", 4, 18)]);
        assert!(GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).is_err());

        // Outputs must map onto g-points or bands
        let weights = weight_file(&[("tlw", 4, 5), ("plk", 6, 18)]);
        assert!(GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).is_err());

        // Feature gases must be known
        let weights = weight_file(&[("tlw", 4, 6), ("plk", 6, 18)]);
        let result = GasOpticsNn::new_longwave(vec!["h2o".to_owned()], three_bands(), &weights);
        assert!(matches!(result, Err(RadiationError::InvalidConfig(_))));

        // Shortwave needs its own networks and solar spectra
        let result =
            GasOpticsNn::new_shortwave(gas_names(), three_bands(), solar_components(), &weights);
        assert!(result.is_err());
        let mut short_solar = solar_components();
        short_solar.quiet.pop();
        let weights = weight_file(&[("tsw", 4, 6), ("ssa", 4, 6)]);
        let result = GasOpticsNn::new_shortwave(gas_names(), three_bands(), short_solar, &weights);
        assert!(matches!(
            result,
            Err(RadiationError::InconsistentShape { .. })
        ));
    }

    #[test]
    fn longwave_clamps_network_outputs() {
        let mut weights = weight_file(&[("tlw", 4, 6), ("plk", 6, 18)]);
        if let Some(tlw) = weights.networks.get_mut("tlw") {
            tlw.upper = constant_stack(4, 4, 6, -2.);
        }
        if let Some(plk) = weights.networks.get_mut("plk") {
            plk.upper = constant_stack(6, 4, 18, -1.);
        }
        let gas_optics = GasOpticsNn::new_longwave(gas_names(), three_bands(), &weights).unwrap();

        let (play, plev, tlay) = profile();
        let mut optical_props = OpticalProps1Scl::new(3, 4, three_bands());
        let mut sources = SourceFuncLw::new(3, 4, 6);
        gas_optics
            .gas_optics_lw(
                play.view(),
                plev.view(),
                tlay.view(),
                array![280., 280., 285.].view(),
                &gas_concs(),
                &mut optical_props,
                &mut sources,
                None,
                None,
            )
            .unwrap();

        assert!(optical_props.tau.iter().all(|&tau| tau >= 0.));
        for field in [
            &sources.lay_source,
            &sources.lev_source_inc,
            &sources.lev_source_dec,
        ] {
            assert!(field.iter().all(|&src| src >= 0.));
        }
        // The top layer of each straddling column is above the tropopause
        for (icol, ilay) in [(0, 3), (1, 0)] {
            for igpt in 0..6 {
                assert_eq!(optical_props.tau[[icol, ilay, igpt]], 0.);
                assert_eq!(sources.lay_source[[icol, ilay, igpt]], 0.);
                assert_eq!(sources.lev_source_inc[[icol, ilay, igpt]], 0.);
                assert_eq!(sources.lev_source_dec[[icol, ilay, igpt]], 0.);
            }
        }
        assert!(optical_props.tau[[0, 0, 0]] > 0.);
        assert!(sources.sfc_source.iter().all(|&src| src > 0.));
    }

    #[test]
    fn dry_air_column_must_be_physical() {
        let weights = weight_file(&[("tsw", 4, 6), ("ssa", 4, 6)]);
        let gas_optics =
            GasOpticsNn::new_shortwave(gas_names(), three_bands(), solar_components(), &weights)
                .unwrap();
        let (play, plev, tlay) = profile();

        for bad in [-1e24, f64::NAN, f64::INFINITY] {
            let mut col_dry = Array2::from_elem((3, 4), 2e24);
            col_dry[[1, 2]] = bad;
            let mut optical_props = OpticalProps2Str::new(3, 4, three_bands());
            optical_props.tau.fill(-1.);
            let mut toa_src = Array2::zeros((3, 6));
            let result = gas_optics.gas_optics_sw(
                play.view(),
                plev.view(),
                tlay.view(),
                &gas_concs(),
                &mut optical_props,
                &mut toa_src,
                Some(col_dry.view()),
            );
            assert!(matches!(result, Err(RadiationError::InvalidProfile(_))));
            assert!(optical_props.tau.iter().all(|&tau| tau == -1.));
            assert!(toa_src.iter().all(|&src| src == 0.));
        }

        // A supplied column replaces the one computed from the profile
        let col_dry = Array2::from_elem((3, 4), 2e24);
        let mut optical_props = OpticalProps2Str::new(3, 4, three_bands());
        let mut toa_src = Array2::zeros((3, 6));
        gas_optics
            .gas_optics_sw(
                play.view(),
                plev.view(),
                tlay.view(),
                &gas_concs(),
                &mut optical_props,
                &mut toa_src,
                Some(col_dry.view()),
            )
            .unwrap();
        assert_relative_eq!(optical_props.tau[[0, 0, 0]], 0.5 * 2.);
        assert_relative_eq!(optical_props.tau[[0, 3, 0]], 0.25 * 2.);
    }
}
