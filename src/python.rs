//! Python bindings
//!
//! NOTE: this module is the interface between Rust and Python. The real work
//! happens in the other modules, which don't use `pyo3`; it's only used here.

use std::path::PathBuf;

use ndarray::Array2;
use numpy::{PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::error::RadiationError;
use crate::fluxes::{FluxesBroadband, FluxesByband};
use crate::gas_concs::{GasConcs, VmrField};
use crate::gas_optics::{GasOpticsNn, SolarSourceComponents};
use crate::optics::SpectralDisc;
use crate::solver::{
    ColumnProfile, LongwaveBoundary, RadiationSolverLongwave, RadiationSolverShortwave,
    ShortwaveBoundary, SolveOptions,
};

impl From<RadiationError> for PyErr {
    fn from(e: RadiationError) -> Self {
        use pyo3::exceptions::{PyIOError, PyValueError};

        match e {
            RadiationError::WeightFile { .. } => PyIOError::new_err(e.to_string()),
            RadiationError::MissingGas(_)
            | RadiationError::InconsistentShape { .. }
            | RadiationError::InvalidProfile(_)
            | RadiationError::InvalidConfig(_)
            | RadiationError::WeightFormat(_) => PyValueError::new_err(e.to_string()),
        }
    }
}

/// Band metadata from numpy arrays, with `band2gpt` holding inclusive
/// zero-based g-point limits.
fn spectral_disc(
    band2gpt: PyReadonlyArray2<i64>,
    band_lims_wavenum: PyReadonlyArray2<f64>,
) -> Result<SpectralDisc, RadiationError> {
    let band2gpt = band2gpt.as_array();
    let mut converted = Array2::zeros(band2gpt.dim());
    for (out, &igpt) in converted.iter_mut().zip(band2gpt.iter()) {
        *out = usize::try_from(igpt).map_err(|_| {
            RadiationError::InvalidConfig(format!("g-point index {igpt} is negative"))
        })?;
    }
    SpectralDisc::new(converted, band_lims_wavenum.as_array().to_owned())
}

fn add_fluxes(
    dict: &PyDict,
    fluxes: &FluxesBroadband,
    bnd_fluxes: Option<&FluxesByband>,
) -> PyResult<()> {
    let py = dict.py();
    dict.set_item("flux_up", fluxes.flux_up.to_pyarray(py))?;
    dict.set_item("flux_dn", fluxes.flux_dn.to_pyarray(py))?;
    dict.set_item("flux_net", fluxes.flux_net.to_pyarray(py))?;
    if let Some(flux_dn_dir) = &fluxes.flux_dn_dir {
        dict.set_item("flux_dn_dir", flux_dn_dir.to_pyarray(py))?;
    }
    if let Some(bnd_fluxes) = bnd_fluxes {
        dict.set_item("bnd_flux_up", bnd_fluxes.bnd_flux_up.to_pyarray(py))?;
        dict.set_item("bnd_flux_dn", bnd_fluxes.bnd_flux_dn.to_pyarray(py))?;
        dict.set_item("bnd_flux_net", bnd_fluxes.bnd_flux_net.to_pyarray(py))?;
        if let Some(bnd_flux_dn_dir) = &bnd_fluxes.bnd_flux_dn_dir {
            dict.set_item("bnd_flux_dn_dir", bnd_flux_dn_dir.to_pyarray(py))?;
        }
    }
    Ok(())
}

/// Gas concentrations plus the longwave and shortwave solvers.
#[pyclass(name = "RadiationSolver")]
#[derive(Default)]
struct RadiationSolverWrapper {
    gas_concs: GasConcs,
    longwave: Option<RadiationSolverLongwave>,
    shortwave: Option<RadiationSolverShortwave>,
}

impl RadiationSolverWrapper {
    fn longwave(&self) -> PyResult<&RadiationSolverLongwave> {
        self.longwave.as_ref().ok_or_else(|| {
            RadiationError::InvalidConfig("longwave networks aren't loaded".to_owned()).into()
        })
    }

    fn shortwave(&self) -> PyResult<&RadiationSolverShortwave> {
        self.shortwave.as_ref().ok_or_else(|| {
            RadiationError::InvalidConfig("shortwave networks aren't loaded".to_owned()).into()
        })
    }

    fn shortwave_gas_optics_mut(&mut self) -> PyResult<&mut GasOpticsNn> {
        match &mut self.shortwave {
            Some(shortwave) => Ok(shortwave.gas_optics_mut()),
            None => Err(
                RadiationError::InvalidConfig("shortwave networks aren't loaded".to_owned()).into(),
            ),
        }
    }
}

#[pymethods]
impl RadiationSolverWrapper {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    /// Set the volume mixing ratio of gas `name` from a scalar, a profile
    /// (`nlay`), or a field (`ncol`, `nlay`).
    fn set_vmr(&mut self, name: &str, vmr: &PyAny) -> PyResult<()> {
        let field = if let Ok(vmr) = vmr.extract::<f64>() {
            VmrField::Scalar(vmr)
        } else if let Ok(vmr) = vmr.extract::<PyReadonlyArray1<f64>>() {
            VmrField::Layer(vmr.as_array().to_owned())
        } else {
            let vmr: PyReadonlyArray2<f64> = vmr.extract()?;
            VmrField::ColumnLayer(vmr.as_array().to_owned())
        };
        Ok(self.gas_concs.set_vmr(name, field)?)
    }

    fn load_kdistribution_lw(
        &mut self,
        gas_names: Vec<String>,
        band2gpt: PyReadonlyArray2<i64>,
        band_lims_wavenum: PyReadonlyArray2<f64>,
        file_name_weights: PathBuf,
    ) -> PyResult<()> {
        let spectral = spectral_disc(band2gpt, band_lims_wavenum)?;
        self.longwave = Some(RadiationSolverLongwave::load(
            gas_names,
            spectral,
            file_name_weights,
        )?);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn load_kdistribution_sw(
        &mut self,
        gas_names: Vec<String>,
        band2gpt: PyReadonlyArray2<i64>,
        band_lims_wavenum: PyReadonlyArray2<f64>,
        solar_source_quiet: Vec<f64>,
        solar_source_facular: Vec<f64>,
        solar_source_sunspot: Vec<f64>,
        tsi_default: f64,
        mg_default: f64,
        sb_default: f64,
        file_name_weights: PathBuf,
    ) -> PyResult<()> {
        let spectral = spectral_disc(band2gpt, band_lims_wavenum)?;
        let solar = SolarSourceComponents {
            quiet: solar_source_quiet,
            facular: solar_source_facular,
            sunspot: solar_source_sunspot,
            tsi_default,
            mg_default,
            sb_default,
        };
        self.shortwave = Some(RadiationSolverShortwave::load(
            gas_names,
            spectral,
            solar,
            file_name_weights,
        )?);
        Ok(())
    }

    fn set_solar_variability(&mut self, mg_index: f64, sb_index: f64) -> PyResult<()> {
        Ok(self
            .shortwave_gas_optics_mut()?
            .set_solar_variability(mg_index, sb_index)?)
    }

    fn set_tsi(&mut self, tsi: f64) -> PyResult<()> {
        Ok(self.shortwave_gas_optics_mut()?.set_tsi(tsi)?)
    }

    fn get_tsi(&self) -> PyResult<Option<f64>> {
        Ok(self.shortwave()?.gas_optics().get_tsi())
    }

    /// Solve the longwave and return a dict of numpy arrays.
    #[pyo3(signature = (
        play, plev, tlay, tsfc, emis_sfc,
        tlev = None, col_dry = None, output_optical = false, output_bnd_fluxes = false
    ))]
    #[allow(clippy::too_many_arguments)]
    fn solve_longwave<'py>(
        &self,
        py: Python<'py>,
        play: PyReadonlyArray2<f64>,
        plev: PyReadonlyArray2<f64>,
        tlay: PyReadonlyArray2<f64>,
        tsfc: PyReadonlyArray1<f64>,
        emis_sfc: PyReadonlyArray2<f64>,
        tlev: Option<PyReadonlyArray2<f64>>,
        col_dry: Option<PyReadonlyArray2<f64>>,
        output_optical: bool,
        output_bnd_fluxes: bool,
    ) -> PyResult<&'py PyDict> {
        let profile = ColumnProfile {
            play: play.as_array(),
            plev: plev.as_array(),
            tlay: tlay.as_array(),
            tlev: tlev.as_ref().map(|tlev| tlev.as_array()),
            col_dry: col_dry.as_ref().map(|col_dry| col_dry.as_array()),
        };
        let boundary = LongwaveBoundary {
            tsfc: tsfc.as_array(),
            emis_sfc: emis_sfc.as_array(),
            inc_flux: None,
        };
        let options = SolveOptions {
            output_optical,
            output_bnd_fluxes,
        };
        let solver = self.longwave()?;
        let solution = solver.solve(&self.gas_concs, &profile, &boundary, options)?;

        let dict = PyDict::new(py);
        add_fluxes(dict, &solution.fluxes, solution.bnd_fluxes.as_ref())?;
        if let Some(optics) = &solution.optics {
            dict.set_item("tau", optics.optical_props.tau.to_pyarray(py))?;
            dict.set_item("lay_source", optics.sources.lay_source.to_pyarray(py))?;
            dict.set_item("lev_source_inc", optics.sources.lev_source_inc.to_pyarray(py))?;
            dict.set_item("lev_source_dec", optics.sources.lev_source_dec.to_pyarray(py))?;
            dict.set_item("sfc_source", optics.sources.sfc_source.to_pyarray(py))?;
        }
        Ok(dict)
    }

    /// Solve the shortwave and return a dict of numpy arrays.
    #[pyo3(signature = (
        play, plev, tlay, mu0, sfc_alb_dir, sfc_alb_dif,
        tsi_scaling = None, col_dry = None, output_optical = false, output_bnd_fluxes = false
    ))]
    #[allow(clippy::too_many_arguments)]
    fn solve_shortwave<'py>(
        &self,
        py: Python<'py>,
        play: PyReadonlyArray2<f64>,
        plev: PyReadonlyArray2<f64>,
        tlay: PyReadonlyArray2<f64>,
        mu0: PyReadonlyArray1<f64>,
        sfc_alb_dir: PyReadonlyArray2<f64>,
        sfc_alb_dif: PyReadonlyArray2<f64>,
        tsi_scaling: Option<PyReadonlyArray1<f64>>,
        col_dry: Option<PyReadonlyArray2<f64>>,
        output_optical: bool,
        output_bnd_fluxes: bool,
    ) -> PyResult<&'py PyDict> {
        let profile = ColumnProfile {
            play: play.as_array(),
            plev: plev.as_array(),
            tlay: tlay.as_array(),
            tlev: None,
            col_dry: col_dry.as_ref().map(|col_dry| col_dry.as_array()),
        };
        let boundary = ShortwaveBoundary {
            mu0: mu0.as_array(),
            tsi_scaling: tsi_scaling.as_ref().map(|scaling| scaling.as_array()),
            sfc_alb_dir: sfc_alb_dir.as_array(),
            sfc_alb_dif: sfc_alb_dif.as_array(),
            inc_flux_dif: None,
        };
        let options = SolveOptions {
            output_optical,
            output_bnd_fluxes,
        };
        let solver = self.shortwave()?;
        let solution = solver.solve(&self.gas_concs, &profile, &boundary, options)?;

        let dict = PyDict::new(py);
        add_fluxes(dict, &solution.fluxes, solution.bnd_fluxes.as_ref())?;
        if let Some(optics) = &solution.optics {
            dict.set_item("tau", optics.optical_props.tau.to_pyarray(py))?;
            dict.set_item("ssa", optics.optical_props.ssa.to_pyarray(py))?;
            dict.set_item("g", optics.optical_props.g.to_pyarray(py))?;
            dict.set_item("toa_source", optics.toa_source.to_pyarray(py))?;
        }
        Ok(dict)
    }
}

/// A Python module implemented in Rust.
#[pymodule]
fn rte_nn(_py: Python, m: &PyModule) -> PyResult<()> {
    pyo3_log::init();
    m.add_class::<RadiationSolverWrapper>()?;
    Ok(())
}
