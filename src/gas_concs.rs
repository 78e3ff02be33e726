//! Gas volume mixing ratios, queried by name

use std::collections::HashMap;

use log::warn;
use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{RadiationError, Result};

/// A volume mixing ratio field.
#[derive(Debug, Clone)]
pub enum VmrField {
    /// A single value for every column and layer.
    Scalar(f64),
    /// One value per layer, shared by all columns. Length `nlay`.
    Layer(Array1<f64>),
    /// One value per column and layer, dimensioned as (`ncol`, `nlay`).
    ColumnLayer(Array2<f64>),
}

impl VmrField {
    /// Broadcast the field to (`ncol`, `nlay`).
    fn to_column_layer(&self, name: &'static str, ncol: usize, nlay: usize) -> Result<Array2<f64>> {
        match self {
            VmrField::Scalar(vmr) => Ok(Array2::from_elem((ncol, nlay), *vmr)),
            VmrField::Layer(vmr) => {
                if vmr.len() != nlay {
                    return Err(RadiationError::shape(name, &[nlay], vmr.shape()));
                }
                Ok(vmr
                    .broadcast((ncol, nlay))
                    .ok_or_else(|| RadiationError::shape(name, &[nlay], vmr.shape()))?
                    .to_owned())
            }
            VmrField::ColumnLayer(vmr) => {
                if vmr.dim() != (ncol, nlay) {
                    return Err(RadiationError::shape(name, &[ncol, nlay], vmr.shape()));
                }
                Ok(vmr.clone())
            }
        }
    }
}

/// Store of gas concentrations. Gas names are unique; setting a gas twice
/// replaces the earlier field.
#[derive(Debug, Clone, Default)]
pub struct GasConcs {
    concs: HashMap<String, VmrField>,
}

impl GasConcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the volume mixing ratio of gas `name`.
    pub fn set_vmr(&mut self, name: &str, field: VmrField) -> Result<()> {
        let valid = match &field {
            VmrField::Scalar(vmr) => vmr.is_finite() && *vmr >= 0.,
            VmrField::Layer(vmr) => vmr.iter().all(|v| v.is_finite() && *v >= 0.),
            VmrField::ColumnLayer(vmr) => vmr.iter().all(|v| v.is_finite() && *v >= 0.),
        };
        if !valid {
            return Err(RadiationError::InvalidConfig(format!(
                "volume mixing ratio of \"{name}\" must be finite and non-negative"
            )));
        }

        if self.concs.insert(name.to_owned(), field).is_some() {
            warn!("replacing volume mixing ratio of gas \"{name}\"");
        }
        Ok(())
    }

    /// Look up the field of gas `name`.
    pub fn get_vmr(&self, name: &str) -> Option<&VmrField> {
        self.concs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.concs.contains_key(name)
    }

    /// Names of all gases in the store, in arbitrary order.
    pub fn gas_names(&self) -> impl Iterator<Item = &str> {
        self.concs.keys().map(String::as_str)
    }

    /// The mixing ratio of gas `name` broadcast to (`ncol`, `nlay`).
    pub(crate) fn vmr_2d(&self, name: &str, ncol: usize, nlay: usize) -> Result<Array2<f64>> {
        self.get_vmr(name)
            .ok_or_else(|| RadiationError::MissingGas(name.to_owned()))?
            .to_column_layer("vmr", ncol, nlay)
    }
}

impl From<ArrayView2<'_, f64>> for VmrField {
    fn from(vmr: ArrayView2<'_, f64>) -> Self {
        VmrField::ColumnLayer(vmr.to_owned())
    }
}

impl From<f64> for VmrField {
    fn from(vmr: f64) -> Self {
        VmrField::Scalar(vmr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn broadcasts_each_rank() {
        let mut gas_concs = GasConcs::new();
        gas_concs.set_vmr("co2", VmrField::Scalar(400e-6)).unwrap();
        gas_concs
            .set_vmr("o3", VmrField::Layer(array![1e-6, 2e-6, 3e-6]))
            .unwrap();
        gas_concs
            .set_vmr(
                "h2o",
                VmrField::ColumnLayer(array![[1e-2, 1e-3, 1e-4], [2e-2, 2e-3, 2e-4]]),
            )
            .unwrap();

        let co2 = gas_concs.vmr_2d("co2", 2, 3).unwrap();
        assert!(co2.iter().all(|&v| v == 400e-6));

        let o3 = gas_concs.vmr_2d("o3", 2, 3).unwrap();
        assert_eq!(o3.row(1).to_vec(), vec![1e-6, 2e-6, 3e-6]);

        let h2o = gas_concs.vmr_2d("h2o", 2, 3).unwrap();
        assert_eq!(h2o[[1, 2]], 2e-4);
    }

    #[test]
    fn wrong_extent_is_a_shape_error() {
        let mut gas_concs = GasConcs::new();
        gas_concs
            .set_vmr("o3", VmrField::Layer(array![1e-6, 2e-6]))
            .unwrap();
        assert!(matches!(
            gas_concs.vmr_2d("o3", 1, 3),
            Err(RadiationError::InconsistentShape { .. })
        ));
    }

    #[test]
    fn missing_gas() {
        let gas_concs = GasConcs::new();
        assert!(matches!(
            gas_concs.vmr_2d("h2o", 1, 1),
            Err(RadiationError::MissingGas(name)) if name == "h2o"
        ));
    }

    #[test]
    fn rejects_negative_vmr() {
        let mut gas_concs = GasConcs::new();
        assert!(gas_concs.set_vmr("ch4", VmrField::Scalar(-1.)).is_err());
        assert!(!gas_concs.contains("ch4"));
    }
}
