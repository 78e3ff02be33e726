//! The network weight file
//!
//! A single JSON document holds every network together with the settings the
//! networks were trained with. The tropopause reference pressure lives here
//! rather than in code, so swapping weights can't silently mismatch it.

use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{DenseLayer, DenseStack, Network, OutputTransform};
use crate::error::{RadiationError, Result};

/// Tropopause pressure in Pa the published networks were trained on.
pub const DEFAULT_PRESS_REF_TROP: f64 = 9948.431564193395;

fn default_press_ref_trop() -> f64 {
    DEFAULT_PRESS_REF_TROP
}

/// Contents of a weight file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightFile {
    /// Pressure in Pa splitting the lower and upper atmosphere networks.
    #[serde(default = "default_press_ref_trop")]
    pub press_ref_trop: f64,
    /// Width of the first hidden layer.
    pub n_layer1: usize,
    /// Width of the second hidden layer, or 0 if there is none.
    #[serde(default)]
    pub n_layer2: usize,
    /// Width of the third hidden layer, or 0 if there is none.
    #[serde(default)]
    pub n_layer3: usize,
    /// Number of ozone input features.
    pub n_o3: usize,
    /// Gases other than water vapor and ozone used as input features.
    #[serde(default)]
    pub extra_gases: Vec<String>,
    /// Networks keyed by name (`tsw`, `ssa`, `tlw`, `plk`).
    pub networks: BTreeMap<String, NetworkWeights>,
}

/// Weights for one predicted quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub lower: StackWeights,
    pub upper: StackWeights,
    /// Optional explicit map from g-point to compressed output index.
    #[serde(default)]
    pub gpt_map: Option<Vec<usize>>,
}

/// Weights and normalisation for one stack of dense layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackWeights {
    pub layers: Vec<LayerWeights>,
    pub input_mean: Vec<f64>,
    pub input_std: Vec<f64>,
    pub output_mean: Vec<f64>,
    pub output_std: Vec<f64>,
    #[serde(default)]
    pub output_transform: OutputTransform,
}

/// One dense layer: `weights` has one row per output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerWeights {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LayerWeights {
    fn to_layer(&self) -> Result<DenseLayer> {
        let n_out = self.weights.len();
        let n_in = self.weights.first().map_or(0, Vec::len);
        if self.weights.iter().any(|row| row.len() != n_in) {
            return Err(RadiationError::InvalidConfig(
                "weight matrix rows have different lengths".to_owned(),
            ));
        }
        let weights = Array2::from_shape_vec((n_out, n_in), self.weights.concat())
            .map_err(|e| RadiationError::InvalidConfig(e.to_string()))?;
        DenseLayer::new(weights, Array1::from(self.bias.clone()))
    }
}

impl StackWeights {
    fn to_stack(&self) -> Result<DenseStack> {
        let layers = self
            .layers
            .iter()
            .map(LayerWeights::to_layer)
            .collect::<Result<Vec<_>>>()?;
        DenseStack::new(
            layers,
            Array1::from(self.input_mean.clone()),
            Array1::from(self.input_std.clone()),
            Array1::from(self.output_mean.clone()),
            Array1::from(self.output_std.clone()),
            self.output_transform,
        )
    }
}

impl WeightFile {
    /// Read and parse a weight file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| RadiationError::WeightFile {
                path: path.to_owned(),
                source,
            })?;
        let weights = Self::from_json(&contents)?;
        info!(
            "read {} networks from {}",
            weights.networks.len(),
            path.display()
        );
        Ok(weights)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let weights: Self = serde_json::from_str(contents)?;
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<()> {
        if !(self.press_ref_trop > 0.) {
            return Err(RadiationError::InvalidConfig(format!(
                "tropopause reference pressure {} must be positive",
                self.press_ref_trop
            )));
        }
        if self.n_o3 > 2 {
            return Err(RadiationError::InvalidConfig(format!(
                "at most 2 ozone features are supported, got {}",
                self.n_o3
            )));
        }
        if self.n_layer1 == 0 && (self.n_layer2 > 0 || self.n_layer3 > 0) {
            return Err(RadiationError::InvalidConfig(
                "n_layer2 and n_layer3 need a first hidden layer".to_owned(),
            ));
        }
        if self.n_layer2 == 0 && self.n_layer3 > 0 {
            return Err(RadiationError::InvalidConfig(
                "n_layer3 needs a second hidden layer".to_owned(),
            ));
        }
        if (self.press_ref_trop - DEFAULT_PRESS_REF_TROP).abs() > 1e-6 {
            warn!(
                "tropopause reference pressure {} Pa differs from the published {} Pa",
                self.press_ref_trop, DEFAULT_PRESS_REF_TROP
            );
        }
        Ok(())
    }

    /// Expected hidden layer widths, from the input side.
    pub fn hidden_widths(&self) -> Vec<usize> {
        [self.n_layer1, self.n_layer2, self.n_layer3]
            .into_iter()
            .filter(|&n| n > 0)
            .collect()
    }

    /// Build network `name` and check its hidden layers against
    /// `n_layer1/2/3`. Returns the explicit g-point map too, if any.
    pub fn network(&self, name: &str) -> Result<(Network, Option<Vec<usize>>)> {
        let weights = self.networks.get(name).ok_or_else(|| {
            RadiationError::InvalidConfig(format!("weight file has no \"{name}\" network"))
        })?;

        let expected = self.hidden_widths();
        let build = |regime: &str, stack: &StackWeights| -> Result<DenseStack> {
            let stack = stack.to_stack()?;
            if stack.hidden_widths() != expected {
                return Err(RadiationError::InvalidConfig(format!(
                    "{regime} \"{name}\" network has hidden widths {:?}, expected {expected:?}",
                    stack.hidden_widths()
                )));
            }
            Ok(stack)
        };
        let network = Network::new(
            build("lower", &weights.lower)?,
            build("upper", &weights.upper)?,
        )?;

        Ok((network, weights.gpt_map.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A stack with one hidden layer of width `n_hidden` that ignores its
    /// input and outputs `value` everywhere.
    pub(crate) fn constant_stack(n_in: usize, n_hidden: usize, n_out: usize, value: f64) -> StackWeights {
        StackWeights {
            layers: vec![
                LayerWeights {
                    weights: vec![vec![0.; n_in]; n_hidden],
                    bias: vec![0.; n_hidden],
                },
                LayerWeights {
                    weights: vec![vec![0.; n_hidden]; n_out],
                    bias: vec![value; n_out],
                },
            ],
            input_mean: vec![0.; n_in],
            input_std: vec![1.; n_in],
            output_mean: vec![0.; n_out],
            output_std: vec![1.; n_out],
            output_transform: OutputTransform::Linear,
        }
    }

    pub(crate) fn weight_file(networks: &[(&str, usize, usize)]) -> WeightFile {
        WeightFile {
            press_ref_trop: DEFAULT_PRESS_REF_TROP,
            n_layer1: 4,
            n_layer2: 0,
            n_layer3: 0,
            n_o3: 1,
            extra_gases: Vec::new(),
            networks: networks
                .iter()
                .map(|&(name, n_in, n_out)| {
                    (
                        name.to_owned(),
                        NetworkWeights {
                            lower: constant_stack(n_in, 4, n_out, 0.5),
                            upper: constant_stack(n_in, 4, n_out, 0.25),
                            gpt_map: None,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn json_round_trip_builds_networks() {
        let json = serde_json::to_string(&weight_file(&[("tlw", 4, 6)])).unwrap();
        let weights = WeightFile::from_json(&json).unwrap();
        assert_eq!(weights.press_ref_trop, DEFAULT_PRESS_REF_TROP);

        let (network, gpt_map) = weights.network("tlw").unwrap();
        assert_eq!(network.n_inputs(), 4);
        assert_eq!(network.n_outputs(), 6);
        assert!(gpt_map.is_none());
    }

    #[test]
    fn defaults_for_optional_fields() {
        let json = r#"{"n_layer1": 2, "n_o3": 0, "networks": {}}"#;
        let weights = WeightFile::from_json(json).unwrap();
        assert_eq!(weights.press_ref_trop, DEFAULT_PRESS_REF_TROP);
        assert_eq!(weights.hidden_widths(), vec![2]);
        assert!(weights.extra_gases.is_empty());
    }

    #[test]
    fn hidden_width_mismatch_is_a_config_error() {
        let mut weights = weight_file(&[("plk", 6, 18)]);
        weights.n_layer1 = 8;
        assert!(matches!(
            weights.network("plk"),
            Err(RadiationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_network() {
        let weights = weight_file(&[("tlw", 4, 6)]);
        assert!(weights.network("ssa").is_err());
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            WeightFile::from_json("{\"n_layer1\": "),
            Err(RadiationError::WeightFormat(_))
        ));
    }

    #[test]
    fn ragged_weights() {
        let mut weights = weight_file(&[("tlw", 4, 6)]);
        if let Some(network) = weights.networks.get_mut("tlw") {
            network.lower.layers[0].weights[1].pop();
        }
        assert!(weights.network("tlw").is_err());
    }
}
