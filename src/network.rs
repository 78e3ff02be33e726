//! Feed-forward network inference
//!
//! Each predicted quantity (shortwave optical depth, single-scatter albedo,
//! longwave optical depth, Planck source) has one [`Network`], which holds two
//! independently trained [`DenseStack`]s: one for the lower atmosphere and one
//! for the upper atmosphere.

pub mod weights;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{RadiationError, Result};
use crate::optics::SpectralDisc;

/// Slope of the leaky ReLU for negative inputs.
const LEAKY_RELU_SLOPE: f64 = 0.2;

/// Which of the two trained regimes a layer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atmosphere {
    /// Layers with a pressure above the tropopause reference pressure.
    Lower,
    /// Layers at or below the tropopause reference pressure.
    Upper,
}

/// Transform applied to the de-normalised network output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTransform {
    #[default]
    Linear,
    Exp,
}

/// A fully connected layer computing `weights · x + bias`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    /// Dimensioned as (`n_out`, `n_in`).
    weights: Array2<f64>,
    /// Length `n_out`.
    bias: Array1<f64>,
}

impl DenseLayer {
    pub fn new(weights: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if weights.nrows() != bias.len() || weights.ncols() == 0 || bias.is_empty() {
            return Err(RadiationError::InvalidConfig(format!(
                "dense layer weights {:?} don't match bias of length {}",
                weights.shape(),
                bias.len()
            )));
        }
        Ok(Self { weights, bias })
    }

    pub fn n_inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn n_outputs(&self) -> usize {
        self.weights.nrows()
    }
}

/// A stack of dense layers with input and output normalisation.
///
/// Hidden layers use a leaky ReLU; the last layer is linear.
#[derive(Debug, Clone)]
pub struct DenseStack {
    layers: Vec<DenseLayer>,
    input_mean: Array1<f64>,
    input_std: Array1<f64>,
    output_mean: Array1<f64>,
    output_std: Array1<f64>,
    output_transform: OutputTransform,
}

impl DenseStack {
    pub fn new(
        layers: Vec<DenseLayer>,
        input_mean: Array1<f64>,
        input_std: Array1<f64>,
        output_mean: Array1<f64>,
        output_std: Array1<f64>,
        output_transform: OutputTransform,
    ) -> Result<Self> {
        let (first, last) = match (layers.first(), layers.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(RadiationError::InvalidConfig(
                    "a network needs at least one layer".to_owned(),
                ))
            }
        };

        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].n_outputs() != pair[1].n_inputs() {
                return Err(RadiationError::InvalidConfig(format!(
                    "layer {} has {} outputs but layer {} takes {} inputs",
                    i,
                    pair[0].n_outputs(),
                    i + 1,
                    pair[1].n_inputs()
                )));
            }
        }

        let n_in = first.n_inputs();
        let n_out = last.n_outputs();
        if input_mean.len() != n_in || input_std.len() != n_in {
            return Err(RadiationError::InvalidConfig(format!(
                "input normalisation must have length {n_in}"
            )));
        }
        if output_mean.len() != n_out || output_std.len() != n_out {
            return Err(RadiationError::InvalidConfig(format!(
                "output normalisation must have length {n_out}"
            )));
        }
        if input_std.iter().any(|&s| !(s > 0.)) {
            return Err(RadiationError::InvalidConfig(
                "input standard deviations must be positive".to_owned(),
            ));
        }

        Ok(Self {
            layers,
            input_mean,
            input_std,
            output_mean,
            output_std,
            output_transform,
        })
    }

    pub fn n_inputs(&self) -> usize {
        self.layers[0].n_inputs()
    }

    pub fn n_outputs(&self) -> usize {
        self.layers[self.layers.len() - 1].n_outputs()
    }

    /// Widths of the hidden layers, from the input side.
    pub fn hidden_widths(&self) -> Vec<usize> {
        self.layers[..self.layers.len() - 1]
            .iter()
            .map(DenseLayer::n_outputs)
            .collect()
    }

    /// Run the network on a single feature vector.
    pub fn infer(&self, input: &[f64]) -> Vec<f64> {
        let input = ArrayView1::from(input).insert_axis(Axis(0));
        self.infer_batch(input).into_raw_vec()
    }

    /// Run the network on a batch of feature vectors, one per row of
    /// `inputs`. Returns one output vector per row.
    pub fn infer_batch(&self, inputs: ArrayView2<f64>) -> Array2<f64> {
        debug_assert_eq!(inputs.ncols(), self.n_inputs());

        let mut x = inputs.to_owned();
        x -= &self.input_mean;
        x /= &self.input_std;

        let num_layers = self.layers.len();
        for (i, layer) in self.layers.iter().enumerate() {
            x = x.dot(&layer.weights.t());
            x += &layer.bias;
            if i + 1 < num_layers {
                x.mapv_inplace(|v| if v < 0. { LEAKY_RELU_SLOPE * v } else { v });
            }
        }

        x *= &self.output_std;
        x += &self.output_mean;
        if self.output_transform == OutputTransform::Exp {
            x.mapv_inplace(f64::exp);
        }
        x
    }
}

/// A predictor with one trained stack per atmospheric regime.
#[derive(Debug, Clone)]
pub struct Network {
    lower: DenseStack,
    upper: DenseStack,
}

impl Network {
    /// Both stacks must have the same input and output widths.
    pub fn new(lower: DenseStack, upper: DenseStack) -> Result<Self> {
        if lower.n_inputs() != upper.n_inputs() || lower.n_outputs() != upper.n_outputs() {
            return Err(RadiationError::InvalidConfig(format!(
                "lower ({} -> {}) and upper ({} -> {}) networks have different widths",
                lower.n_inputs(),
                lower.n_outputs(),
                upper.n_inputs(),
                upper.n_outputs()
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn stack(&self, atmosphere: Atmosphere) -> &DenseStack {
        match atmosphere {
            Atmosphere::Lower => &self.lower,
            Atmosphere::Upper => &self.upper,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.lower.n_inputs()
    }

    pub fn n_outputs(&self) -> usize {
        self.lower.n_outputs()
    }

    /// Run the stack for `atmosphere` on a batch of feature vectors.
    pub fn infer_batch(&self, atmosphere: Atmosphere, inputs: ArrayView2<f64>) -> Array2<f64> {
        self.stack(atmosphere).infer_batch(inputs)
    }
}

/// Maps the compressed outputs of a network block onto all g-points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptMap {
    /// For each g-point, the index into the compressed block.
    map: Vec<usize>,
    n_compressed: usize,
}

impl GptMap {
    /// Derive the map for a block of `width` compressed values.
    ///
    /// With an explicit `map`, it's validated and used as-is. Otherwise a
    /// block as wide as the number of g-points maps one-to-one, and a block as
    /// wide as the number of bands is broadcast over each band's g-points.
    pub fn new(width: usize, spectral: &SpectralDisc, map: Option<&[usize]>) -> Result<Self> {
        let ngpt = spectral.ngpt();
        let map = match map {
            Some(map) => {
                if map.len() != ngpt || map.iter().any(|&i| i >= width) {
                    return Err(RadiationError::InvalidConfig(format!(
                        "g-point map must have {ngpt} entries below {width}"
                    )));
                }
                map.to_vec()
            }
            None if width == ngpt => (0..ngpt).collect(),
            None if width == spectral.nband() => spectral.gpt2band(),
            None => {
                return Err(RadiationError::InvalidConfig(format!(
                    "network block of width {width} can't be mapped onto {ngpt} g-points or {} bands",
                    spectral.nband()
                )))
            }
        };

        Ok(Self {
            map,
            n_compressed: width,
        })
    }

    pub fn n_compressed(&self) -> usize {
        self.n_compressed
    }

    /// Expand one compressed block into `out`, which has one entry per
    /// g-point, applying `f` to each value.
    pub fn expand_into<'a>(
        &self,
        compressed: ArrayView1<f64>,
        out: impl IntoIterator<Item = &'a mut f64>,
        f: impl Fn(f64) -> f64,
    ) {
        debug_assert_eq!(compressed.len(), self.n_compressed);
        for (out, &i) in out.into_iter().zip(&self.map) {
            *out = f(compressed[i]);
        }
    }
}

/// Split `outputs` (rows of `n_blocks * width` values) into the block
/// `iblock` of row `irow`.
pub(crate) fn output_block(
    outputs: &Array2<f64>,
    irow: usize,
    iblock: usize,
    width: usize,
) -> ArrayView1<'_, f64> {
    outputs.slice(s![irow, iblock * width..(iblock + 1) * width])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::optics::tests::three_bands;
    use approx::assert_relative_eq;
    use ndarray::{array, aview1};

    /// A single-layer stack computing `weights · x + bias` with no
    /// normalisation.
    pub(crate) fn linear_stack(weights: Array2<f64>, bias: Array1<f64>) -> DenseStack {
        let n_in = weights.ncols();
        let n_out = weights.nrows();
        DenseStack::new(
            vec![DenseLayer::new(weights, bias).unwrap()],
            Array1::zeros(n_in),
            Array1::ones(n_in),
            Array1::zeros(n_out),
            Array1::ones(n_out),
            OutputTransform::Linear,
        )
        .unwrap()
    }

    #[test]
    fn hidden_layer_uses_leaky_relu() {
        let hidden = DenseLayer::new(array![[1.0], [-1.0]], array![0., 0.]).unwrap();
        let output = DenseLayer::new(array![[1.0, 1.0]], array![0.5]).unwrap();
        let stack = DenseStack::new(
            vec![hidden, output],
            array![1.0],
            array![2.0],
            array![10.0],
            array![3.0],
            OutputTransform::Linear,
        )
        .unwrap();

        assert_eq!(stack.hidden_widths(), vec![2]);
        // Normalised input is (5 - 1) / 2 = 2, hidden is [2, -0.4], output
        // layer gives 2.1, de-normalised 2.1 * 3 + 10
        assert_relative_eq!(stack.infer(&[5.0])[0], 16.3, epsilon = 1e-12);
    }

    #[test]
    fn exp_transform() {
        let mut stack = linear_stack(array![[1.0, 0.0]], array![0.0]);
        stack.output_transform = OutputTransform::Exp;
        assert_relative_eq!(stack.infer(&[1.0, 7.0])[0], std::f64::consts::E);
    }

    #[test]
    fn batch_matches_single() {
        let stack = linear_stack(array![[1.0, 2.0], [0.5, -1.0]], array![0.1, 0.2]);
        let inputs = array![[1.0, 2.0], [-3.0, 0.5]];
        let batch = stack.infer_batch(inputs.view());
        for (row, input) in batch.outer_iter().zip(inputs.outer_iter()) {
            assert_eq!(row.to_vec(), stack.infer(&input.to_vec()));
        }
    }

    #[test]
    fn rejects_inconsistent_layers() {
        let a = DenseLayer::new(array![[1.0, 2.0]], array![0.]).unwrap();
        let b = DenseLayer::new(array![[1.0, 2.0]], array![0.]).unwrap();
        let result = DenseStack::new(
            vec![a, b],
            array![0., 0.],
            array![1., 1.],
            array![0.],
            array![1.],
            OutputTransform::Linear,
        );
        assert!(matches!(result, Err(RadiationError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_input_std() {
        let layer = DenseLayer::new(array![[1.0]], array![0.]).unwrap();
        let result = DenseStack::new(
            vec![layer],
            array![0.],
            array![0.],
            array![0.],
            array![1.],
            OutputTransform::Linear,
        );
        assert!(result.is_err());
    }

    #[test]
    fn output_blocks() {
        let outputs = array![[0., 1., 2., 3.], [4., 5., 6., 7.]];
        assert_eq!(output_block(&outputs, 1, 1, 2), aview1(&[6., 7.]));
        assert_eq!(output_block(&outputs, 0, 0, 4), aview1(&[0., 1., 2., 3.]));
    }

    #[test]
    fn gpt_map_by_width() {
        let spectral = three_bands();

        let full = GptMap::new(6, &spectral, None).unwrap();
        let mut out = [0.; 6];
        full.expand_into(aview1(&[0., 1., 2., 3., 4., 5.]), &mut out, |v| v);
        assert_eq!(out, [0., 1., 2., 3., 4., 5.]);

        let per_band = GptMap::new(3, &spectral, None).unwrap();
        per_band.expand_into(aview1(&[7., 8., 9.]), &mut out, |v| 2. * v);
        assert_eq!(out, [14., 14., 16., 16., 16., 18.]);

        let explicit = GptMap::new(2, &spectral, Some(&[1, 1, 0, 0, 1, 0])).unwrap();
        explicit.expand_into(aview1(&[-1., 1.]), &mut out, |v| v);
        assert_eq!(out, [1., 1., -1., -1., 1., -1.]);

        assert!(GptMap::new(4, &spectral, None).is_err());
        assert!(GptMap::new(2, &spectral, Some(&[2, 0, 0, 0, 0, 0])).is_err());
    }
}
