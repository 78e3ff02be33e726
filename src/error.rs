use std::path::PathBuf;

use thiserror::Error;

/// Possible errors from the gas optics and flux solvers.
#[derive(Error, Debug)]
pub enum RadiationError {
    /// A gas the networks were trained with is not in the concentration store
    #[error("gas \"{0}\" is required but not present in the gas concentrations")]
    MissingGas(String),
    /// An input doesn't have the expected shape
    #[error("{name} has shape {actual:?}, expected {expected:?}")]
    InconsistentShape {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A profile is physically invalid (non-monotonic or non-positive pressure,
    /// non-positive temperature)
    #[error("invalid atmospheric profile: {0}")]
    InvalidProfile(String),
    /// The networks or spectral metadata don't fit together
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Couldn't read the weight file
    #[error("couldn't read weight file {path}")]
    WeightFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The weight file isn't valid JSON for the expected layout
    #[error("malformed weight file")]
    WeightFormat(#[from] serde_json::Error),
}

impl RadiationError {
    pub(crate) fn shape(name: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::InconsistentShape {
            name,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Convenience type for `Result<T, RadiationError>`.
pub type Result<T> = std::result::Result<T, RadiationError>;

/// Fail with [`RadiationError::InconsistentShape`] unless `actual` equals
/// `expected`.
pub(crate) fn check_shape(name: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RadiationError::shape(name, expected, actual))
    }
}
