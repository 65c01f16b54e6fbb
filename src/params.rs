//! Field parameters shared by the client and the computing parties.
//!
//! The computing parties write their parameters to a `Params-Data` file inside the preprocessing
//! directory, holding the prime modulus followed by the degree of the binary extension field. The
//! client has to load the very same parameters, shares from a different field cannot be combined.

use std::{
    fs,
    path::{Path, PathBuf},
};

use num_bigint::BigUint;
use tracing::info;

use crate::field::{Field, FieldError};

/// The name of the parameter file inside a preprocessing directory.
pub const PARAMS_FILE: &str = "Params-Data";

/// The directory holding the preprocessing data of all parties.
pub const PREP_DIR: &str = "Player-Data";

/// Bit length of the prime used by default setups.
pub const DEFAULT_PRIME_BITS: u32 = 128;

/// Degree of the binary extension field `GF(2^n)` used by default setups.
pub const DEFAULT_GF2N_DEGREE: u32 = 128;

/// The largest supported degree of the binary extension field.
pub const MAX_GF2N_DEGREE: u32 = 128;

/// Errors that can occur while loading field parameters.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    /// The parameter file could not be read.
    #[error("could not read params from {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// A required value is missing from the parameter file.
    #[error("missing {0} in params")]
    Missing(&'static str),
    /// A value could not be parsed.
    #[error("invalid {name} in params: {value:?}")]
    Invalid {
        /// The name of the value.
        name: &'static str,
        /// The token that could not be parsed.
        value: String,
    },
    /// The degree of the binary field is out of range.
    #[error("unsupported gf2n degree {0}, expected 1..=128")]
    UnsupportedDegree(u32),
    /// The modulus does not define a field.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// The parameters of the fields all shares live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParams {
    /// The prime modulus of `GF(p)`.
    pub modulus: BigUint,
    /// The degree of the binary extension field `GF(2^n)`.
    pub degree: u32,
}

impl FieldParams {
    /// Creates validated field parameters.
    pub fn new(modulus: BigUint, degree: u32) -> Result<Self, ParamsError> {
        if !(1..=MAX_GF2N_DEGREE).contains(&degree) {
            return Err(ParamsError::UnsupportedDegree(degree));
        }
        Field::new(modulus.clone())?;
        Ok(Self { modulus, degree })
    }

    /// Parses whitespace-separated parameters: the decimal modulus, then the degree.
    ///
    /// Any further tokens are ignored.
    pub fn parse(s: &str) -> Result<Self, ParamsError> {
        let mut tokens = s.split_whitespace();
        let modulus = tokens.next().ok_or(ParamsError::Missing("modulus"))?;
        let modulus: BigUint = modulus.parse().map_err(|_| ParamsError::Invalid {
            name: "modulus",
            value: modulus.to_string(),
        })?;
        let degree = tokens.next().ok_or(ParamsError::Missing("degree"))?;
        let degree: u32 = degree.parse().map_err(|_| ParamsError::Invalid {
            name: "degree",
            value: degree.to_string(),
        })?;
        Self::new(modulus, degree)
    }

    /// Loads the parameters from the `Params-Data` file in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let path = dir.as_ref().join(PARAMS_FILE);
        info!("loading params from: {}", path.display());
        let contents = fs::read_to_string(&path).map_err(|source| ParamsError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// The prime field defined by the modulus.
    pub fn field(&self) -> Result<Field, FieldError> {
        Field::new(self.modulus.clone())
    }
}

/// The preprocessing directory for a setup of `parties` parties with a `prime_bits`-bit prime and
/// a binary field of the given degree.
pub fn prep_dir(parties: usize, prime_bits: u32, degree: u32) -> PathBuf {
    PathBuf::from(PREP_DIR).join(format!("{parties}-{prime_bits}-{degree}"))
}
