//! # Battecon: Parametric Techno-Economic Modeling for EV Battery Production
//!
//! Battecon estimates the manufacturing cost, physical production-factor
//! requirement (labour, capital, land) and environmental impact of an
//! electric-vehicle battery design from a set of design parameters.
//!
//! The crate is the propagation core of a larger assessment pipeline: an
//! external collaborator supplies a bill of materials (named quantities per
//! physical component) and baseline reference tables; battecon builds the
//! signed technology matrix, prices it, scales it with volume-ratio power
//! laws, resolves internally produced materials recursively, and propagates
//! a final-product demand through the network with a Moore-Penrose
//! pseudo-inverse.
//!
//! ## Pipeline
//!
//! ```text
//! design parameters + bill of materials
//!     -> technology matrix (signed: negative = input, positive = output)
//!     -> monetary / factor matrix  (pricing, scaling, internal prices)
//!     -> Leontief propagation      (scaling vector, total or per-process impact)
//! ```
//!
//! ## Example
//!
//! ```
//! use battecon::solvers::LeontiefSolver;
//! use nalgebra::{DMatrix, DVector};
//!
//! // Two materials, two processes; the second process consumes 2 units of
//! // the intermediate per unit of final product.
//! let a = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 0.0, 1.0]);
//! let y = DVector::from_vec(vec![5.0, 0.0]);
//! let q = DVector::from_vec(vec![3.0, 7.0]);
//!
//! let solver = LeontiefSolver::new();
//! let total = solver.propagate(&a, &y, &q).unwrap();
//! assert!((total - 85.0).abs() < 1e-9);
//! ```
//!
//! ## Modules
//!
//! - [`matrix`]: labeled technology/monetary matrix store
//! - [`formula`]: parsed throughput-ratio formula expressions
//! - [`config`]: baseline reference tables, price tables, exception rules
//! - [`cost`]: pricing, volume-ratio scaling, internal-price resolution,
//!   factor requirements and the matrix assembler
//! - [`solvers`]: Leontief propagation and batch evaluation
//!
//! ## Optional Features
//!
//! - **`parallel`**: parallel batch evaluation across independent design
//!   parameter sets using `rayon`.
//!
//! Enable features in your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! battecon = { version = "0.1", features = ["parallel"] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod config;
pub mod cost;
pub mod formula;
pub mod matrix;
pub mod solvers;

pub use config::{BaselineReferenceTables, PriceTables};
pub use cost::CostModel;
pub use matrix::LabeledMatrix;
pub use solvers::LeontiefSolver;

/// Result type for design-parameter lookups.
pub type ParameterResult<T> = Result<T, ParameterError>;

/// Errors raised by design-parameter lookups.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    /// The named parameter is absent from the set
    #[error("design parameter '{0}' is missing")]
    Missing(String),
    /// The named parameter exists but is categorical, not numeric
    #[error("design parameter '{0}' is not numeric")]
    NotNumeric(String),
}

/// A single design-parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Scalar quantity (capacity, mass, count, yield, ...)
    Numeric(f64),
    /// Categorical choice (chemistry name, cell format, ...)
    Categorical(String),
}

/// Immutable snapshot of the design parameters for one evaluation.
///
/// A set is built once, up front, and never mutated mid-computation; every
/// derived quantity of a run is a pure function of the snapshot, which keeps
/// a run deterministic and lets batch evaluation share snapshots across
/// threads.
///
/// # Example
///
/// ```
/// use battecon::DesignParameterSet;
///
/// let params = DesignParameterSet::new()
///     .with_numeric("battery_manufacturing_capacity", 250_000.0)
///     .with_numeric("cells_per_pack", 96.0)
///     .with_categorical("cathode_chemistry", "NMC811");
///
/// assert_eq!(params.numeric("cells_per_pack").unwrap(), 96.0);
/// assert!(params.numeric("unknown").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignParameterSet {
    values: HashMap<String, ParameterValue>,
}

impl DesignParameterSet {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        DesignParameterSet { values: HashMap::new() }
    }

    /// Builds a set from (name, value) pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, ParameterValue)>,
        K: Into<String>,
    {
        DesignParameterSet { values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }

    /// Adds a numeric parameter (builder style).
    pub fn with_numeric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), ParameterValue::Numeric(value));
        self
    }

    /// Adds a categorical parameter (builder style).
    pub fn with_categorical(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), ParameterValue::Categorical(value.into()));
        self
    }

    /// Returns the raw value, if present.
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// Returns a numeric parameter.
    ///
    /// # Errors
    ///
    /// [`ParameterError::Missing`] naming the key, or
    /// [`ParameterError::NotNumeric`] for a categorical value.
    pub fn numeric(&self, name: &str) -> ParameterResult<f64> {
        match self.values.get(name) {
            Some(ParameterValue::Numeric(v)) => Ok(*v),
            Some(ParameterValue::Categorical(_)) => {
                Err(ParameterError::NotNumeric(name.to_string()))
            }
            None => Err(ParameterError::Missing(name.to_string())),
        }
    }

    /// True if the parameter exists (numeric or categorical).
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// All numeric parameters as a variable map for formula evaluation.
    pub fn numeric_values(&self) -> HashMap<String, f64> {
        self.values
            .iter()
            .filter_map(|(k, v)| match v {
                ParameterValue::Numeric(x) => Some((k.clone(), *x)),
                ParameterValue::Categorical(_) => None,
            })
            .collect()
    }

    /// Number of parameters in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the snapshot holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Normalizes a human-readable component name to a parameter key.
///
/// Runs of non-alphanumeric characters collapse to a single underscore, a
/// trailing underscore is stripped, and the result is lowercased, so
/// `"Cell terminal (anode)"` becomes `"cell_terminal_anode"`. Material
/// weights in a [`DesignParameterSet`] are stored under these keys.
pub fn normalize_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    if out.ends_with('_') {
        out.pop();
    }
    out
}
