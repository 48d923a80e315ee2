//! Behaviour logs and fitness expressions.
//!
//! The simulation records what each organism did into a [`DataMap`]; the
//! evolver reduces that log to a single fitness value with a configured
//! [`FitnessExpr`] such as `DM_AVE[score]`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{TpgError, TpgResult};

/// Per-organism log of named numeric observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataMap {
    values: HashMap<String, Vec<f64>>,
}

impl DataMap {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more observation under `key`.
    pub fn append(&mut self, key: &str, value: f64) {
        self.values.entry(key.to_string()).or_default().push(value);
    }

    /// Replace everything recorded under `key` with a single value.
    pub fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), vec![value]);
    }

    /// All observations recorded under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.values.get(key).map(Vec::as_slice)
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forget every observation.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// How a [`FitnessExpr`] reduces the observations under one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Arithmetic mean.
    Ave,
    /// Sum.
    Sum,
    /// Largest observation.
    Max,
    /// Smallest observation.
    Min,
}

impl Reduction {
    const fn tag(self) -> &'static str {
        match self {
            Self::Ave => "DM_AVE",
            Self::Sum => "DM_SUM",
            Self::Max => "DM_MAX",
            Self::Min => "DM_MIN",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "DM_AVE" => Some(Self::Ave),
            "DM_SUM" => Some(Self::Sum),
            "DM_MAX" => Some(Self::Max),
            "DM_MIN" => Some(Self::Min),
            _ => None,
        }
    }

    fn reduce(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Ave => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

/// A parsed fitness expression.
///
/// Grammar: `DM_AVE[key]`, `DM_SUM[key]`, `DM_MAX[key]`, `DM_MIN[key]`, or
/// a numeric literal. Surrounding whitespace is ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum FitnessExpr {
    /// A constant fitness.
    Literal(f64),
    /// A reduction over the observations recorded under `key`.
    Data {
        /// Reduction applied to the observations.
        reduction: Reduction,
        /// [`DataMap`] key to read.
        key: String,
    },
}

impl FitnessExpr {
    /// Parse an expression.
    ///
    /// # Errors
    ///
    /// Returns [`TpgError::FitnessExpr`] if `expr` matches neither form.
    pub fn parse(expr: &str) -> TpgResult<Self> {
        let trimmed = expr.trim();
        let reject = || TpgError::FitnessExpr {
            expr: expr.to_string(),
        };

        if let Some((tag, rest)) = trimmed.split_once('[') {
            let reduction = Reduction::from_tag(tag.trim()).ok_or_else(reject)?;
            let key = rest.strip_suffix(']').ok_or_else(reject)?.trim();
            if key.is_empty() || key.contains(['[', ']']) {
                return Err(reject());
            }
            return Ok(Self::Data {
                reduction,
                key: key.to_string(),
            });
        }

        trimmed.parse::<f64>().map(Self::Literal).map_err(|_| reject())
    }

    /// Evaluate against one organism's log. Missing or empty keys give 0.
    #[must_use]
    pub fn evaluate(&self, data: &DataMap) -> f64 {
        match self {
            Self::Literal(v) => *v,
            Self::Data { reduction, key } => reduction.reduce(data.get(key).unwrap_or(&[])),
        }
    }
}

impl FromStr for FitnessExpr {
    type Err = TpgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FitnessExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Data { reduction, key } => write!(f, "{}[{key}]", reduction.tag()),
        }
    }
}
