//! Format-independent coverage values. The decoder fills `Ratio`s from
//! document elements; every later stage (rules, health, history) only reads
//! them.

use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CovError, Result};

/// Accepts `n/d`, `p% (n/d)` (spaces around `/` allowed) and a bare `n`.
static VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[0-9.]+\s*%\s*)?\(?\s*([0-9]+(?:\.[0-9]*)?(?:[eE][-+]?[0-9]+)?)\s*(?:/\s*([0-9]+(?:\.[0-9]*)?(?:[eE][-+]?[0-9]+)?)\s*)?\)?\s*$",
    )
    .unwrap()
});

/// The seven independently measured coverage metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Statement,
    Branch,
    BasisPath,
    Mcdc,
    Function,
    FunctionCall,
    Complexity,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Statement,
        MetricKind::Branch,
        MetricKind::BasisPath,
        MetricKind::Mcdc,
        MetricKind::Function,
        MetricKind::FunctionCall,
        MetricKind::Complexity,
    ];

    /// Kinds that take part in health scoring. Complexity is trend-only.
    pub const SCORED: [MetricKind; 6] = [
        MetricKind::Statement,
        MetricKind::Branch,
        MetricKind::BasisPath,
        MetricKind::Mcdc,
        MetricKind::Function,
        MetricKind::FunctionCall,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable identifier used in the database and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Statement => "statement",
            MetricKind::Branch => "branch",
            MetricKind::BasisPath => "basis_path",
            MetricKind::Mcdc => "mcdc",
            MetricKind::Function => "function",
            MetricKind::FunctionCall => "function_call",
            MetricKind::Complexity => "complexity",
        }
    }

    /// The `type` attribute value used by coverage documents.
    pub fn type_attr(self) -> &'static str {
        match self {
            MetricKind::Statement => "statement, %",
            MetricKind::Branch => "branch, %",
            MetricKind::BasisPath => "basispath, %",
            MetricKind::Mcdc => "mcdc, %",
            MetricKind::Function => "function, %",
            MetricKind::FunctionCall => "functioncall, %",
            MetricKind::Complexity => "complexity, %",
        }
    }

    /// Human readable name, as used in health explanations.
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Statement => "Statement",
            MetricKind::Branch => "Branch",
            MetricKind::BasisPath => "Basis Path",
            MetricKind::Mcdc => "MC/DC",
            MetricKind::Function => "Function",
            MetricKind::FunctionCall => "Function Call",
            MetricKind::Complexity => "Complexity",
        }
    }

    /// Resolve a document `type` attribute. Unknown kinds are a hard error.
    pub fn from_type_attr(attr: &str) -> Result<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|k| k.type_attr() == attr)
            .ok_or_else(|| CovError::IllegalMetricKind(attr.to_string()))
    }
}

impl FromStr for MetricKind {
    type Err = CovError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CovError::IllegalMetricKind(s.to_string()))
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Items covered over items measurable for one metric.
///
/// A ratio starts uninitialized ("never measured"), which is distinct from a
/// measured `0/0`. Merging accumulates numerator and denominator separately so
/// that larger environments weigh more in the combined percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    numerator: f64,
    denominator: f64,
    initialized: bool,
}

impl Ratio {
    pub fn new(numerator: f64, denominator: f64) -> Self {
        Self {
            numerator,
            denominator,
            initialized: true,
        }
    }

    /// Parse a document value. Returns `None` when the text is not a
    /// recognizable `n/d`, `p% (n/d)` or bare number.
    pub fn parse(value: &str) -> Option<Self> {
        let caps = VALUE_RE.captures(value)?;
        let numerator: f64 = caps[1].parse().ok()?;
        let denominator: f64 = match caps.get(2) {
            Some(d) => d.as_str().parse().ok()?,
            None => 0.0,
        };
        if !numerator.is_finite() || !denominator.is_finite() {
            return None;
        }
        Some(Self::new(numerator, denominator))
    }

    #[must_use]
    pub fn numerator(&self) -> f64 {
        self.numerator
    }

    #[must_use]
    pub fn denominator(&self) -> f64 {
        self.denominator
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Unrounded percentage, 0.0 when nothing is measurable.
    #[must_use]
    pub fn percentage_float(&self) -> f64 {
        if self.denominator == 0.0 {
            0.0
        } else {
            100.0 * self.numerator / self.denominator
        }
    }

    /// Percentage rounded half-up to an integer in `[0, 100]`.
    #[must_use]
    pub fn percentage(&self) -> u32 {
        (self.percentage_float() + 0.5).floor().clamp(0.0, 100.0) as u32
    }

    /// False when more items are covered than exist. Such values come from
    /// historical data and are only worth a warning.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.denominator == 0.0 || self.numerator <= self.denominator
    }

    /// Accumulate another measurement into this one.
    pub fn merge(&mut self, other: Ratio) {
        if !other.initialized {
            return;
        }
        self.numerator += other.numerator;
        self.denominator += other.denominator;
        self.initialized = true;
    }

    /// Replace the value outright.
    pub fn set(&mut self, other: Ratio) {
        *self = other;
    }
}

impl Add for Ratio {
    type Output = Ratio;

    fn add(mut self, rhs: Ratio) -> Ratio {
        self.merge(rhs);
        self
    }
}

impl AddAssign for Ratio {
    fn add_assign(&mut self, rhs: Ratio) {
        self.merge(rhs);
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// One ratio per metric kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratios([Ratio; 7]);

impl Ratios {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, &Ratio)> {
        MetricKind::ALL.into_iter().map(move |k| (k, &self.0[k.index()]))
    }

    /// True if any scored kind was measured.
    #[must_use]
    pub fn has_coverage(&self) -> bool {
        MetricKind::SCORED
            .into_iter()
            .any(|k| self[k].is_initialized())
    }
}

impl Index<MetricKind> for Ratios {
    type Output = Ratio;

    fn index(&self, kind: MetricKind) -> &Ratio {
        &self.0[kind.index()]
    }
}

impl IndexMut<MetricKind> for Ratios {
    fn index_mut(&mut self, kind: MetricKind) -> &mut Ratio {
        &mut self.0[kind.index()]
    }
}

/// Hierarchy levels a document can open below its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Environment,
    Unit,
    Subprogram,
}

/// One step of a parsed coverage document, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// A hierarchy element opened.
    Enter { scope: Scope, name: String },
    /// The innermost open hierarchy element closed.
    Leave,
    /// A per-node measurement, merged additively into the enclosing node.
    Coverage { kind: MetricKind, value: Ratio },
    /// A pre-aggregated whole-build figure that replaces the root value.
    Combined { kind: MetricKind, value: Ratio },
    /// A measurement whose value could not be read. Skipped by the decoder.
    Malformed { kind: MetricKind, value: String },
}

/// The result of parsing a single coverage document.
#[derive(Debug, Clone, Default)]
pub struct CoverageDocument {
    pub version: Option<String>,
    pub events: Vec<DocumentEvent>,
}

impl CoverageDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measurements in the document, whatever their scope.
    pub fn measurements(&self) -> impl Iterator<Item = (MetricKind, &Ratio)> {
        self.events.iter().filter_map(|e| match e {
            DocumentEvent::Coverage { kind, value } | DocumentEvent::Combined { kind, value } => {
                Some((*kind, value))
            }
            _ => None,
        })
    }
}
