//! Resource requirement translation.
//!
//! Converts string-keyed request/limit maps of human-readable quantities
//! (`"500m"`, `"1Gi"`) into a validated numeric resource model, failing fast
//! on the first malformed value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{Error, QuantityKind, Result};

/// The wildcard key resource configurations may carry as a per-step default.
pub const DEFAULT_STEP_KEY: &str = "*";

#[allow(clippy::expect_used)]
fn quantity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9]+)(?:\.([0-9]+))?(m|k|M|G|T|P|E|Ki|Mi|Gi|Ti|Pi|Ei)?$")
            .expect("quantity pattern is a valid literal")
    })
}

fn suffix_scale_millis(suffix: &str) -> Option<u128> {
    let scale = match suffix {
        "m" => 1,
        "" => 1_000,
        "k" => 1_000 * 1_000,
        "M" => 1_000_000 * 1_000,
        "G" => 1_000_000_000 * 1_000,
        "T" => 1_000_000_000_000 * 1_000,
        "P" => 1_000_000_000_000_000 * 1_000,
        "E" => 1_000_000_000_000_000_000 * 1_000,
        "Ki" => 1_024 * 1_000,
        "Mi" => 1_024 * 1_024 * 1_000,
        "Gi" => 1_024 * 1_024 * 1_024 * 1_000,
        "Ti" => 1_024 * 1_024 * 1_024 * 1_024 * 1_000,
        "Pi" => 1_024 * 1_024 * 1_024 * 1_024 * 1_024 * 1_000,
        "Ei" => 1_024 * 1_024 * 1_024 * 1_024 * 1_024 * 1_024 * 1_000,
        _ => return None,
    };
    Some(scale)
}

/// Error produced when a quantity string cannot be parsed.
#[derive(Debug, Clone, Error)]
#[error("unparsable quantity {raw:?}")]
pub struct ParseQuantityError {
    /// The offending raw string.
    pub raw: String,
}

/// A validated, non-negative resource quantity.
///
/// Stored in milli-units so CPU requests like `"500m"` stay exact; the
/// original string is kept for display and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    raw: String,
    millis: u128,
}

impl Quantity {
    /// Parses a human-readable quantity string.
    ///
    /// Accepts plain decimals plus SI (`m`, `k`, `M`, `G`, `T`, `P`, `E`)
    /// and binary (`Ki` through `Ei`) suffixes.
    ///
    /// # Errors
    ///
    /// Returns [`ParseQuantityError`] when the string does not match the
    /// quantity grammar.
    pub fn parse(raw: &str) -> std::result::Result<Self, ParseQuantityError> {
        let malformed = || ParseQuantityError {
            raw: raw.to_string(),
        };
        let captures = quantity_pattern().captures(raw).ok_or_else(malformed)?;

        let int_digits = captures.get(1).map_or("", |m| m.as_str());
        let frac_digits = captures.get(2).map_or("", |m| m.as_str());
        let suffix = captures.get(3).map_or("", |m| m.as_str());
        let scale = suffix_scale_millis(suffix).ok_or_else(malformed)?;

        // Fractions below milli-unit resolution would silently round.
        if frac_digits.len() > 9 {
            return Err(malformed());
        }

        let mut digits = String::with_capacity(int_digits.len() + frac_digits.len());
        digits.push_str(int_digits);
        digits.push_str(frac_digits);
        let number: u128 = digits.parse().map_err(|_| malformed())?;
        let divisor = 10u128.pow(frac_digits.len() as u32);

        let millis = number
            .checked_mul(scale)
            .map(|scaled| scaled / divisor)
            .ok_or_else(malformed)?;

        Ok(Self {
            raw: raw.to_string(),
            millis,
        })
    }

    /// Returns the quantity in milli-units.
    #[must_use]
    pub fn millis(&self) -> u128 {
        self.millis
    }

    /// Returns the quantity in whole units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self) -> f64 {
        self.millis as f64 / 1_000.0
    }

    /// Returns the original string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for Quantity {
    type Error = ParseQuantityError;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<Quantity> for String {
    fn from(quantity: Quantity) -> Self {
        quantity.raw
    }
}

/// Raw request/limit maps as declared in step configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Requested amounts per resource name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    /// Upper bounds per resource name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirements {
    /// Creates requirements from request and limit pairs.
    #[must_use]
    pub fn new<I, J, K, V>(requests: I, limits: J) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        J: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            requests: requests
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            limits: limits
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Validated request/limit pairs per named resource.
///
/// Created once per build and immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Parsed requests.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
    /// Parsed limits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

/// Translates raw requirements into a validated [`ResourceSpec`].
///
/// Request and limit maps are validated independently; the first unparsable
/// value fails the whole translation and no partial spec is returned.
///
/// # Errors
///
/// Returns [`Error::MalformedQuantity`] naming the offending resource and
/// raw string.
pub fn translate(requirements: &ResourceRequirements) -> Result<ResourceSpec> {
    let parse_map = |values: &BTreeMap<String, String>,
                     kind: QuantityKind|
     -> Result<BTreeMap<String, Quantity>> {
        values
            .iter()
            .map(|(resource, value)| {
                let quantity =
                    Quantity::parse(value).map_err(|_| Error::MalformedQuantity {
                        kind,
                        resource: resource.clone(),
                        value: value.clone(),
                    })?;
                Ok((resource.clone(), quantity))
            })
            .collect()
    };

    Ok(ResourceSpec {
        requests: parse_map(&requirements.requests, QuantityKind::Request)?,
        limits: parse_map(&requirements.limits, QuantityKind::Limit)?,
    })
}

/// Per-step resource requirements with a wildcard default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceConfiguration(BTreeMap<String, ResourceRequirements>);

impl ResourceConfiguration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requirements for one step.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>, requirements: ResourceRequirements) -> Self {
        self.0.insert(step.into(), requirements);
        self
    }

    /// Returns the requirements for a step, falling back to the `"*"`
    /// wildcard entry, then to empty requirements.
    #[must_use]
    pub fn for_step(&self, step: &str) -> ResourceRequirements {
        self.0
            .get(step)
            .or_else(|| self.0.get(DEFAULT_STEP_KEY))
            .cloned()
            .unwrap_or_default()
    }
}
