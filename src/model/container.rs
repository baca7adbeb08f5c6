//! Container identity and the small enums shared by staging and inventory rows.

use crate::error::{GateError, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container numbers are exactly 11 characters: letters and digits only.
static CONTAINER_NO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{11}$").expect("container number pattern is valid"));

/// A validated, upper-cased container number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerNo(String);

impl ContainerNo {
    /// Parse and normalise a container number entered at the gate.
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        let normalised = raw.trim().to_ascii_uppercase();
        if normalised.is_empty() {
            return Err(GateError::ValidationError(
                "container number is required".to_string(),
            ));
        }
        if normalised.chars().count() != 11 {
            return Err(GateError::ValidationError(format!(
                "container number '{normalised}' must be exactly 11 characters"
            )));
        }
        if !CONTAINER_NO_RE.is_match(&normalised) {
            return Err(GateError::ValidationError(format!(
                "container number '{normalised}' may only contain letters and digits"
            )));
        }
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContainerNo {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContainerNo> for String {
    fn from(value: ContainerNo) -> Self {
        value.0
    }
}

/// Gate direction of a staging entry or inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            other => Err(StoreError::Parse(format!("unknown gate direction '{other}'"))),
        }
    }
}

/// Load condition recorded at gate-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Condition {
    Empty,
    Full,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Empty => "EMPTY",
            Condition::Full => "FULL",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(Condition::Empty),
            "FULL" => Ok(Condition::Full),
            other => Err(StoreError::Parse(format!("unknown condition '{other}'"))),
        }
    }
}

/// Booking size bucket derived from a size/type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    Twenty,
    Forty,
    FortyFive,
}

impl SizeClass {
    /// Classify an ISO-style size/type code such as `20GP`, `40HC`, `45R1` or `L5G1`.
    pub fn from_size_type(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.starts_with("20") || code.starts_with('2') {
            Some(SizeClass::Twenty)
        } else if code.starts_with("45") || code.starts_with('L') {
            Some(SizeClass::FortyFive)
        } else if code.starts_with("40") || code.starts_with('4') {
            Some(SizeClass::Forty)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SizeClass::Twenty => "20'",
            SizeClass::Forty => "40'",
            SizeClass::FortyFive => "45'",
        }
    }
}
