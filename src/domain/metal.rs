use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grams in one troy ounce. Provider quotes are per troy ounce.
pub const GRAMS_PER_TROY_OUNCE: f64 = 31.1035;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetalType {
    Gold,
    Silver,
}

impl MetalType {
    pub const ALL: [MetalType; 2] = [MetalType::Gold, MetalType::Silver];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetalType::Gold => "gold",
            MetalType::Silver => "silver",
        }
    }

    /// ISO 4217 style commodity code used by most market-data APIs.
    pub fn symbol(&self) -> &'static str {
        match self {
            MetalType::Gold => "XAU",
            MetalType::Silver => "XAG",
        }
    }
}

impl fmt::Display for MetalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gold" | "xau" => Ok(MetalType::Gold),
            "silver" | "xag" => Ok(MetalType::Silver),
            other => Err(format!("unknown metal type '{}'", other)),
        }
    }
}
