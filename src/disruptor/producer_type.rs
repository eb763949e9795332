//! Producer Type
//!
//! Chooses between the single-producer sequencer (no CAS, one publishing
//! thread) and the multi-producer sequencer (CAS claims plus an
//! availability buffer).

use serde::{Deserialize, Serialize};

/// Which sequencer a ring buffer is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    /// Exactly one thread publishes
    Single,

    /// Any number of threads publish concurrently
    #[default]
    Multi,
}

impl ProducerType {
    /// Whether this is the single producer variant
    pub fn is_single(&self) -> bool {
        matches!(self, ProducerType::Single)
    }

    /// Whether this is the multi producer variant
    pub fn is_multi(&self) -> bool {
        matches!(self, ProducerType::Multi)
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerType::Single => write!(f, "Single"),
            ProducerType::Multi => write!(f, "Multi"),
        }
    }
}

impl std::str::FromStr for ProducerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(ProducerType::Single),
            "multi" => Ok(ProducerType::Multi),
            _ => Err(format!(
                "Invalid producer type: '{s}'. Valid values are 'single' or 'multi'"
            )),
        }
    }
}
