use std::fmt;

use super::MxError;

/// One mail exchanger, exchange name lowercased without the trailing dot.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

impl fmt::Display for MxRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.preference, self.exchange)
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxStatus {
    Records(Vec<MxRecord>),
    NoRecords,
}

impl MxStatus {
    /// Sorts by preference and drops duplicates; an empty set is `NoRecords`.
    pub fn from_records(mut records: Vec<MxRecord>) -> Self {
        records.sort();
        records.dedup();
        if records.is_empty() {
            Self::NoRecords
        } else {
            Self::Records(records)
        }
    }

    pub fn records(&self) -> &[MxRecord] {
        match self {
            Self::Records(records) => records.as_slice(),
            Self::NoRecords => &[],
        }
    }

    /// The cached reachability answer for this status.
    pub fn reachability(&self) -> Result<(), MxError> {
        match self {
            Self::Records(_) => Ok(()),
            Self::NoRecords => Err(MxError::NoMxRecords),
        }
    }
}
