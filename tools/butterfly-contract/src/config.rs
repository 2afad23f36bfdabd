//! Contraction configuration

use butterfly_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::storage::EdgeStorageKind;

/// Witness-search settle budget while simulating a contraction
pub const SIMULATION_SEARCH_SPACE_SIZE: usize = 1000;
/// Witness-search settle budget for the real contraction
pub const FULL_SEARCH_SPACE_SIZE: usize = 2000;
/// Share of the ranked remaining nodes forming one round's candidate prefix
pub const DEFAULT_BATCH_FRACTION: f64 = 0.1;

/// Tuning knobs of the contraction engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractorConfig {
    /// Fraction of the priority-ranked remaining nodes considered per round
    pub batch_fraction: f64,
    pub simulation_search_space: usize,
    pub full_search_space: usize,
    /// Flush contracted nodes out of the working graph once more than
    /// `flush_fraction * core_factor * n_nodes` are contracted.
    /// 1.0 never flushes.
    pub flush_fraction: f64,
    /// Where flushed edges are kept until export
    pub edge_storage: EdgeStorageKind,
}

impl Default for ContractorConfig {
    fn default() -> Self {
        Self {
            batch_fraction: DEFAULT_BATCH_FRACTION,
            simulation_search_space: SIMULATION_SEARCH_SPACE_SIZE,
            full_search_space: FULL_SEARCH_SPACE_SIZE,
            flush_fraction: 0.65,
            edge_storage: EdgeStorageKind::InMemory,
        }
    }
}

impl ContractorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.batch_fraction > 0.0 && self.batch_fraction <= 1.0) {
            return Err(Error::invalid_config(format!("batch_fraction must be in (0, 1], got {}", self.batch_fraction)));
        }
        if !(self.flush_fraction > 0.0 && self.flush_fraction <= 1.0) {
            return Err(Error::invalid_config(format!("flush_fraction must be in (0, 1], got {}", self.flush_fraction)));
        }
        if self.simulation_search_space == 0 || self.full_search_space == 0 {
            return Err(Error::invalid_config("witness search budgets must be positive"));
        }
        Ok(())
    }
}

/// `core_factor` is the fraction of nodes to contract; 1.0 contracts everything
pub fn validate_core_factor(core_factor: f64) -> Result<()> {
    if core_factor > 0.0 && core_factor <= 1.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(format!("core_factor must be in (0, 1], got {}", core_factor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ContractorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation_search_space, 1000);
        assert_eq!(config.full_search_space, 2000);
        // A proper prefix, so re-simulated candidates can be deferred
        assert!(config.batch_fraction < 1.0);
    }

    #[test]
    fn test_rejects_out_of_range_fractions() {
        let config = ContractorConfig {
            batch_fraction: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ContractorConfig {
            flush_fraction: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_core_factor_bounds() {
        assert!(validate_core_factor(1.0).is_ok());
        assert!(validate_core_factor(0.5).is_ok());
        assert!(validate_core_factor(0.0).is_err());
        assert!(validate_core_factor(f64::NAN).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ContractorConfig = serde_json::from_str(r#"{"batch_fraction": 0.5}"#).unwrap();
        assert_eq!(config.batch_fraction, 0.5);
        assert_eq!(config.full_search_space, FULL_SEARCH_SPACE_SIZE);
    }
}
