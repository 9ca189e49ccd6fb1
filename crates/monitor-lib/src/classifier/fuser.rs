//! Decision fusion for the two-model ensemble

use crate::models::{Decision, DecisionRule};

/// Thresholds and ensemble rule, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuserConfig {
    pub threshold_rf: f64,
    pub threshold_xgb: f64,
    pub rule: DecisionRule,
}

impl Default for FuserConfig {
    fn default() -> Self {
        Self {
            threshold_rf: 0.50,
            threshold_xgb: 0.50,
            rule: DecisionRule::Any,
        }
    }
}

/// Combines two model probabilities into one verdict
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionFuser {
    config: FuserConfig,
}

impl DecisionFuser {
    pub fn new(config: FuserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FuserConfig {
        &self.config
    }

    /// Number of models whose probability reaches its threshold
    pub fn votes(&self, p_rf: f64, p_xgb: f64) -> u8 {
        u8::from(p_rf >= self.config.threshold_rf) + u8::from(p_xgb >= self.config.threshold_xgb)
    }

    pub fn decide(&self, p_rf: f64, p_xgb: f64) -> Decision {
        let votes = self.votes(p_rf, p_xgb);
        let attack = match self.config.rule {
            DecisionRule::Any => votes >= 1,
            DecisionRule::Majority => votes >= 2,
            DecisionRule::All => votes == 2,
        };

        if attack {
            Decision::Attack
        } else {
            Decision::Benign
        }
    }
}
