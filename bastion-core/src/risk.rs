//! Risk assessment types.

use crate::constants::{RISK_CUT_CRITICAL, RISK_CUT_ELEVATED, RISK_CUT_WARNING};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Safe,
    Elevated,
    Warning,
    Critical,
}

impl RiskLevel {
    /// Map an additive score onto the fixed cut points.
    pub fn from_score(score: u32) -> Self {
        if score >= RISK_CUT_CRITICAL {
            RiskLevel::Critical
        } else if score >= RISK_CUT_WARNING {
            RiskLevel::Warning
        } else if score >= RISK_CUT_ELEVATED {
            RiskLevel::Elevated
        } else {
            RiskLevel::Safe
        }
    }

    /// Levels that warrant an explicit warning rather than a state update.
    pub fn needs_attention(&self) -> bool {
        matches!(self, RiskLevel::Warning | RiskLevel::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Elevated => "elevated",
            RiskLevel::Warning => "warning",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named signal that contributed to the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub value: u64,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub factors: Vec<RiskFactor>,
    pub recommendation: Option<String>,
}
