//! Chain snapshot types.

use crate::constants::UPCOMING_MILESTONE_COUNT;
use crate::error::RemoteError;
use crate::identity::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A bonus threshold ahead of the current chain count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusMilestone {
    pub threshold: u64,
    pub remaining: u64,
}

/// The next `count` thresholds strictly greater than `current`.
pub fn upcoming_milestones(current: u64, milestones: &[u64], count: usize) -> Vec<BonusMilestone> {
    milestones
        .iter()
        .copied()
        .filter(|threshold| *threshold > current)
        .take(count)
        .map(|threshold| BonusMilestone {
            threshold,
            remaining: threshold - current,
        })
        .collect()
}

/// One successful read of the chain resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainReading {
    pub current: u64,
    pub max: u64,
    pub timeout_secs: u64,
    pub cooldown_secs: u64,
}

impl ChainReading {
    /// Parse `{"chain": {"current", "max", "timeout", "cooldown"}}`. A bare
    /// object without the `chain` wrapper is accepted too.
    pub fn from_json(value: &JsonValue) -> Result<Self, RemoteError> {
        let chain = value.get("chain").unwrap_or(value);
        if !chain.is_object() {
            return Err(RemoteError::Decode {
                reason: "chain payload is not an object".to_string(),
            });
        }
        let field = |name: &str| -> Result<u64, RemoteError> {
            match chain.get(name) {
                None | Some(JsonValue::Null) => Ok(0),
                Some(v) => v
                    .as_u64()
                    .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                    .ok_or_else(|| RemoteError::Decode {
                        reason: format!("chain.{name} is not a non-negative number"),
                    }),
            }
        };
        let current = chain
            .get("current")
            .ok_or_else(|| RemoteError::Decode {
                reason: "chain.current missing".to_string(),
            })
            .and_then(|_| field("current"))?;
        Ok(Self {
            current,
            max: field("max")?,
            timeout_secs: field("timeout")?,
            cooldown_secs: field("cooldown")?,
        })
    }
}

/// Latest observed chain state.
///
/// Replaced wholesale on every successful poll. On a failed poll only the
/// error fields move, so stale numbers stay displayable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainState {
    pub current: u64,
    pub max: u64,
    pub timeout_secs: u64,
    pub cooldown_secs: u64,
    pub bonus_milestones: Vec<BonusMilestone>,
    pub last_updated: Option<Timestamp>,
    pub last_error_message: Option<String>,
    /// Sticky until cleared or a later poll succeeds.
    pub permission_error: bool,
}

impl ChainState {
    pub fn from_reading(reading: ChainReading, milestones: &[u64], now: Timestamp) -> Self {
        Self {
            current: reading.current,
            max: reading.max,
            timeout_secs: reading.timeout_secs,
            cooldown_secs: reading.cooldown_secs,
            bonus_milestones: upcoming_milestones(reading.current, milestones, UPCOMING_MILESTONE_COUNT),
            last_updated: Some(now),
            last_error_message: None,
            permission_error: false,
        }
    }

    pub fn record_failure(&mut self, message: impl Into<String>, permission: bool) {
        self.last_error_message = Some(message.into());
        self.permission_error |= permission;
    }

    pub fn next_milestone(&self) -> Option<&BonusMilestone> {
        self.bonus_milestones.first()
    }

    /// A chain with hits on it, i.e. something to lose.
    pub fn is_running(&self) -> bool {
        self.current > 0
    }
}
