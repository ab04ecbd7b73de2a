//! Risk level tracking across recomputations.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bastion_core::{ChainState, RiskAssessment, RiskLevel, RiskThresholds};
use bastion_events::{BastionEvent, EventBus};
use tracing::{info, warn};

use crate::scorer::assess;

/// Holds the latest assessment and announces changes.
///
/// Every recomputation publishes `ChainTick`. A level change publishes
/// `RiskLevelChanged`, and a change into `warning` or `critical` also
/// publishes `RiskWarning`.
#[derive(Debug)]
pub struct RiskTracker {
    events: EventBus,
    current: Mutex<RiskAssessment>,
}

impl RiskTracker {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            current: Mutex::new(RiskAssessment::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RiskAssessment> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> RiskAssessment {
        self.lock().clone()
    }

    pub fn level(&self) -> RiskLevel {
        self.lock().level
    }

    /// Adopt an assessment without announcing it (state restored at startup).
    pub fn prime(&self, state: &ChainState, thresholds: &RiskThresholds) -> RiskAssessment {
        let assessment = assess(state, thresholds);
        *self.lock() = assessment.clone();
        assessment
    }

    pub fn update(&self, state: &ChainState, thresholds: &RiskThresholds) -> RiskAssessment {
        let assessment = assess(state, thresholds);
        let previous = std::mem::replace(&mut *self.lock(), assessment.clone()).level;

        self.events.publish(BastionEvent::ChainTick {
            state: state.clone(),
        });
        if previous != assessment.level {
            info!(
                previous = previous.as_str(),
                level = assessment.level.as_str(),
                score = assessment.score,
                "Chain risk level changed"
            );
            self.events.publish(BastionEvent::RiskLevelChanged {
                previous,
                assessment: assessment.clone(),
            });
            if assessment.level.needs_attention() {
                warn!(
                    level = assessment.level.as_str(),
                    current = state.current,
                    timeout_secs = state.timeout_secs,
                    "Chain at risk"
                );
                self.events.publish(BastionEvent::RiskWarning {
                    assessment: assessment.clone(),
                });
            }
        }
        assessment
    }
}
