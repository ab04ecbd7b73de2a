//! Risk scoring.

use bastion_core::constants::{
    RISK_WEIGHT_CRITICAL_TIMEOUT, RISK_WEIGHT_HIGH_CHAIN_SHORT_TIMEOUT,
    RISK_WEIGHT_NEAR_MILESTONE, RISK_WEIGHT_WARNING_TIMEOUT,
};
use bastion_core::{ChainState, RiskAssessment, RiskFactor, RiskLevel, RiskThresholds};

/// Canned advice for a level. `None` for [`RiskLevel::Safe`].
pub fn advisory(level: RiskLevel) -> Option<&'static str> {
    match level {
        RiskLevel::Safe => None,
        RiskLevel::Elevated => Some("Chain timer is dropping, line up the next hit."),
        RiskLevel::Warning => Some("Chain timer is low, hit now to keep the chain alive."),
        RiskLevel::Critical => Some("Chain is about to break, hit immediately!"),
    }
}

/// Score `state` against `thresholds`.
///
/// Factors are additive. A chain with nothing on it, or one that already
/// ended and sits in cooldown, scores zero.
pub fn assess(state: &ChainState, thresholds: &RiskThresholds) -> RiskAssessment {
    let mut factors = Vec::new();
    let ended = state.timeout_secs == 0 && state.cooldown_secs > 0;

    if state.is_running() && !ended {
        let timeout = state.timeout_secs;
        if timeout <= thresholds.critical_timeout_secs {
            factors.push(factor("critical_timeout", timeout, RISK_WEIGHT_CRITICAL_TIMEOUT));
        } else if timeout <= thresholds.warning_timeout_secs {
            factors.push(factor("warning_timeout", timeout, RISK_WEIGHT_WARNING_TIMEOUT));
        }

        let short = timeout <= thresholds.short_timeout_secs;
        if short && state.current >= thresholds.high_chain_count {
            factors.push(factor(
                "high_chain_short_timeout",
                state.current,
                RISK_WEIGHT_HIGH_CHAIN_SHORT_TIMEOUT,
            ));
        }
        if let Some(next) = state.next_milestone() {
            if short && next.remaining <= thresholds.milestone_proximity {
                factors.push(factor("near_milestone", next.remaining, RISK_WEIGHT_NEAR_MILESTONE));
            }
        }
    }

    let score = factors.iter().map(|f| f.weight).sum();
    let level = RiskLevel::from_score(score);
    RiskAssessment {
        level,
        score,
        factors,
        recommendation: advisory(level).map(str::to_string),
    }
}

fn factor(name: &str, value: u64, weight: u32) -> RiskFactor {
    RiskFactor {
        name: name.to_string(),
        value,
        weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::constants::DEFAULT_BONUS_MILESTONES;
    use bastion_core::{ChainReading, Timestamp};

    fn chain(current: u64, timeout_secs: u64) -> ChainState {
        ChainState::from_reading(
            ChainReading {
                current,
                max: 1000,
                timeout_secs,
                cooldown_secs: 0,
            },
            &DEFAULT_BONUS_MILESTONES,
            Timestamp::default(),
        )
    }

    fn names(assessment: &RiskAssessment) -> Vec<&str> {
        assessment.factors.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_calm_chain_is_safe() {
        let risk = assess(&chain(30, 280), &RiskThresholds::default());
        assert_eq!(risk.level, RiskLevel::Safe);
        assert_eq!(risk.score, 0);
        assert_eq!(risk.recommendation, None);
    }

    #[test]
    fn test_critical_timeout_alone_is_critical() {
        let risk = assess(&chain(30, 45), &RiskThresholds::default());
        assert_eq!(names(&risk), vec!["critical_timeout"]);
        assert_eq!(risk.level, RiskLevel::Critical);
        assert_eq!(
            risk.recommendation.as_deref(),
            Some("Chain is about to break, hit immediately!")
        );
    }

    #[test]
    fn test_warning_band_excludes_critical() {
        let risk = assess(&chain(30, 100), &RiskThresholds::default());
        assert_eq!(names(&risk), vec!["warning_timeout"]);
        assert_eq!(risk.score, 30);
        assert_eq!(risk.level, RiskLevel::Warning);

        let edge = assess(&chain(30, 60), &RiskThresholds::default());
        assert_eq!(names(&edge), vec!["critical_timeout"]);
    }

    #[test]
    fn test_high_chain_with_short_timeout_is_elevated() {
        let risk = assess(&chain(150, 140), &RiskThresholds::default());
        assert_eq!(names(&risk), vec!["high_chain_short_timeout"]);
        assert_eq!(risk.level, RiskLevel::Elevated);
        assert_eq!(
            risk.recommendation.as_deref(),
            Some("Chain timer is dropping, line up the next hit.")
        );
    }

    #[test]
    fn test_factors_add_up() {
        // 245 is 5 short of 250: near milestone, high chain, warning band.
        let risk = assess(&chain(245, 110), &RiskThresholds::default());
        assert_eq!(
            names(&risk),
            vec!["warning_timeout", "high_chain_short_timeout", "near_milestone"]
        );
        assert_eq!(risk.score, 65);
        assert_eq!(risk.level, RiskLevel::Critical);
    }

    #[test]
    fn test_near_milestone_needs_short_timeout() {
        let risk = assess(&chain(95, 200), &RiskThresholds::default());
        assert!(risk.factors.is_empty());

        let risk = assess(&chain(95, 150), &RiskThresholds::default());
        assert_eq!(names(&risk), vec!["near_milestone"]);
        assert_eq!(risk.level, RiskLevel::Elevated);
    }

    #[test]
    fn test_empty_or_ended_chain_has_no_risk() {
        let risk = assess(&chain(0, 0), &RiskThresholds::default());
        assert_eq!(risk, RiskAssessment::default());

        let mut ended = chain(120, 0);
        ended.cooldown_secs = 3600;
        assert_eq!(assess(&ended, &RiskThresholds::default()).level, RiskLevel::Safe);
    }

    #[test]
    fn test_thresholds_are_respected() {
        let thresholds = RiskThresholds {
            critical_timeout_secs: 20,
            warning_timeout_secs: 40,
            ..RiskThresholds::default()
        };
        assert_eq!(assess(&chain(30, 45), &thresholds).level, RiskLevel::Safe);
        assert_eq!(assess(&chain(30, 30), &thresholds).level, RiskLevel::Warning);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use bastion_core::constants::DEFAULT_BONUS_MILESTONES;
    use bastion_test_utils::generators::{arb_chain_reading, arb_timestamp};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_assess_is_pure(reading in arb_chain_reading(), at in arb_timestamp()) {
            let state = ChainState::from_reading(reading, &DEFAULT_BONUS_MILESTONES, at);
            let thresholds = RiskThresholds::default();
            prop_assert_eq!(assess(&state, &thresholds), assess(&state.clone(), &thresholds));
        }

        #[test]
        fn prop_score_matches_factors_and_level(reading in arb_chain_reading(), at in arb_timestamp()) {
            let state = ChainState::from_reading(reading, &DEFAULT_BONUS_MILESTONES, at);
            let risk = assess(&state, &RiskThresholds::default());
            prop_assert_eq!(risk.score, risk.factors.iter().map(|f| f.weight).sum::<u32>());
            prop_assert_eq!(risk.level, RiskLevel::from_score(risk.score));
            prop_assert_eq!(risk.recommendation.is_some(), risk.level != RiskLevel::Safe);
        }
    }
}
