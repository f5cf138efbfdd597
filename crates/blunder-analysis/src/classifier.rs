//! Blunder classification.
//!
//! Two independent rules, applied in a fixed order:
//!
//! 1. The primary rule flags a move as a blunder when the position was
//!    roughly equal beforehand and the mover's evaluation dropped by at least
//!    the threshold.
//! 2. The secondary pass ([`BlunderClassifier::rescan`]) looks at everything
//!    the primary rule left alone and tags smaller swings as `moderate` or
//!    `subtle`.

use crate::records::PositionEvaluation;
use serde::{Deserialize, Serialize};
use shakmaty::Color;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Why a move was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlunderKind {
    /// Primary rule: equal position thrown away.
    Blunder,
    /// Secondary pass, larger band.
    Moderate,
    /// Secondary pass, smaller band.
    Subtle,
}

impl BlunderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlunderKind::Blunder => "blunder",
            BlunderKind::Moderate => "moderate",
            BlunderKind::Subtle => "subtle",
        }
    }
}

impl fmt::Display for BlunderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Puzzle difficulty, 1 (easiest) to 5 (hardest).
///
/// Bigger mistakes make easier puzzles: the refutation is more obvious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const VERY_EASY: Difficulty = Difficulty(1);
    pub const EASY: Difficulty = Difficulty(2);
    pub const INTERMEDIATE: Difficulty = Difficulty(3);
    pub const CHALLENGING: Difficulty = Difficulty(4);
    pub const ADVANCED: Difficulty = Difficulty(5);

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Very Easy",
            2 => "Easy",
            3 => "Intermediate",
            4 => "Challenging",
            _ => "Advanced",
        }
    }
}

/// Errors from building a classification policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Equal band is inverted: low {low} > high {high}")]
    InvertedBand { low: i32, high: i32 },
    #[error("Blunder threshold must be positive, got {0}")]
    NonPositiveThreshold(i32),
    #[error("Difficulty breakpoints must be strictly descending: {0:?}")]
    UnorderedBreakpoints([i32; 4]),
    #[error("Invalid strictness level: {0}. Valid levels: strict, standard, relaxed, all")]
    UnknownStrictness(String),
}

/// Thresholds driving both classification passes.
///
/// Immutable once handed to a [`BlunderClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlunderPolicy {
    /// Lowest pre-move evaluation still considered equal.
    pub band_low: i32,
    /// Highest pre-move evaluation still considered equal.
    pub band_high: i32,
    /// Minimum drop, in centipawns, for the primary rule.
    pub threshold: i32,
    /// Drops at or above these map to difficulty 1, 2, 3 and 4.
    pub difficulty_breakpoints: [i32; 4],
    /// Secondary pass: `|prev_eval|` must be below this for `moderate`.
    pub moderate_prev_limit: i32,
    /// Secondary pass: `|prev_eval|` must be below this for `subtle`.
    pub subtle_prev_limit: i32,
}

impl Default for BlunderPolicy {
    fn default() -> Self {
        Self {
            band_low: -200,
            band_high: 200,
            threshold: 500,
            difficulty_breakpoints: [1500, 1200, 900, 600],
            moderate_prev_limit: 500,
            subtle_prev_limit: 300,
        }
    }
}

impl BlunderPolicy {
    /// Same policy with a different primary threshold.
    pub fn with_threshold(self, threshold: i32) -> Self {
        Self { threshold, ..self }
    }

    /// Check the policy is internally consistent.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.band_low > self.band_high {
            return Err(PolicyError::InvertedBand {
                low: self.band_low,
                high: self.band_high,
            });
        }
        if self.threshold <= 0 {
            return Err(PolicyError::NonPositiveThreshold(self.threshold));
        }
        if self.difficulty_breakpoints.windows(2).any(|w| w[0] <= w[1]) {
            return Err(PolicyError::UnorderedBreakpoints(self.difficulty_breakpoints));
        }
        Ok(())
    }
}

/// Named policy presets.
///
/// All four presets currently resolve to the same band and threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Strict,
    #[default]
    Standard,
    Relaxed,
    All,
}

impl Strictness {
    pub fn policy(self) -> BlunderPolicy {
        BlunderPolicy::default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Standard => "standard",
            Strictness::Relaxed => "relaxed",
            Strictness::All => "all",
        }
    }
}

impl FromStr for Strictness {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Strictness::Strict),
            "standard" => Ok(Strictness::Standard),
            "relaxed" => Ok(Strictness::Relaxed),
            "all" => Ok(Strictness::All),
            other => Err(PolicyError::UnknownStrictness(other.to_string())),
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one evaluated move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// `prev_eval - curr_eval`, positive when the mover lost ground.
    pub eval_change: i32,
    pub is_blunder: bool,
    pub kind: Option<BlunderKind>,
    /// Difficulty of the puzzle this move would make.
    pub difficulty: Difficulty,
}

/// Applies a [`BlunderPolicy`] to evaluation pairs.
#[derive(Debug, Clone, Default)]
pub struct BlunderClassifier {
    policy: BlunderPolicy,
}

impl BlunderClassifier {
    pub fn new(policy: BlunderPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &BlunderPolicy {
        &self.policy
    }

    /// Primary rule.
    ///
    /// Both evaluations are from the mover's point of view. A blunder needs
    /// an equal starting position; a collapse from an already lopsided
    /// position does not count.
    pub fn classify(&self, prev_eval: i32, curr_eval: i32, mover: Color) -> Classification {
        let eval_change = prev_eval.saturating_sub(curr_eval);
        let was_equal = (self.policy.band_low..=self.policy.band_high).contains(&prev_eval);
        let is_blunder = was_equal && eval_change >= self.policy.threshold;

        debug!(
            ?mover,
            prev_eval, curr_eval, eval_change, was_equal, is_blunder, "classified move"
        );

        Classification {
            eval_change,
            is_blunder,
            kind: is_blunder.then_some(BlunderKind::Blunder),
            difficulty: self.difficulty(eval_change.saturating_abs()),
        }
    }

    /// Map an absolute evaluation drop to a difficulty tier.
    pub fn difficulty(&self, eval_change: i32) -> Difficulty {
        let [very_easy, easy, intermediate, challenging] = self.policy.difficulty_breakpoints;
        if eval_change >= very_easy {
            Difficulty::VERY_EASY
        } else if eval_change >= easy {
            Difficulty::EASY
        } else if eval_change >= intermediate {
            Difficulty::INTERMEDIATE
        } else if eval_change >= challenging {
            Difficulty::CHALLENGING
        } else {
            Difficulty::ADVANCED
        }
    }

    /// Secondary rule for a single move. Never applies to primary blunders;
    /// callers check that first.
    pub fn secondary_kind(&self, prev_eval: i32, eval_change: i32, threshold: i32) -> Option<BlunderKind> {
        let change = i64::from(eval_change).abs();
        let prev = i64::from(prev_eval).abs();
        let threshold = i64::from(threshold);

        if 2 * change >= threshold && prev < i64::from(self.policy.moderate_prev_limit) {
            Some(BlunderKind::Moderate)
        } else if 3 * change >= threshold && prev < i64::from(self.policy.subtle_prev_limit) {
            Some(BlunderKind::Subtle)
        } else {
            None
        }
    }

    /// Secondary pass over recorded evaluations.
    ///
    /// Records already flagged by the primary rule are skipped. Matches are
    /// returned as new records tagged with their kind; the input is left
    /// untouched. `threshold` defaults to the policy threshold.
    pub fn rescan(
        &self,
        evaluations: &[PositionEvaluation],
        threshold: Option<i32>,
    ) -> Vec<PositionEvaluation> {
        let threshold = threshold
            .filter(|t| *t > 0)
            .unwrap_or(self.policy.threshold);

        evaluations
            .iter()
            .filter(|e| !e.is_blunder())
            .filter_map(|e| {
                self.secondary_kind(e.prev_eval(), e.eval_change(), threshold)
                    .map(|kind| e.tagged(kind))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> BlunderClassifier {
        BlunderClassifier::default()
    }

    fn evaluation(prev_eval: i32, curr_eval: i32, is_blunder: bool) -> PositionEvaluation {
        PositionEvaluation::new(
            "game",
            1,
            "8/8/8/8/8/8/8/8 w - - 0 1",
            Color::White,
            "e4",
            prev_eval,
            curr_eval,
            is_blunder.then_some(BlunderKind::Blunder),
        )
    }

    #[test]
    fn test_scenario_equal_position_thrown_away() {
        let c = classifier().classify(50, -460, Color::White);
        assert_eq!(c.eval_change, 510);
        assert!(c.is_blunder);
        assert_eq!(c.kind, Some(BlunderKind::Blunder));
        assert_eq!(c.difficulty, Difficulty::ADVANCED);
        assert_eq!(c.difficulty.label(), "Advanced");
    }

    #[test]
    fn test_unequal_position_is_not_blunder() {
        let c = classifier().classify(250, -700, Color::White);
        assert_eq!(c.eval_change, 950);
        assert!(!c.is_blunder);
        assert_eq!(c.kind, None);
    }

    #[test]
    fn test_black_mover_same_rule() {
        let c = classifier().classify(-150, -800, Color::Black);
        assert!(c.is_blunder);
        assert_eq!(c.difficulty, Difficulty::CHALLENGING);
    }

    #[test]
    fn test_band_edges() {
        let c = classifier();
        assert!(c.classify(200, -300, Color::White).is_blunder);
        assert!(c.classify(-200, -700, Color::White).is_blunder);
        assert!(!c.classify(201, -299, Color::White).is_blunder);
        assert!(!c.classify(-201, -701, Color::White).is_blunder);
    }

    #[test]
    fn test_threshold_edge() {
        let c = classifier();
        assert!(c.classify(0, -500, Color::White).is_blunder);
        assert!(!c.classify(0, -499, Color::White).is_blunder);
    }

    #[test]
    fn test_improvement_is_not_blunder() {
        assert!(!classifier().classify(0, 900, Color::White).is_blunder);
    }

    #[test]
    fn test_difficulty_breakpoints() {
        let c = classifier();
        assert_eq!(c.difficulty(1500).level(), 1);
        assert_eq!(c.difficulty(1499).level(), 2);
        assert_eq!(c.difficulty(1200).level(), 2);
        assert_eq!(c.difficulty(900).level(), 3);
        assert_eq!(c.difficulty(600).level(), 4);
        assert_eq!(c.difficulty(599).level(), 5);
        assert_eq!(c.difficulty(0).level(), 5);
    }

    #[test]
    fn test_difficulty_labels() {
        assert_eq!(Difficulty::VERY_EASY.label(), "Very Easy");
        assert_eq!(Difficulty::EASY.label(), "Easy");
        assert_eq!(Difficulty::INTERMEDIATE.label(), "Intermediate");
        assert_eq!(Difficulty::CHALLENGING.label(), "Challenging");
        assert_eq!(Difficulty::ADVANCED.label(), "Advanced");
    }

    #[test]
    fn test_mate_sentinel_swing() {
        let c = classifier().classify(0, -9999, Color::White);
        assert!(c.is_blunder);
        assert_eq!(c.eval_change, 9999);
        assert_eq!(c.difficulty, Difficulty::VERY_EASY);
    }

    #[test]
    fn test_policy_validation() {
        assert!(BlunderPolicy::default().validate().is_ok());

        let inverted = BlunderPolicy {
            band_low: 100,
            band_high: -100,
            ..BlunderPolicy::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(PolicyError::InvertedBand { .. })
        ));

        assert_eq!(
            BlunderPolicy::default().with_threshold(0).validate(),
            Err(PolicyError::NonPositiveThreshold(0))
        );

        let unordered = BlunderPolicy {
            difficulty_breakpoints: [600, 900, 1200, 1500],
            ..BlunderPolicy::default()
        };
        assert!(matches!(
            unordered.validate(),
            Err(PolicyError::UnorderedBreakpoints(_))
        ));
        assert!(BlunderClassifier::new(unordered).is_err());
    }

    #[test]
    fn test_strictness_presets() {
        for name in ["strict", "standard", "relaxed", "all", "STANDARD"] {
            let s: Strictness = name.parse().unwrap();
            assert_eq!(s.policy(), BlunderPolicy::default());
        }
        assert!(matches!(
            "lenient".parse::<Strictness>(),
            Err(PolicyError::UnknownStrictness(_))
        ));
        assert_eq!(Strictness::default(), Strictness::Standard);
    }

    #[test]
    fn test_secondary_kinds() {
        let c = classifier();
        // T = 500: moderate needs |change| >= 250, subtle >= 166.67
        assert_eq!(c.secondary_kind(100, 250, 500), Some(BlunderKind::Moderate));
        assert_eq!(c.secondary_kind(-499, -300, 500), Some(BlunderKind::Moderate));
        assert_eq!(c.secondary_kind(500, 300, 500), None);
        assert_eq!(c.secondary_kind(0, 249, 500), Some(BlunderKind::Subtle));
        assert_eq!(c.secondary_kind(0, 167, 500), Some(BlunderKind::Subtle));
        assert_eq!(c.secondary_kind(0, 166, 500), None);
        assert_eq!(c.secondary_kind(299, 200, 500), Some(BlunderKind::Subtle));
        assert_eq!(c.secondary_kind(300, 200, 500), None);
    }

    #[test]
    fn test_rescan_skips_primary_blunders() {
        let c = classifier();
        let flagged = evaluation(50, -460, true);
        let candidate = evaluation(50, -250, false);
        let quiet = evaluation(10, 0, false);

        let input = vec![flagged.clone(), candidate.clone(), quiet];
        let found = c.rescan(&input, None);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].move_san(), candidate.move_san());
        assert_eq!(found[0].blunder_type(), Some(BlunderKind::Moderate));
        assert!(!found[0].is_blunder());
        // inputs are untouched
        assert_eq!(input[1].blunder_type(), None);
        assert_eq!(input[0], flagged);
    }

    #[test]
    fn test_rescan_custom_threshold() {
        let c = classifier();
        let input = vec![evaluation(0, -100, false)];
        assert!(c.rescan(&input, None).is_empty());
        assert_eq!(
            c.rescan(&input, Some(200))[0].blunder_type(),
            Some(BlunderKind::Moderate)
        );
        // zero falls back to the policy threshold
        assert!(c.rescan(&input, Some(0)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_equal_band_large_drop_is_blunder(prev in -200i32..=200, drop in 500i32..20_000) {
            let c = classifier().classify(prev, prev - drop, Color::White);
            prop_assert!(c.is_blunder);
            prop_assert_eq!(c.eval_change, drop);
        }

        #[test]
        fn prop_outside_band_never_blunder(
            prev in prop_oneof![-9999i32..-200, 201i32..=9999],
            curr in -9999i32..=9999,
        ) {
            prop_assert!(!classifier().classify(prev, curr, Color::Black).is_blunder);
        }

        #[test]
        fn prop_eval_change_is_difference(prev in -9999i32..=9999, curr in -9999i32..=9999) {
            prop_assert_eq!(classifier().classify(prev, curr, Color::White).eval_change, prev - curr);
        }

        #[test]
        fn prop_difficulty_non_increasing(a in 0i32..30_000, b in 0i32..30_000) {
            let c = classifier();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(c.difficulty(hi) <= c.difficulty(lo));
            prop_assert!((1..=5).contains(&c.difficulty(a).level()));
        }

        #[test]
        fn prop_secondary_pass_never_reflags(prev in -200i32..=200, drop in 500i32..5_000) {
            let c = classifier();
            let record = evaluation(prev, prev - drop, true);
            prop_assert!(c.rescan(&[record], None).is_empty());
        }
    }
}
