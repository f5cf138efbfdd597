//! Summary statistics and human-readable formatting.

use crate::classifier::BlunderKind;
use crate::evaluation::MATE_SCORE;
use crate::records::{PositionEvaluation, PuzzleBlunder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Scores at or beyond this magnitude are treated as forced mates.
const MATE_DISPLAY_THRESHOLD: i32 = MATE_SCORE - 99;

/// Bucket edges for the evaluation-change histogram.
const CHANGE_BUCKETS: [i32; 10] = [0, 50, 100, 200, 300, 500, 800, 1000, 1500, 2000];

/// Format a centipawn score as pawns, e.g. `+1.25`, or as a mate.
pub fn format_eval(score: i32) -> String {
    if score >= MATE_DISPLAY_THRESHOLD {
        return "Mate".to_string();
    }
    if score <= -MATE_DISPLAY_THRESHOLD {
        return "Mated".to_string();
    }
    let pawns = f64::from(score) / 100.0;
    if score > 0 {
        format!("+{:.2}", pawns)
    } else {
        format!("{:.2}", pawns)
    }
}

/// Label for the change range starting at `lower`, e.g. `"50-100"`; the top
/// range is open, e.g. `"2000+"`.
pub fn change_range_label(lower: i32) -> String {
    match CHANGE_BUCKETS.iter().find(|edge| **edge > lower) {
        Some(upper) => format!("{}-{}", lower, upper),
        None => format!("{}+", lower),
    }
}

/// Format an elapsed time in the largest sensible unit.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1} seconds", secs)
    } else if secs < 3600.0 {
        format!("{:.1} minutes", secs / 60.0)
    } else {
        format!("{:.1} hours", secs / 3600.0)
    }
}

/// Statistics over a set of puzzles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PuzzleStatistics {
    pub count: usize,
    pub by_difficulty: BTreeMap<u8, usize>,
    pub by_blunder_type: BTreeMap<BlunderKind, usize>,
    /// Counts keyed by difficulty label.
    pub difficulty_distribution: BTreeMap<String, usize>,
    pub avg_eval_change: f64,
    pub earliest_move: Option<u32>,
    pub latest_move: Option<u32>,
}

impl PuzzleStatistics {
    pub fn from_puzzles(puzzles: &[PuzzleBlunder]) -> Self {
        let mut stats = PuzzleStatistics {
            count: puzzles.len(),
            ..Default::default()
        };
        if puzzles.is_empty() {
            return stats;
        }

        let mut total_change: i64 = 0;
        for puzzle in puzzles {
            *stats.by_difficulty.entry(puzzle.difficulty()).or_default() += 1;
            *stats.by_blunder_type.entry(puzzle.blunder_type()).or_default() += 1;
            *stats
                .difficulty_distribution
                .entry(puzzle.difficulty_label().to_string())
                .or_default() += 1;
            total_change += i64::from(puzzle.eval_change());

            let n = puzzle.move_number();
            stats.earliest_move = Some(stats.earliest_move.map_or(n, |m| m.min(n)));
            stats.latest_move = Some(stats.latest_move.map_or(n, |m| m.max(n)));
        }
        stats.avg_eval_change = total_change as f64 / puzzles.len() as f64;
        stats
    }
}

/// Distribution of evaluation swings, for tuning thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationStatistics {
    pub total_evaluations: usize,
    pub average_absolute_change: f64,
    pub median_absolute_change: f64,
    /// Counts of `|eval_change|` keyed by each range's lower edge. See
    /// [`change_range_label`].
    pub count_by_range: BTreeMap<i32, usize>,
    pub blunders: usize,
}

impl EvaluationStatistics {
    pub fn from_evaluations(evaluations: &[PositionEvaluation]) -> Self {
        let mut changes: Vec<i64> = evaluations
            .iter()
            .map(|e| i64::from(e.eval_change()).abs())
            .collect();
        changes.sort_unstable();

        let mut stats = EvaluationStatistics {
            total_evaluations: changes.len(),
            blunders: evaluations.iter().filter(|e| e.is_blunder()).count(),
            ..Default::default()
        };
        if changes.is_empty() {
            return stats;
        }

        stats.average_absolute_change = changes.iter().sum::<i64>() as f64 / changes.len() as f64;
        let mid = changes.len() / 2;
        stats.median_absolute_change = if changes.len() % 2 == 0 {
            (changes[mid - 1] + changes[mid]) as f64 / 2.0
        } else {
            changes[mid] as f64
        };

        for edges in CHANGE_BUCKETS.windows(2) {
            let (lo, hi) = (i64::from(edges[0]), i64::from(edges[1]));
            let count = changes.iter().filter(|c| (lo..hi).contains(*c)).count();
            stats.count_by_range.insert(edges[0], count);
        }
        let top = CHANGE_BUCKETS[CHANGE_BUCKETS.len() - 1];
        stats.count_by_range.insert(
            top,
            changes.iter().filter(|c| **c >= i64::from(top)).count(),
        );
        stats
    }
}
