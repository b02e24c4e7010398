//! Weighted score aggregation.
//!
//! Each modality is averaged on its own, then the two averages are combined
//! with the course's percentage weights. A modality without results averages
//! to 0 and still takes part in the weighted sum; nothing is renormalized.

use serde::{Deserialize, Serialize};

use crate::model::{ExamResult, QuestionType, Weights};

/// Per-modality averages and the weighted total for one exam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub avg_oral: f64,
    pub avg_coding: f64,
    /// Weighted total, rounded to the nearest integer.
    pub total: u32,
    pub oral_count: usize,
    pub coding_count: usize,
}

/// Mean score and count of the results of one modality. Empty → `(0.0, 0)`.
pub fn modality_average(results: &[ExamResult], kind: QuestionType) -> (f64, usize) {
    let (sum, count) = results
        .iter()
        .filter(|r| r.kind == kind)
        .fold((0.0f64, 0usize), |(sum, n), r| (sum + r.score, n + 1));
    if count == 0 {
        (0.0, 0)
    } else {
        (sum / count as f64, count)
    }
}

/// Combine two modality averages with percentage weights.
///
/// Also used to recompute stored totals after a course changes its weights.
pub fn recalculate_total(avg_oral: f64, avg_coding: f64, weights: &Weights) -> u32 {
    let weighted = avg_oral * weights.oral / 100.0 + avg_coding * weights.coding / 100.0;
    weighted.round().max(0.0) as u32
}

/// Aggregate a session's results into a [`ScoreSummary`].
pub fn aggregate(results: &[ExamResult], weights: &Weights) -> ScoreSummary {
    let (avg_oral, oral_count) = modality_average(results, QuestionType::Oral);
    let (avg_coding, coding_count) = modality_average(results, QuestionType::Coding);

    ScoreSummary {
        avg_oral,
        avg_coding,
        total: recalculate_total(avg_oral, avg_coding, weights),
        oral_count,
        coding_count,
    }
}
