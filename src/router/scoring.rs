//! Candidate scoring.
//!
//! Pure functions computing the per-control score components. Everything here
//! is deterministic over its inputs; the router supplies the question context,
//! the policy, and today's date.

use chrono::NaiveDate;
use serde::Serialize;
use strsim::normalized_levenshtein;

use super::RouterPolicy;
use crate::catalog::ControlDefinition;

/// Award for an exact substring match of a whole keyword.
const EXACT_MATCH_AWARD: f64 = 1.0;

/// Award when a single word of a keyword appears as a whole word.
const WORD_MATCH_AWARD: f64 = 0.8;

/// Award for a fuzzy word-level match.
const FUZZY_MATCH_AWARD: f64 = 0.5;

/// Per-control score breakdown. Recomputed per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub control_id: String,
    pub keyword_match: f64,
    pub intent_match: f64,
    pub sql_shape: f64,
    pub recency_boost: f64,
    pub priority_boost: f64,
    pub ambiguity_penalty: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
}

/// Scores one control against the question and combines the components into
/// the weighted final score, clamped to [0, 1]. Priority is additive, not
/// weighted.
pub(crate) fn score_control(
    control: &ControlDefinition,
    question_lower: &str,
    question_words: &[String],
    vague_count: usize,
    policy: &RouterPolicy,
    today: NaiveDate,
) -> CandidateScore {
    let keyword_match = keyword_score(
        question_lower,
        question_words,
        control,
        policy.fuzzy_similarity_threshold,
    );
    // Simplified gating policy: every control is eligible. The component is
    // kept in the breakdown so stricter intent gating can slot in here.
    let intent_match = 1.0;
    let sql_shape = shape_score(control);
    let recency_boost = recency_score(&control.version, today);
    let priority_boost = if policy
        .health_bundle
        .iter()
        .any(|id| id == &control.control_id)
    {
        policy.priority_boost
    } else {
        0.0
    };
    let ambiguity_penalty = if vague_count > policy.max_vague_markers {
        policy.ambiguity_penalty
    } else {
        0.0
    };

    let final_score = (policy.keyword_weight * keyword_match
        + policy.intent_weight * intent_match
        + policy.shape_weight * sql_shape
        + policy.recency_weight * recency_boost
        + priority_boost
        - policy.ambiguity_weight * ambiguity_penalty)
        .clamp(0.0, 1.0);

    CandidateScore {
        control_id: control.control_id.clone(),
        keyword_match,
        intent_match,
        sql_shape,
        recency_boost,
        priority_boost,
        ambiguity_penalty,
        final_score,
    }
}

/// Splits a lower-cased question into words with edge punctuation stripped.
pub(crate) fn question_words(question_lower: &str) -> Vec<String> {
    question_lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Number of distinct vague marker words present in the question.
pub(crate) fn vague_marker_count(question_lower: &str, markers: &[String]) -> usize {
    markers
        .iter()
        .filter(|marker| question_lower.contains(marker.as_str()))
        .count()
}

/// Averages per-keyword awards over the control's combined keyword set. Each
/// keyword earns the best single award: exact substring, whole-word, or fuzzy
/// word match.
pub(crate) fn keyword_score(
    question_lower: &str,
    question_words: &[String],
    control: &ControlDefinition,
    fuzzy_threshold: f64,
) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;

    for keyword in control.all_keywords() {
        count += 1;
        let keyword_lower = keyword.to_lowercase();

        if question_lower.contains(&keyword_lower) {
            total += EXACT_MATCH_AWARD;
            continue;
        }

        let keyword_words: Vec<&str> = keyword_lower.split_whitespace().collect();
        if keyword_words
            .iter()
            .any(|kw| question_words.iter().any(|qw| qw == kw))
        {
            total += WORD_MATCH_AWARD;
            continue;
        }

        let fuzzy_hit = keyword_words.iter().any(|kw| {
            question_words
                .iter()
                .any(|qw| normalized_levenshtein(kw, qw) >= fuzzy_threshold)
        });
        if fuzzy_hit {
            total += FUZZY_MATCH_AWARD;
        }
    }

    // Keyword lists are validated non-empty at load time.
    if count == 0 {
        return 0.0;
    }
    (total / count as f64).min(1.0)
}

/// Coarse richness proxy from query and column counts.
pub(crate) fn shape_score(control: &ControlDefinition) -> f64 {
    let queries = control.queries.len();
    let columns = control.total_result_columns();

    if queries >= 3 && columns >= 10 {
        0.8
    } else if queries == 1 && columns < 5 {
        0.3
    } else {
        0.5
    }
}

/// Boost for recently versioned controls. The text before the first `.` is
/// parsed as a `YYYY-MM-DD` date; non-date versions get a neutral default.
pub(crate) fn recency_score(version: &str, today: NaiveDate) -> f64 {
    let date_part = version.split('.').next().unwrap_or(version);
    let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
        return 0.05;
    };

    let age_days = (today - date).num_days();
    if age_days < 30 {
        0.10
    } else if age_days < 90 {
        0.07
    } else if age_days < 180 {
        0.03
    } else {
        0.0
    }
}
