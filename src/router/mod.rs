//! Deterministic control routing.
//!
//! The router scores every catalog control against a free-text question and
//! decides whether to select one for execution, ask the operator to clarify,
//! or decline. Every decision carries the full ranked score breakdown so a
//! reviewer can reconstruct why a control was (or was not) chosen. Scoring
//! involves no I/O and no randomness; identical catalog state and inputs
//! produce identical decisions, with the trace-only request id as the single
//! exception.

pub mod scoring;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::catalog::{ControlCatalog, ControlDefinition};
use crate::config::RouterOverrides;
use crate::error::VitalsError;
use crate::logging::sanitize_for_log;
pub use scoring::CandidateScore;

/// Coarse intent label emitted by the upstream classifier. Consumed as an
/// opaque signal; the router records it but does not gate on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptIntent {
    ChitChat,
    EbsControl,
    Ambiguous,
    Unknown,
}

impl fmt::Display for PromptIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChitChat => "chit_chat",
            Self::EbsControl => "ebs_control",
            Self::Ambiguous => "ambiguous",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptIntent {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chit_chat" | "chitchat" => Ok(Self::ChitChat),
            "ebs_control" | "control" => Ok(Self::EbsControl),
            "ambiguous" => Ok(Self::Ambiguous),
            "unknown" => Ok(Self::Unknown),
            other => Err(VitalsError::validation(format!(
                "unknown intent label: {other}"
            ))),
        }
    }
}

/// Upstream intent classification attached to a question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntentSignal {
    pub intent: PromptIntent,
    pub confidence: f64,
}

impl IntentSignal {
    pub fn new(intent: PromptIntent, confidence: f64) -> Self {
        Self { intent, confidence }
    }
}

impl Default for IntentSignal {
    fn default() -> Self {
        Self {
            intent: PromptIntent::Unknown,
            confidence: 0.0,
        }
    }
}

/// Scoring weights, thresholds, and word lists. The defaults are the
/// production values; tests and configuration may override.
#[derive(Debug, Clone)]
pub struct RouterPolicy {
    /// Minimum top score required to select a control at all.
    pub selection_threshold: f64,
    /// Minimum lead over the runner-up for a confident selection.
    pub ambiguity_gap: f64,
    /// Number of ranked candidates kept in the decision.
    pub top_candidates: usize,
    /// Number of alternative suggestions attached to ambiguous decisions.
    pub max_suggestions: usize,
    pub keyword_weight: f64,
    pub intent_weight: f64,
    pub shape_weight: f64,
    pub recency_weight: f64,
    pub ambiguity_weight: f64,
    /// Flat additive boost for health-bundle controls.
    pub priority_boost: f64,
    /// Penalty component value for vague questions.
    pub ambiguity_penalty: f64,
    pub fuzzy_similarity_threshold: f64,
    /// Penalize questions containing more than this many vague markers.
    pub max_vague_markers: usize,
    pub health_bundle: Vec<String>,
    pub vague_markers: Vec<String>,
}

/// Control ids that receive the flat priority boost.
const HEALTH_BUNDLE: [&str; 3] = ["concurrent_mgr_health", "invalid_objects", "active_users"];

/// Words signalling a vague question, in both supported locales.
const VAGUE_MARKERS: [&str; 6] = ["status", "check", "health", "durumu", "kontrol", "nedir"];

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            selection_threshold: 0.45,
            ambiguity_gap: 0.05,
            top_candidates: 5,
            max_suggestions: 3,
            keyword_weight: 0.40,
            intent_weight: 0.35,
            shape_weight: 0.10,
            recency_weight: 0.10,
            ambiguity_weight: 0.05,
            priority_boost: 0.05,
            ambiguity_penalty: 0.05,
            fuzzy_similarity_threshold: 0.8,
            max_vague_markers: 2,
            health_bundle: HEALTH_BUNDLE.iter().map(|id| id.to_string()).collect(),
            vague_markers: VAGUE_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl RouterPolicy {
    /// Applies configuration overrides onto the defaults.
    pub fn with_overrides(mut self, overrides: &RouterOverrides) -> Self {
        if let Some(threshold) = overrides.selection_threshold {
            self.selection_threshold = threshold;
        }
        if let Some(gap) = overrides.ambiguity_gap {
            self.ambiguity_gap = gap;
        }
        self
    }
}

/// One routing decision. Immutable after construction.
#[derive(Debug, Clone, Serialize)]
pub struct RouterDecision {
    pub request_id: String,
    pub intent: PromptIntent,
    pub intent_confidence: f64,
    /// Ranked score breakdowns, best first, capped at the policy's top-N.
    pub candidates: Vec<CandidateScore>,
    pub selected_control_id: Option<String>,
    pub selected_control_version: Option<String>,
    pub confidence: f64,
    pub justification: String,
    pub ambiguity_threshold_breach: bool,
    /// Human-readable alternative interpretations, best first.
    pub suggestions: Vec<String>,
}

/// Scores catalog controls against questions and decides what to run.
pub struct Router {
    catalog: Arc<ControlCatalog>,
    policy: RouterPolicy,
}

impl Router {
    pub fn new(catalog: Arc<ControlCatalog>) -> Self {
        Self {
            catalog,
            policy: RouterPolicy::default(),
        }
    }

    pub fn with_policy(catalog: Arc<ControlCatalog>, policy: RouterPolicy) -> Self {
        Self { catalog, policy }
    }

    pub fn policy(&self) -> &RouterPolicy {
        &self.policy
    }

    /// Routes a question to a control, a clarification request, or a decline.
    pub fn route(&self, question: &str, signal: IntentSignal) -> RouterDecision {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        info!(
            "[{}] routing question: {}",
            request_id,
            sanitize_for_log(question)
        );

        if self.catalog.is_empty() {
            info!("[{}] declined: catalog is empty", request_id);
            return RouterDecision {
                request_id,
                intent: signal.intent,
                intent_confidence: signal.confidence,
                candidates: Vec::new(),
                selected_control_id: None,
                selected_control_version: None,
                confidence: 0.0,
                justification: "the control catalog has no controls loaded".to_string(),
                ambiguity_threshold_breach: true,
                suggestions: Vec::new(),
            };
        }

        let question_lower = question.to_lowercase();
        let question_words = scoring::question_words(&question_lower);
        let vague_count = scoring::vague_marker_count(&question_lower, &self.policy.vague_markers);
        let today = Utc::now().date_naive();

        let mut candidates: Vec<CandidateScore> = self
            .catalog
            .get_all_controls()
            .iter()
            .map(|control| {
                scoring::score_control(
                    control,
                    &question_lower,
                    &question_words,
                    vague_count,
                    &self.policy,
                    today,
                )
            })
            .collect();

        // Stable sort: equal scores keep catalog order.
        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
        });

        let top = candidates[0].clone();
        let runner_up_score = candidates.get(1).map(|c| c.final_score);
        let suggestions = self.build_suggestions(&candidates);
        candidates.truncate(self.policy.top_candidates);

        if top.final_score < self.policy.selection_threshold {
            info!(
                "[{}] clarification: top score {:.2} below threshold {:.2}",
                request_id, top.final_score, self.policy.selection_threshold
            );
            return RouterDecision {
                request_id,
                intent: signal.intent,
                intent_confidence: signal.confidence,
                candidates,
                selected_control_id: None,
                selected_control_version: None,
                confidence: 0.0,
                justification: format!(
                    "no control matched well enough (top score {:.2}); the question needs clarification",
                    top.final_score
                ),
                ambiguity_threshold_breach: true,
                suggestions,
            };
        }

        let selected = self.catalog.get_control(&top.control_id);
        let version = selected.map(|c| c.version.clone());
        let title = selected.map(|c| c.title.as_str()).unwrap_or(&top.control_id);

        let ambiguous = runner_up_score
            .map(|second| top.final_score - second < self.policy.ambiguity_gap)
            .unwrap_or(false);

        if ambiguous {
            info!(
                "[{}] tentative selection '{}' (score {:.2}, runner-up within gap)",
                request_id, top.control_id, top.final_score
            );
            return RouterDecision {
                request_id,
                intent: signal.intent,
                intent_confidence: signal.confidence,
                candidates,
                selected_control_id: Some(top.control_id.clone()),
                selected_control_version: version,
                confidence: top.final_score,
                justification: format!(
                    "'{}' leads with score {:.2} but the runner-up is within {:.2}; treat as unconfirmed",
                    title, top.final_score, self.policy.ambiguity_gap
                ),
                ambiguity_threshold_breach: true,
                suggestions,
            };
        }

        info!(
            "[{}] selected '{}' with score {:.2}",
            request_id, top.control_id, top.final_score
        );
        let dominant = dominant_factor(&top, &self.policy);
        RouterDecision {
            request_id,
            intent: signal.intent,
            intent_confidence: signal.confidence,
            candidates,
            selected_control_id: Some(top.control_id.clone()),
            selected_control_version: version,
            confidence: top.final_score,
            justification: format!(
                "selected '{}' with score {:.2}, driven by {}",
                title, top.final_score, dominant
            ),
            ambiguity_threshold_breach: false,
            suggestions: Vec::new(),
        }
    }

    /// Builds up to `max_suggestions` human-readable alternatives: title plus
    /// up to two keywords per locale.
    fn build_suggestions(&self, ranked: &[CandidateScore]) -> Vec<String> {
        ranked
            .iter()
            .take(self.policy.max_suggestions)
            .filter_map(|candidate| self.catalog.get_control(&candidate.control_id))
            .map(suggestion_line)
            .collect()
    }
}

fn suggestion_line(control: &ControlDefinition) -> String {
    let en: Vec<&str> = control
        .keywords
        .en
        .iter()
        .take(2)
        .map(String::as_str)
        .collect();
    let tr: Vec<&str> = control
        .keywords
        .tr
        .iter()
        .take(2)
        .map(String::as_str)
        .collect();
    format!("{}: {} / {}", control.title, en.join(", "), tr.join(", "))
}

/// Names the component contributing the most to the final score.
fn dominant_factor(score: &CandidateScore, policy: &RouterPolicy) -> &'static str {
    let contributions = [
        ("keyword match", policy.keyword_weight * score.keyword_match),
        ("intent match", policy.intent_weight * score.intent_match),
        ("sql shape", policy.shape_weight * score.sql_shape),
        ("recency", policy.recency_weight * score.recency_boost),
        ("health-bundle priority", score.priority_boost),
    ];

    contributions
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(name, _)| *name)
        .unwrap_or("keyword match")
}
