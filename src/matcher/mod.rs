//! Capability matcher: pure scoring of (backend, model) candidates against
//! cost, speed, and quality requirements.
//!
//! Candidates that miss a hard requirement are flagged, never dropped, so
//! callers can inspect why nothing qualified. Component scores live in
//! [0, 100]; absent capability facts are neutral.

use crate::adapter::{AiModel, ModelCapabilities};
use serde::{Deserialize, Serialize};

/// Neutral quality for models that report none.
const NEUTRAL_QUALITY: f32 = 50.0;

/// Maximum nudge a single preferred target can apply, up or down.
const PREFERRED_NUDGE: f32 = 5.0;

/// Hard requirements. Any unmet one marks the candidate as not qualifying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequiredCapabilities {
    pub supports_streaming: Option<bool>,
    pub supports_vision: Option<bool>,
    pub supports_tools: Option<bool>,
    pub supports_json: Option<bool>,
    pub min_context_window: Option<u32>,
    pub max_cost_per_1k_tokens: Option<f64>,
}

/// Soft targets; proximity to each nudges the combined score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreferredTargets {
    pub max_cost_per_1k_tokens: Option<f64>,
    pub max_latency_ms: Option<u32>,
    pub min_quality_score: Option<f32>,
}

/// How component scores combine. Explicit weights are used exactly as
/// provided, with no renormalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optimization {
    Cost,
    Speed,
    Quality,
    Balanced,
    Weighted { cost: f32, speed: f32, quality: f32 },
}

impl Default for Optimization {
    fn default() -> Self {
        Optimization::Balanced
    }
}

impl Optimization {
    fn weights(&self) -> (f32, f32, f32) {
        match *self {
            Optimization::Cost => (0.6, 0.2, 0.2),
            Optimization::Speed => (0.2, 0.6, 0.2),
            Optimization::Quality => (0.2, 0.2, 0.6),
            Optimization::Balanced => (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
            Optimization::Weighted { cost, speed, quality } => (cost, speed, quality),
        }
    }
}

/// Full matching query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapabilityRequirements {
    pub required: RequiredCapabilities,
    pub preferred: PreferredTargets,
    pub optimization: Optimization,
}

/// A (model, backend) pair under consideration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCandidate {
    pub model: AiModel,
    pub backend: String,
}

/// Scored candidate. Present in ranked output even when it fails the hard
/// requirements.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMatch {
    pub candidate: ModelCandidate,
    pub score: f32,
    pub meets_requirements: bool,
    pub cost_score: f32,
    pub speed_score: f32,
    pub quality_score: f32,
}

fn blended_cost(caps: &ModelCapabilities) -> Option<f64> {
    caps.pricing.map(|p| (p.input + p.output) / 2.0)
}

fn blended_latency(caps: &ModelCapabilities) -> Option<f64> {
    caps.latency.map(|l| (l.p50_ms as f64 + l.p95_ms as f64) / 2.0)
}

/// Relative min/max normalization: best value in the set scores 100, worst
/// scores 0. A degenerate set (all equal) scores 100.
fn relative_score(value: f64, min: f64, max: f64, lower_is_better: bool) -> f32 {
    if (max - min).abs() < f64::EPSILON {
        return 100.0;
    }
    let normalized = (value - min) / (max - min);
    let score = if lower_is_better { 1.0 - normalized } else { normalized };
    (score * 100.0) as f32
}

fn meets_required(required: &RequiredCapabilities, caps: Option<&ModelCapabilities>) -> bool {
    // A requirement against an absent fact is unmet only for explicit
    // boolean demands; absent facts are otherwise neutral.
    let flag = |want: Option<bool>, have: Option<bool>| match want {
        Some(true) => have == Some(true),
        _ => true,
    };
    let Some(caps) = caps else {
        // No capability facts at all: only explicit boolean demands can
        // fail; threshold requirements against unknown facts are neutral.
        return required.supports_streaming != Some(true)
            && required.supports_vision != Some(true)
            && required.supports_tools != Some(true)
            && required.supports_json != Some(true);
    };
    if !flag(required.supports_streaming, caps.supports_streaming)
        || !flag(required.supports_vision, caps.supports_vision)
        || !flag(required.supports_tools, caps.supports_tools)
        || !flag(required.supports_json, caps.supports_json)
    {
        return false;
    }
    // An unknown context window is neutral, same as unknown pricing.
    if let (Some(min), Some(window)) = (required.min_context_window, caps.context_window) {
        if window < min {
            return false;
        }
    }
    if let (Some(max_cost), Some(cost)) = (required.max_cost_per_1k_tokens, blended_cost(caps)) {
        if cost > max_cost {
            return false;
        }
    }
    true
}

fn preferred_nudge(preferred: &PreferredTargets, caps: Option<&ModelCapabilities>) -> f32 {
    let Some(caps) = caps else { return 0.0 };
    let mut nudge = 0.0;
    if let (Some(target), Some(cost)) = (preferred.max_cost_per_1k_tokens, blended_cost(caps)) {
        if target > 0.0 {
            let ratio = ((target - cost) / target).clamp(-1.0, 1.0) as f32;
            nudge += ratio * PREFERRED_NUDGE;
        }
    }
    if let (Some(target), Some(latency)) = (preferred.max_latency_ms, blended_latency(caps)) {
        if target > 0 {
            let ratio = ((target as f64 - latency) / target as f64).clamp(-1.0, 1.0) as f32;
            nudge += ratio * PREFERRED_NUDGE;
        }
    }
    if let (Some(target), Some(quality)) = (preferred.min_quality_score, caps.quality_score) {
        if target > 0.0 {
            let ratio = ((quality - target) / target).clamp(-1.0, 1.0);
            nudge += ratio * PREFERRED_NUDGE;
        }
    }
    nudge
}

/// Score and rank every candidate against the requirements.
///
/// The returned list is sorted by descending score; ties keep the original
/// candidate order (stable sort). Nothing is filtered out.
pub fn match_candidates(
    requirements: &CapabilityRequirements,
    candidates: &[ModelCandidate],
) -> Vec<ModelMatch> {
    // Set-relative cost/speed bounds over candidates that report them.
    let costs: Vec<f64> = candidates
        .iter()
        .filter_map(|c| c.model.capabilities.as_ref().and_then(blended_cost))
        .collect();
    let latencies: Vec<f64> = candidates
        .iter()
        .filter_map(|c| c.model.capabilities.as_ref().and_then(blended_latency))
        .collect();
    let cost_bounds = bounds(&costs);
    let latency_bounds = bounds(&latencies);

    let (w_cost, w_speed, w_quality) = requirements.optimization.weights();

    let mut matches: Vec<ModelMatch> = candidates
        .iter()
        .map(|candidate| {
            let caps = candidate.model.capabilities.as_ref();
            let cost_score = match (caps.and_then(blended_cost), cost_bounds) {
                (Some(cost), Some((min, max))) => relative_score(cost, min, max, true),
                // No pricing info: free as far as we can tell.
                _ => 100.0,
            };
            let speed_score = match (caps.and_then(blended_latency), latency_bounds) {
                (Some(latency), Some((min, max))) => relative_score(latency, min, max, true),
                _ => 100.0,
            };
            let quality_score = caps
                .and_then(|c| c.quality_score)
                .unwrap_or(NEUTRAL_QUALITY);

            let combined = cost_score * w_cost + speed_score * w_speed + quality_score * w_quality;
            let score =
                (combined + preferred_nudge(&requirements.preferred, caps)).clamp(0.0, 100.0);

            ModelMatch {
                meets_requirements: meets_required(&requirements.required, caps),
                candidate: candidate.clone(),
                score,
                cost_score,
                speed_score,
                quality_score,
            }
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

/// Top-scoring candidate that meets all hard requirements, if any.
pub fn find_best_model(
    requirements: &CapabilityRequirements,
    candidates: &[ModelCandidate],
) -> Option<ModelMatch> {
    match_candidates(requirements, candidates)
        .into_iter()
        .find(|m| m.meets_requirements)
}

/// Up to `n` qualifying candidates, best first.
pub fn top_matches(
    requirements: &CapabilityRequirements,
    candidates: &[ModelCandidate],
    n: usize,
) -> Vec<ModelMatch> {
    match_candidates(requirements, candidates)
        .into_iter()
        .filter(|m| m.meets_requirements)
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Latency, Pricing};

    fn model(id: &str, caps: Option<ModelCapabilities>) -> ModelCandidate {
        ModelCandidate {
            model: AiModel {
                id: id.to_string(),
                name: id.to_string(),
                capabilities: caps,
            },
            backend: format!("{id}-backend"),
        }
    }

    fn fixture() -> Vec<ModelCandidate> {
        vec![
            model(
                "cheap",
                Some(ModelCapabilities {
                    quality_score: Some(60.0),
                    pricing: Some(Pricing { input: 0.0001, output: 0.0002 }),
                    ..Default::default()
                }),
            ),
            model(
                "quality",
                Some(ModelCapabilities {
                    quality_score: Some(95.0),
                    pricing: Some(Pricing { input: 0.01, output: 0.03 }),
                    supports_vision: Some(true),
                    ..Default::default()
                }),
            ),
            model(
                "balanced",
                Some(ModelCapabilities {
                    quality_score: Some(85.0),
                    supports_vision: Some(true),
                    ..Default::default()
                }),
            ),
        ]
    }

    #[test]
    fn vision_requirement_flags_but_keeps_all_candidates() {
        let requirements = CapabilityRequirements {
            required: RequiredCapabilities {
                supports_vision: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let matches = match_candidates(&requirements, &fixture());
        assert_eq!(matches.len(), 3);
        let qualifying: Vec<&str> = matches
            .iter()
            .filter(|m| m.meets_requirements)
            .map(|m| m.candidate.model.id.as_str())
            .collect();
        assert_eq!(qualifying.len(), 2);
        assert!(qualifying.contains(&"quality"));
        assert!(qualifying.contains(&"balanced"));
        let cheap = matches
            .iter()
            .find(|m| m.candidate.model.id == "cheap")
            .unwrap();
        assert!(!cheap.meets_requirements);
    }

    #[test]
    fn missing_pricing_scores_as_cheapest() {
        let matches = match_candidates(&CapabilityRequirements::default(), &fixture());
        let balanced = matches
            .iter()
            .find(|m| m.candidate.model.id == "balanced")
            .unwrap();
        assert_eq!(balanced.cost_score, 100.0);
    }

    #[test]
    fn cost_optimization_prefers_cheap_model() {
        let requirements = CapabilityRequirements {
            optimization: Optimization::Cost,
            ..Default::default()
        };
        let best = find_best_model(&requirements, &fixture()[..2].to_vec()).unwrap();
        assert_eq!(best.candidate.model.id, "cheap");
    }

    #[test]
    fn quality_optimization_prefers_quality_model() {
        let requirements = CapabilityRequirements {
            optimization: Optimization::Quality,
            ..Default::default()
        };
        let best = find_best_model(&requirements, &fixture()).unwrap();
        assert_eq!(best.candidate.model.id, "quality");
    }

    #[test]
    fn explicit_weights_are_used_as_provided() {
        let requirements = CapabilityRequirements {
            optimization: Optimization::Weighted { cost: 1.0, speed: 0.0, quality: 0.0 },
            ..Default::default()
        };
        let matches = match_candidates(&requirements, &fixture()[..2].to_vec());
        assert_eq!(matches[0].candidate.model.id, "cheap");
        assert_eq!(matches[0].score, 100.0);
        assert_eq!(matches[1].score, 0.0);
    }

    #[test]
    fn find_best_model_returns_none_when_nothing_qualifies() {
        let requirements = CapabilityRequirements {
            required: RequiredCapabilities {
                supports_tools: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(find_best_model(&requirements, &fixture()).is_none());
    }

    #[test]
    fn top_matches_is_bounded_and_qualifying_only() {
        let requirements = CapabilityRequirements {
            required: RequiredCapabilities {
                supports_vision: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let top = top_matches(&requirements, &fixture(), 1);
        assert_eq!(top.len(), 1);
        assert!(top[0].meets_requirements);
    }

    #[test]
    fn speed_scoring_uses_latency_bounds() {
        let candidates = vec![
            model(
                "fast",
                Some(ModelCapabilities {
                    latency: Some(Latency { p50_ms: 100, p95_ms: 200 }),
                    ..Default::default()
                }),
            ),
            model(
                "slow",
                Some(ModelCapabilities {
                    latency: Some(Latency { p50_ms: 1000, p95_ms: 2000 }),
                    ..Default::default()
                }),
            ),
        ];
        let requirements = CapabilityRequirements {
            optimization: Optimization::Speed,
            ..Default::default()
        };
        let best = find_best_model(&requirements, &candidates).unwrap();
        assert_eq!(best.candidate.model.id, "fast");
    }

    #[test]
    fn context_window_threshold_is_hard() {
        let candidates = vec![model(
            "small",
            Some(ModelCapabilities {
                context_window: Some(4096),
                ..Default::default()
            }),
        )];
        let requirements = CapabilityRequirements {
            required: RequiredCapabilities {
                min_context_window: Some(32000),
                ..Default::default()
            },
            ..Default::default()
        };
        let matches = match_candidates(&requirements, &candidates);
        assert!(!matches[0].meets_requirements);
    }

    #[test]
    fn absent_capabilities_are_neutral_for_thresholds() {
        let candidates = vec![model("bare", None)];
        let requirements = CapabilityRequirements {
            required: RequiredCapabilities {
                max_cost_per_1k_tokens: Some(0.001),
                ..Default::default()
            },
            ..Default::default()
        };
        let matches = match_candidates(&requirements, &candidates);
        // No pricing info: the cost ceiling cannot exclude it.
        assert!(matches[0].meets_requirements);
    }

    #[test]
    fn absent_context_window_is_neutral_for_min_threshold() {
        let candidates = vec![
            model(
                "unsized",
                Some(ModelCapabilities {
                    quality_score: Some(70.0),
                    ..Default::default()
                }),
            ),
            model("bare", None),
        ];
        let requirements = CapabilityRequirements {
            required: RequiredCapabilities {
                min_context_window: Some(8000),
                ..Default::default()
            },
            ..Default::default()
        };
        let matches = match_candidates(&requirements, &candidates);
        // An unreported window is unknown, not zero.
        assert!(matches.iter().all(|m| m.meets_requirements));
    }
}
