//! Model-name translation.
//!
//! Different providers name semantically-equivalent models differently, so
//! the router translates the requested model independently for each target
//! backend, at the moment that backend is selected (including on every
//! fallback hop). Resolution order, stopping at the first hit:
//!
//! 1. per-backend exact mapping for the specific backend name,
//! 2. global exact mapping,
//! 3. regex pattern rules by descending priority (declaration order on
//!    ties),
//! 4. the target backend's configured default model (hybrid only).
//!
//! `exact` stops after (2), `pattern` after (3), `hybrid` tries all four,
//! `none` never translates. Strict mode fails the request when no rule
//! produced a value instead of passing the original name through.

use crate::error::GatewayError;
use regex::Regex;
use std::collections::HashMap;
use std::str::FromStr;

/// Which resolution steps apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationStrategy {
    Exact,
    Pattern,
    #[default]
    Hybrid,
    None,
}

impl FromStr for TranslationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(TranslationStrategy::Exact),
            "pattern" => Ok(TranslationStrategy::Pattern),
            "hybrid" => Ok(TranslationStrategy::Hybrid),
            "none" => Ok(TranslationStrategy::None),
            _ => Err(format!("Unknown translation strategy: {}", s)),
        }
    }
}

/// Which registration wins when two source names map to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverseMappingPolicy {
    #[default]
    LastWins,
    FirstWins,
}

/// A prioritized regex rewrite rule. The target may reference capture
/// groups (`$1`).
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern: Regex,
    pub target: String,
    pub priority: i32,
}

/// Translation rule set owned by one router.
#[derive(Debug, Clone, Default)]
pub struct ModelTranslator {
    strategy: TranslationStrategy,
    strict: bool,
    /// Registration-ordered so reverse lookup can honor its policy.
    global: Vec<(String, String)>,
    per_backend: HashMap<String, Vec<(String, String)>>,
    patterns: Vec<PatternRule>,
    reverse_policy: ReverseMappingPolicy,
}

impl ModelTranslator {
    pub fn new(strategy: TranslationStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn strategy(&self) -> TranslationStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: TranslationStrategy) {
        self.strategy = strategy;
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn set_reverse_policy(&mut self, policy: ReverseMappingPolicy) {
        self.reverse_policy = policy;
    }

    pub fn add_global_mapping(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.global.push((from.into(), to.into()));
    }

    pub fn add_backend_mapping(
        &mut self,
        backend: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) {
        self.per_backend
            .entry(backend.into())
            .or_default()
            .push((from.into(), to.into()));
    }

    /// Register a regex rule. Rules are kept sorted by descending
    /// priority; equal priorities keep declaration order.
    pub fn add_pattern_rule(
        &mut self,
        pattern: &str,
        target: impl Into<String>,
        priority: i32,
    ) -> Result<(), GatewayError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            GatewayError::validation("BAD_PATTERN", format!("invalid pattern rule: {e}"))
        })?;
        self.patterns.push(PatternRule {
            pattern,
            target: target.into(),
            priority,
        });
        self.patterns.sort_by_key(|rule| std::cmp::Reverse(rule.priority));
        Ok(())
    }

    fn exact_lookup<'a>(mappings: &'a [(String, String)], model: &str) -> Option<&'a str> {
        // Forward lookup: first registration wins.
        mappings
            .iter()
            .find(|(from, _)| from == model)
            .map(|(_, to)| to.as_str())
    }

    fn pattern_lookup(&self, model: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|rule| rule.pattern.is_match(model))
            .map(|rule| rule.pattern.replace(model, rule.target.as_str()).into_owned())
    }

    /// Resolve the model name for one target backend.
    ///
    /// # Errors
    ///
    /// With strict mode on, fails with a routing error when no rule
    /// produced a value (`none` strategy excepted: it never translates).
    pub fn translate(
        &self,
        model: &str,
        backend: &str,
        backend_default: Option<&str>,
    ) -> Result<String, GatewayError> {
        if self.strategy == TranslationStrategy::None {
            return Ok(model.to_string());
        }

        if let Some(mapped) = self
            .per_backend
            .get(backend)
            .and_then(|m| Self::exact_lookup(m, model))
        {
            return Ok(mapped.to_string());
        }
        if let Some(mapped) = Self::exact_lookup(&self.global, model) {
            return Ok(mapped.to_string());
        }
        if matches!(
            self.strategy,
            TranslationStrategy::Pattern | TranslationStrategy::Hybrid
        ) {
            if let Some(mapped) = self.pattern_lookup(model) {
                return Ok(mapped);
            }
        }
        if self.strategy == TranslationStrategy::Hybrid {
            if let Some(default) = backend_default {
                return Ok(default.to_string());
            }
        }

        if self.strict {
            Err(GatewayError::routing(
                "NO_TRANSLATION_FOUND",
                format!("no translation for model '{model}' on backend '{backend}'"),
            ))
        } else {
            Ok(model.to_string())
        }
    }

    /// Which source name maps to `target` in the global table, resolved
    /// under the configured duplicate policy.
    pub fn reverse_global(&self, target: &str) -> Option<&str> {
        match self.reverse_policy {
            ReverseMappingPolicy::LastWins => self
                .global
                .iter()
                .rev()
                .find(|(_, to)| to == target)
                .map(|(from, _)| from.as_str()),
            ReverseMappingPolicy::FirstWins => self
                .global
                .iter()
                .find(|(_, to)| to == target)
                .map(|(from, _)| from.as_str()),
        }
    }
}
