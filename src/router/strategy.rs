//! Backend-selection and fallback strategies.

use std::str::FromStr;

/// How the router picks the first backend for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingStrategy {
    /// Cycle through backends in registration order; one shared cursor per
    /// router instance.
    #[default]
    RoundRobin,

    /// Always start from chain position 0 (registration order).
    Priority,

    /// Uniform random choice.
    Random,

    /// Weighted random choice proportional to registration weights.
    Weighted,

    /// User-supplied pure function of the request.
    Custom,

    /// Score (model, backend) pairs with the capability matcher.
    CapabilityBased,
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round_robin" => Ok(RoutingStrategy::RoundRobin),
            "priority" => Ok(RoutingStrategy::Priority),
            "random" => Ok(RoutingStrategy::Random),
            "weighted" => Ok(RoutingStrategy::Weighted),
            "custom" => Ok(RoutingStrategy::Custom),
            "capability" | "capability_based" => Ok(RoutingStrategy::CapabilityBased),
            _ => Err(format!("Unknown routing strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingStrategy::RoundRobin => write!(f, "round_robin"),
            RoutingStrategy::Priority => write!(f, "priority"),
            RoutingStrategy::Random => write!(f, "random"),
            RoutingStrategy::Weighted => write!(f, "weighted"),
            RoutingStrategy::Custom => write!(f, "custom"),
            RoutingStrategy::CapabilityBased => write!(f, "capability_based"),
        }
    }
}

/// How the fallback chain is executed after the first choice fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackStrategy {
    /// Try the next chain member on error.
    #[default]
    Sequential,

    /// Race all remaining candidates; first success wins, the rest are
    /// cancelled.
    Parallel,
}

impl FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(FallbackStrategy::Sequential),
            "parallel" => Ok(FallbackStrategy::Parallel),
            _ => Err(format!("Unknown fallback strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackStrategy::Sequential => write!(f, "sequential"),
            FallbackStrategy::Parallel => write!(f, "parallel"),
        }
    }
}
