// Strategy module - deterministic rule-based rebalancing

pub mod engine;
pub mod rules;

pub use engine::{RebalancingAction, RebalancingEngine, RebalancingPlan};
pub use rules::{ActionKind, MissingReturnPolicy, Rule, RuleId, Trigger};
