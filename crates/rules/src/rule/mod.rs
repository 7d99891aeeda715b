mod definition;
mod runtime;

pub use definition::{
    generator_url, parse_postable_rule, parse_postable_rule_with, PostableRule, RuleCondition,
    RuleType, CRITICAL_THRESHOLD_NAME, DEFAULT_SCHEMA_VERSION,
};
pub use runtime::{Rule, RuleContext, RuleKind};
