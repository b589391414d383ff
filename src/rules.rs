#![forbid(unsafe_code)]

//! Rule definitions, construction and loading

mod builder;
mod cel_rule;
mod loader;
mod rule;

pub use builder::RuleBuilder;
pub use cel_rule::{CelRule, rule_from_toml};
pub use loader::load_rules_from_dir;
pub use rule::{PolicyRule, Rule, RuleMetadata};
