//! Tag importance resolution by glob pattern match (§4.7). Patterns use `*`
//! as the only wildcard, translated to an anchored regex once per rule set
//! refresh rather than re-parsed on every tag lookup.

use regex::Regex;

use crate::config::HealthAssessmentConfig;
use crate::error::HealthError;
use crate::types::{TagImportance, TagImportanceRule};

struct CompiledRule {
    regex: Regex,
    importance: TagImportance,
    priority: i32,
}

fn glob_to_regex(pattern: &str) -> Result<Regex, HealthError> {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    anchored.push('^');
    for part in pattern.split('*') {
        if !anchored.ends_with('^') {
            anchored.push_str(".*");
        }
        anchored.push_str(&regex::escape(part));
    }
    anchored.push('$');
    Regex::new(&anchored).map_err(|e| HealthError::InvalidPattern(format!("{pattern}: {e}")))
}

/// Resolves a tag's name to a `TagImportance` using the highest-`priority`
/// enabled rule whose pattern matches, falling back to the configured
/// default when nothing matches.
pub struct ImportanceResolver {
    rules: Vec<CompiledRule>,
    default_importance: TagImportance,
}

impl ImportanceResolver {
    pub fn compile(rules: &[TagImportanceRule], cfg: &HealthAssessmentConfig) -> Result<Self, HealthError> {
        let mut compiled: Vec<CompiledRule> = rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| {
                Ok(CompiledRule {
                    regex: glob_to_regex(&r.pattern)?,
                    importance: r.importance,
                    priority: r.priority,
                })
            })
            .collect::<Result<_, HealthError>>()?;
        compiled.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { rules: compiled, default_importance: cfg.default_tag_importance })
    }

    pub fn resolve(&self, tag_name: &str) -> TagImportance {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(tag_name))
            .map(|r| r.importance)
            .unwrap_or(self.default_importance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> HealthAssessmentConfig {
        HealthAssessmentConfig { default_tag_importance: TagImportance::Minor, ..Default::default() }
    }

    fn rule(id: u64, pattern: &str, importance: TagImportance, priority: i32) -> TagImportanceRule {
        TagImportanceRule { rule_id: id, pattern: pattern.to_string(), importance, priority, enabled: true }
    }

    #[test]
    fn exact_pattern_matches() {
        let resolver = ImportanceResolver::compile(&[rule(1, "bearing_temp", TagImportance::Critical, 0)], &cfg()).unwrap();
        assert_eq!(resolver.resolve("bearing_temp"), TagImportance::Critical);
    }

    #[test]
    fn wildcard_matches_prefix_and_suffix() {
        let resolver =
            ImportanceResolver::compile(&[rule(1, "pump_*_pressure", TagImportance::Major, 0)], &cfg()).unwrap();
        assert_eq!(resolver.resolve("pump_01_pressure"), TagImportance::Major);
        assert_eq!(resolver.resolve("pump_pressure"), TagImportance::Minor);
    }

    #[test]
    fn higher_priority_rule_wins_over_broader_match() {
        let rules = vec![
            rule(1, "motor_*", TagImportance::Auxiliary, 0),
            rule(2, "motor_current", TagImportance::Critical, 10),
        ];
        let resolver = ImportanceResolver::compile(&rules, &cfg()).unwrap();
        assert_eq!(resolver.resolve("motor_current"), TagImportance::Critical);
        assert_eq!(resolver.resolve("motor_voltage"), TagImportance::Auxiliary);
    }

    #[test]
    fn unmatched_tag_falls_back_to_default() {
        let resolver = ImportanceResolver::compile(&[], &cfg()).unwrap();
        assert_eq!(resolver.resolve("anything"), TagImportance::Minor);
    }

    #[test]
    fn disabled_rule_is_ignored() {
        let mut r = rule(1, "bearing_temp", TagImportance::Critical, 100);
        r.enabled = false;
        let resolver = ImportanceResolver::compile(&[r], &cfg()).unwrap();
        assert_eq!(resolver.resolve("bearing_temp"), TagImportance::Minor);
    }
}
