//! Pass/fail rules evaluated against a decoded report.
//!
//! A rule inspects the tree and marks non-compliant nodes failed. Failure
//! propagates to every ancestor, so a single failing unit fails the report.
//! Rules only ever set the flag, which makes enforcement idempotent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::MetricKind;
use crate::tree::CoverageTree;

/// A node that a rule marked failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleViolation {
    pub path: Vec<String>,
    pub percentage: f64,
    pub minimum: f64,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed (below {:?}%).",
            self.path.join("/"),
            self.minimum
        )
    }
}

/// Every pass/fail policy implements this trait.
pub trait Rule: fmt::Debug {
    /// Mark non-compliant nodes failed and report what was marked.
    fn enforce(&self, tree: &mut CoverageTree) -> Vec<RuleViolation>;
}

/// Flags a failure if the statement coverage of a source file (unit) goes
/// below a threshold. Units without statement coverage are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementCoveragePerSourceFileRule {
    min_percentage: f64,
}

impl StatementCoveragePerSourceFileRule {
    pub fn new(min_percentage: f64) -> Self {
        Self { min_percentage }
    }
}

impl Rule for StatementCoveragePerSourceFileRule {
    fn enforce(&self, tree: &mut CoverageTree) -> Vec<RuleViolation> {
        let root = tree.root();
        let units: Vec<_> = tree
            .node(root)
            .children()
            .flat_map(|(_, env)| tree.node(env).children().map(|(_, unit)| unit))
            .collect();

        let mut violations = Vec::new();
        for unit in units {
            let ratio = tree.node(unit).ratio(MetricKind::Statement);
            if !ratio.is_initialized() {
                continue;
            }
            let percentage = ratio.percentage_float();
            if percentage < self.min_percentage {
                tree.set_failed(unit);
                violations.push(RuleViolation {
                    path: tree.path(unit).into_iter().map(String::from).collect(),
                    percentage,
                    minimum: self.min_percentage,
                });
            }
        }
        violations
    }
}

/// Serializable rule selection, as found in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleConfig {
    StatementPerSourceFile { min_percentage: f64 },
}

impl RuleConfig {
    pub fn build(&self) -> Box<dyn Rule> {
        match self {
            RuleConfig::StatementPerSourceFile { min_percentage } => {
                Box::new(StatementCoveragePerSourceFileRule::new(*min_percentage))
            }
        }
    }
}

/// Apply every rule in order.
pub fn enforce_all(rules: &[Box<dyn Rule>], tree: &mut CoverageTree) -> Vec<RuleViolation> {
    rules.iter().flat_map(|rule| rule.enforce(tree)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;

    fn tree(xml: &[u8]) -> CoverageTree {
        decode([xml]).unwrap().tree
    }

    const LOW_UNIT: &[u8] = br#"<report version="2">
        <environment name="ENV">
          <unit name="low.c"><coverage type="statement, %" value="1/10"/>
            <subprogram name="f"><coverage type="statement, %" value="1/10"/></subprogram>
          </unit>
          <unit name="high.c"><coverage type="statement, %" value="9/10"/></unit>
          <unit name="unmeasured.c"><coverage type="branch, %" value="0/4"/></unit>
        </environment>
        <environment name="OTHER">
          <unit name="fine.c"><coverage type="statement, %" value="5/5"/></unit>
        </environment></report>"#;

    #[test]
    fn test_failing_unit_fails_ancestors() {
        let mut tree = tree(LOW_UNIT);
        let rule = StatementCoveragePerSourceFileRule::new(50.0);
        let violations = rule.enforce(&mut tree);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, vec!["ENV", "low.c"]);
        assert_eq!(violations[0].percentage, 10.0);
        assert_eq!(violations[0].to_string(), "ENV/low.c failed (below 50.0%).");
        let fractional = RuleViolation {
            minimum: 12.5,
            ..violations[0].clone()
        };
        assert_eq!(fractional.to_string(), "ENV/low.c failed (below 12.5%).");

        assert!(tree.node(tree.find(&["ENV", "low.c"]).unwrap()).is_failed());
        assert!(tree.node(tree.find(&["ENV"]).unwrap()).is_failed());
        assert!(tree.is_failed());

        assert!(!tree.node(tree.find(&["ENV", "high.c"]).unwrap()).is_failed());
        assert!(!tree.node(tree.find(&["ENV", "low.c", "f"]).unwrap()).is_failed());
        assert!(!tree.node(tree.find(&["OTHER"]).unwrap()).is_failed());
    }

    #[test]
    fn test_unmeasured_units_are_skipped() {
        let mut tree = tree(LOW_UNIT);
        StatementCoveragePerSourceFileRule::new(50.0).enforce(&mut tree);
        assert!(!tree
            .node(tree.find(&["ENV", "unmeasured.c"]).unwrap())
            .is_failed());
    }

    #[test]
    fn test_compares_unrounded_percentage() {
        // 49.6% rounds to 50 but is still below the minimum
        let mut tree = tree(
            br#"<report version="2"><environment name="E">
            <unit name="u.c"><coverage type="statement, %" value="124/250"/></unit>
            </environment></report>"#,
        );
        let violations = StatementCoveragePerSourceFileRule::new(50.0).enforce(&mut tree);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_enforcement_is_idempotent() {
        let rules = vec![RuleConfig::StatementPerSourceFile {
            min_percentage: 50.0,
        }
        .build()];
        let mut tree = tree(LOW_UNIT);
        enforce_all(&rules, &mut tree);
        let first = tree.failed_nodes();
        enforce_all(&rules, &mut tree);
        assert_eq!(tree.failed_nodes(), first);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_rule_config_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rules: Vec<RuleConfig>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [[rules]]
            kind = "statement-per-source-file"
            min_percentage = 75.0
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.rules,
            vec![RuleConfig::StatementPerSourceFile {
                min_percentage: 75.0
            }]
        );
    }
}
