//! Step classification: infer a structural [`StepRole`] from a step's text.

use crate::types::{ClassifiedStep, Step, StepRole};

/// Strategy for inferring the role of a step.
pub trait StepClassifier: Send + Sync + std::fmt::Debug {
    fn classify(&self, step: &Step) -> StepRole;
}

/// A keyword rule: any marker present selects `role`.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub markers: Vec<String>,
    pub role: StepRole,
}

impl KeywordRule {
    pub fn new(role: StepRole, markers: &[&str]) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
            role,
        }
    }
}

/// Case-insensitive substring matcher over `label` + `description`.
/// Rules are tried in order; the first match wins, otherwise `fallback`.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
    fallback: StepRole,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                KeywordRule::new(StepRole::Branch, &["sub-investigation", "branch"]),
                KeywordRule::new(
                    StepRole::CrossValidate,
                    &["cross-validate", "cross-validation"],
                ),
                KeywordRule::new(StepRole::Inference, &["inference", "conclusion"]),
            ],
            fallback: StepRole::Sequential,
        }
    }
}

impl KeywordClassifier {
    pub fn with_rules(rules: Vec<KeywordRule>, fallback: StepRole) -> Self {
        Self { rules, fallback }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }
}

impl StepClassifier for KeywordClassifier {
    fn classify(&self, step: &Step) -> StepRole {
        let text = format!("{} {}", step.label, step.description).to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.markers.iter().any(|m| text.contains(m.as_str())))
            .map_or(self.fallback, |rule| rule.role)
    }
}

/// Classify a whole sequence, keeping order.
pub fn classify_all(steps: &[Step], classifier: &dyn StepClassifier) -> Vec<ClassifiedStep> {
    steps
        .iter()
        .map(|step| ClassifiedStep {
            role: classifier.classify(step),
            step: step.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_of(label: &str, description: &str) -> StepRole {
        KeywordClassifier::default().classify(&Step::new(label, description))
    }

    #[test]
    fn default_rules() {
        assert_eq!(role_of("Fetch Price Data", "x"), StepRole::Sequential);
        assert_eq!(role_of("Spawn Sub-Investigation", "y"), StepRole::Branch);
        assert_eq!(role_of("Cross-validate Data", "z"), StepRole::CrossValidate);
        assert_eq!(role_of("Cross-Validation: Data Check", ""), StepRole::CrossValidate);
        assert_eq!(role_of("Inference Node: Price Prediction", ""), StepRole::Inference);
        assert_eq!(role_of("Final", "In conclusion, buy"), StepRole::Inference);
    }

    #[test]
    fn markers_match_in_description_and_any_case() {
        assert_eq!(role_of("Earnings", "open a BRANCH on guidance"), StepRole::Branch);
        assert_eq!(role_of("CROSS-VALIDATE", ""), StepRole::CrossValidate);
    }

    #[test]
    fn priority_resolves_multiple_markers() {
        assert_eq!(
            role_of("Cross-validate findings", "from the sub-investigation"),
            StepRole::Branch
        );
        assert_eq!(
            role_of("Cross-validation", "before drawing a conclusion"),
            StepRole::CrossValidate
        );
    }

    #[test]
    fn unrelated_hyphenation_does_not_match() {
        assert_eq!(role_of("Validate cross sections", ""), StepRole::Sequential);
        assert_eq!(role_of("Sub investigation", ""), StepRole::Sequential);
    }

    #[test]
    fn custom_rule_table() {
        let classifier = KeywordClassifier::with_rules(
            vec![KeywordRule::new(StepRole::Inference, &["VERDICT"])],
            StepRole::Sequential,
        );
        assert_eq!(
            classifier.classify(&Step::new("Verdict: hold", "")),
            StepRole::Inference
        );
        assert_eq!(
            classifier.classify(&Step::new("Spawn Sub-Investigation", "")),
            StepRole::Sequential
        );
    }

    #[test]
    fn classify_all_keeps_order() {
        let steps = vec![
            Step::new("Fetch Price Data", "x"),
            Step::new("Spawn Sub-Investigation", "y"),
            Step::new("Cross-validate Data", "z"),
        ];
        let roles: Vec<_> = classify_all(&steps, &KeywordClassifier::default())
            .into_iter()
            .map(|c| c.role)
            .collect();
        assert_eq!(
            roles,
            [StepRole::Sequential, StepRole::Branch, StepRole::CrossValidate]
        );
    }

    mod prop {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn classification_is_deterministic(
                texts in proptest::collection::vec((".{0,60}", ".{0,60}"), 1..10)
            ) {
                let classifier = KeywordClassifier::default();
                let steps: Vec<Step> = texts.into_iter().map(|(l, d)| Step::new(l, d)).collect();
                let forward: Vec<_> = steps.iter().map(|s| classifier.classify(s)).collect();
                let backward: Vec<_> = steps.iter().rev().map(|s| classifier.classify(s)).collect();
                let reversed: Vec<_> = backward.into_iter().rev().collect();
                prop_assert_eq!(forward, reversed);
            }

            #[test]
            fn branch_marker_always_wins(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
                let step = Step::new(format!("{prefix}sub-investigation{suffix}"), "cross-validation conclusion");
                prop_assert_eq!(KeywordClassifier::default().classify(&step), StepRole::Branch);
            }
        }
    }
}
