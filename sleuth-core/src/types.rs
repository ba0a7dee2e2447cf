use serde::{Deserialize, Serialize};

// ── Typed ID wrappers ──────────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub usize);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            fn from(id: usize) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(NodeId);
typed_id!(EdgeId);

// ── Steps ──────────────────────────────────────────────────────────

/// One unit of narrated reasoning text. Order within a sequence is the
/// only signal of temporal/causal progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(alias = "title")]
    pub label: String,
    #[serde(default, alias = "content")]
    pub description: String,
}

impl Step {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// Inferred structural category of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepRole {
    /// Continues the main chain from the previous step.
    Sequential,
    /// Spawns a sub-investigation off the main chain.
    Branch,
    /// Reconsiders an earlier step.
    CrossValidate,
    /// Draws a conclusion from what came before.
    Inference,
}

impl StepRole {
    pub const ALL: [Self; 4] = [
        Self::Sequential,
        Self::Branch,
        Self::CrossValidate,
        Self::Inference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "Sequential",
            Self::Branch => "Branch",
            Self::CrossValidate => "CrossValidate",
            Self::Inference => "Inference",
        }
    }
}

impl std::fmt::Display for StepRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step paired with the role a classifier inferred for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedStep {
    pub step: Step,
    pub role: StepRole,
}

// ── Graph elements ─────────────────────────────────────────────────

/// A node of the investigation graph, one per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Position of the originating step in the normalized sequence.
    pub step_index: usize,
    pub role: StepRole,
    /// 0 on the main chain, >0 for nodes spawned by a `Branch` step.
    pub branch_depth: u32,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Sequential,
    Branch,
    CrossValidate,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "Sequential",
            Self::Branch => "Branch",
            Self::CrossValidate => "CrossValidate",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, directed edge. `source` is always created before `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// Layout hint for a renderer. Never stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Grid placement: steps advance along x, sub-investigations drop along y.
    #[allow(clippy::cast_precision_loss)]
    pub fn for_node(node: &Node, spacing: (f64, f64)) -> Self {
        Self {
            x: node.step_index as f64 * spacing.0,
            y: f64::from(node.branch_depth) * spacing.1,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_accepts_title_and_content_aliases() {
        let step: Step =
            serde_json::from_str(r#"{"title":"Fetch Price Data","content":"stooq"}"#).unwrap();
        assert_eq!(step, Step::new("Fetch Price Data", "stooq"));

        let step: Step = serde_json::from_str(r#"{"label":"Only label"}"#).unwrap();
        assert_eq!(step.description, "");
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&NodeId(3)).unwrap(), "3");
        assert_eq!(NodeId::from(7).to_string(), "7");
        assert_eq!(EdgeId(2).to_string(), "2");
    }

    #[test]
    fn position_follows_index_and_depth() {
        let node = Node {
            id: NodeId(4),
            step_index: 4,
            role: StepRole::Branch,
            branch_depth: 1,
            label: "Spawn Sub-Investigation".into(),
            description: String::new(),
        };
        let pos = Position::for_node(&node, (250.0, 150.0));
        assert!((pos.x - 1000.0).abs() < f64::EPSILON);
        assert!((pos.y - 150.0).abs() < f64::EPSILON);
    }

    mod prop {
        use super::super::*;
        use proptest::prelude::*;

        fn arb_role() -> impl Strategy<Value = StepRole> {
            prop_oneof![
                Just(StepRole::Sequential),
                Just(StepRole::Branch),
                Just(StepRole::CrossValidate),
                Just(StepRole::Inference),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn role_as_str_stable(role in arb_role()) {
                let s = role.as_str();
                prop_assert!(!s.is_empty());
                prop_assert_eq!(role.to_string(), s);
            }

            #[test]
            fn role_serde_roundtrip(role in arb_role()) {
                let json = serde_json::to_string(&role).unwrap();
                let back: StepRole = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(back, role);
            }
        }
    }
}
