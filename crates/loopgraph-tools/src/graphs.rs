//! Graph definitions shipped with the built-in nodes.

use loopgraph_core::graph::{EdgeRule, GraphDefinition, Operator, Target};

/// Id under which the code review graph is registered.
pub const CODE_REVIEW_GRAPH_ID: &str = "code_review";

/// Quality score at which the review loop stops.
pub const QUALITY_THRESHOLD: f64 = 0.8;

/// extract -> complexity -> issues -> improve -> score, looping back to
/// `improve` until `quality_score` reaches [`QUALITY_THRESHOLD`].
pub fn code_review() -> GraphDefinition {
    GraphDefinition::new("extract")
        .with_id(CODE_REVIEW_GRAPH_ID)
        .node_with_tool("extract", "extract_functions")
        .node_with_tool("complexity", "check_complexity")
        .node_with_tool("issues", "detect_issues")
        .node_with_tool("improve", "suggest_improvements")
        .node_with_tool("score", "evaluate_quality")
        .edge("extract", EdgeRule::to("complexity"))
        .edge("complexity", EdgeRule::to("issues"))
        .edge("issues", EdgeRule::to("improve"))
        .edge("improve", EdgeRule::to("score"))
        .edge(
            "score",
            EdgeRule::when(
                "quality_score",
                Operator::Gte,
                QUALITY_THRESHOLD,
                Target::End,
                "improve",
            ),
        )
}

/// All built-in graph definitions.
pub fn all() -> Vec<GraphDefinition> {
    vec![code_review()]
}
