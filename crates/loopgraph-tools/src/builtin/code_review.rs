//! Toy code-review nodes: naive static checks over a `code` string.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use loopgraph_core::error::NodeError;
use loopgraph_core::state::State;
use loopgraph_core::traits::Node;

/// Deserialize the keys a node reads out of the full state.
/// Unknown keys are ignored; absent keys take the input type's defaults.
fn read_input<T: DeserializeOwned>(node: &str, state: &State) -> Result<T, NodeError> {
    serde_json::from_value(serde_json::Value::Object(state.data().clone()))
        .map_err(|e| NodeError::new(format!("{}: invalid input: {}", node, e)))
}

fn def_pattern() -> &'static Regex {
    static DEF: OnceLock<Regex> = OnceLock::new();
    DEF.get_or_init(|| {
        Regex::new(r"\bdef\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid def pattern")
    })
}

#[derive(Deserialize)]
struct CodeInput {
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct ComplexityInput {
    #[serde(default)]
    functions: Vec<String>,
}

#[derive(Deserialize)]
struct ScoreInput {
    #[serde(default)]
    issue_count: u64,
    #[serde(default)]
    complexity_score: f64,
}

pub struct ExtractFunctions;

impl Node for ExtractFunctions {
    fn name(&self) -> &str {
        "extract_functions"
    }

    fn description(&self) -> &str {
        "Collect function names from `def <name>(` headers in `code` into `functions`."
    }

    fn run(&self, state: &State) -> Result<State, NodeError> {
        let input: CodeInput = read_input(self.name(), state)?;
        let functions: Vec<String> = def_pattern()
            .captures_iter(&input.code)
            .map(|c| c[1].to_string())
            .collect();
        Ok(State::new().with("functions", functions))
    }
}

pub struct CheckComplexity;

impl Node for CheckComplexity {
    fn name(&self) -> &str {
        "check_complexity"
    }

    fn description(&self) -> &str {
        "Score complexity as the number of extracted functions (`complexity_score`)."
    }

    fn run(&self, state: &State) -> Result<State, NodeError> {
        let input: ComplexityInput = read_input(self.name(), state)?;
        Ok(State::new().with("complexity_score", input.functions.len() as f64))
    }
}

pub struct DetectIssues;

impl Node for DetectIssues {
    fn name(&self) -> &str {
        "detect_issues"
    }

    fn description(&self) -> &str {
        "Flag TODO comments and print() calls in `code` (`issues`, `issue_count`)."
    }

    fn run(&self, state: &State) -> Result<State, NodeError> {
        let input: CodeInput = read_input(self.name(), state)?;
        let mut issues = Vec::new();
        if input.code.contains("TODO") {
            issues.push("Unresolved TODO comment found.".to_string());
        }
        if input.code.contains("print(") {
            issues.push("Debug print statement found.".to_string());
        }
        let count = issues.len();
        Ok(State::new()
            .with("issues", issues)
            .with("issue_count", count))
    }
}

pub struct SuggestImprovements;

impl Node for SuggestImprovements {
    fn name(&self) -> &str {
        "suggest_improvements"
    }

    fn description(&self) -> &str {
        "Turn `issue_count` and `complexity_score` into `suggestions`."
    }

    fn run(&self, state: &State) -> Result<State, NodeError> {
        let input: ScoreInput = read_input(self.name(), state)?;
        let mut suggestions = Vec::new();
        if input.complexity_score > 5.0 {
            suggestions
                .push("Consider splitting the module into smaller, focused components.".to_string());
        }
        if input.issue_count > 0 {
            suggestions.push("Resolve the detected issues before merging.".to_string());
        }
        if suggestions.is_empty() {
            suggestions.push(
                "Code looks clean. Consider minor refactoring and docstring improvements."
                    .to_string(),
            );
        }
        Ok(State::new().with("suggestions", suggestions))
    }
}

pub struct EvaluateQuality;

impl EvaluateQuality {
    /// Quality in `[0, 1]`; fewer issues and lower complexity score higher.
    pub fn score(issue_count: u64, complexity: f64) -> f64 {
        let penalty = issue_count as f64 + complexity / 10.0;
        (1.0 - (penalty / 10.0).min(1.0)).max(0.0)
    }
}

impl Node for EvaluateQuality {
    fn name(&self) -> &str {
        "evaluate_quality"
    }

    fn description(&self) -> &str {
        "Compute `quality_score` in [0, 1] from `issue_count` and `complexity_score`."
    }

    fn run(&self, state: &State) -> Result<State, NodeError> {
        let input: ScoreInput = read_input(self.name(), state)?;
        let quality = Self::score(input.issue_count, input.complexity_score);
        Ok(State::new().with("quality_score", quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "def load(path):\n    # TODO: cache\n    return open(path)\n\ndef main():\n    print(load('x'))\n";

    #[test]
    fn test_extract_functions() {
        let state = State::new().with("code", SAMPLE);
        let out = ExtractFunctions.run(&state).unwrap();
        assert_eq!(out.get("functions"), Some(&json!(["load", "main"])));
    }

    #[test]
    fn test_extract_functions_without_code() {
        let out = ExtractFunctions.run(&State::new()).unwrap();
        assert_eq!(out.get("functions"), Some(&json!([])));
    }

    #[test]
    fn test_extract_functions_rejects_non_string_code() {
        let state = State::new().with("code", 42);
        let err = ExtractFunctions.run(&state).unwrap_err();
        assert!(err.to_string().starts_with("extract_functions: invalid input"));
    }

    #[test]
    fn test_check_complexity() {
        let state = State::new().with("functions", json!(["a", "b", "c"]));
        let out = CheckComplexity.run(&state).unwrap();
        assert_eq!(out.get_f64("complexity_score"), Some(3.0));
    }

    #[test]
    fn test_detect_issues() {
        let state = State::new().with("code", SAMPLE);
        let out = DetectIssues.run(&state).unwrap();
        assert_eq!(out.get("issue_count"), Some(&json!(2)));
        assert_eq!(out.get("issues").and_then(|v| v.as_array()).map(Vec::len), Some(2));
    }

    #[test]
    fn test_detect_issues_clean() {
        let state = State::new().with("code", "def f():\n    return 1\n");
        let out = DetectIssues.run(&state).unwrap();
        assert_eq!(out.get("issue_count"), Some(&json!(0)));
    }

    #[test]
    fn test_suggest_improvements() {
        let state = State::new()
            .with("issue_count", 1)
            .with("complexity_score", 7.0);
        let out = SuggestImprovements.run(&state).unwrap();
        assert_eq!(
            out.get("suggestions").and_then(|v| v.as_array()).map(Vec::len),
            Some(2)
        );

        let clean = SuggestImprovements.run(&State::new()).unwrap();
        let first = clean.get("suggestions").and_then(|v| v[0].as_str()).unwrap();
        assert!(first.starts_with("Code looks clean"));
    }

    #[test]
    fn test_quality_score_bounds() {
        assert_eq!(EvaluateQuality::score(0, 0.0), 1.0);
        assert_eq!(EvaluateQuality::score(20, 0.0), 0.0);
        assert!((EvaluateQuality::score(2, 2.0) - 0.78).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_quality_is_deterministic() {
        let state = State::new()
            .with("issue_count", 1)
            .with("complexity_score", 4.0);
        let a = EvaluateQuality.run(&state).unwrap();
        let b = EvaluateQuality.run(&state).unwrap();
        assert_eq!(a, b);
        assert!((a.get_f64("quality_score").unwrap() - 0.86).abs() < 1e-9);
    }
}
