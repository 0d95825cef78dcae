use loopgraph_core::error::StepError;
use loopgraph_core::graph::{EdgeRule, Target};
use loopgraph_core::state::{type_name, State};
use serde_json::Value;

/// Decide where the run goes after `from` has executed.
///
/// `state` must be the post-merge state of the step. A node without a rule is
/// an implicit terminator. A conditional rule whose key is absent from the
/// state is a fatal [`StepError::MissingKey`], never a silent false branch.
pub fn next_node(from: &str, rule: Option<&EdgeRule>, state: &State) -> Result<Target, StepError> {
    let rule = match rule {
        Some(r) => r,
        None => return Ok(Target::End),
    };

    match rule {
        EdgeRule::Unconditional { next } => Ok(next.clone()),
        EdgeRule::Conditional {
            condition_key,
            operator,
            threshold,
            if_true,
            if_false,
        } => {
            let observed = state.get(condition_key).ok_or_else(|| StepError::MissingKey {
                node: from.to_string(),
                key: condition_key.clone(),
            })?;
            let Value::Number(observed) = observed else {
                return Err(StepError::TypeMismatch {
                    node: from.to_string(),
                    key: condition_key.clone(),
                    found: type_name(observed).to_string(),
                });
            };
            // Thresholds are checked at graph creation; this only trips for
            // rules that bypassed validation.
            let Value::Number(threshold) = threshold else {
                return Err(StepError::TypeMismatch {
                    node: from.to_string(),
                    key: condition_key.clone(),
                    found: format!("{} threshold", type_name(threshold)),
                });
            };

            if operator.compare_numbers(observed, threshold) {
                Ok(if_true.clone())
            } else {
                Ok(if_false.clone())
            }
        }
    }
}
