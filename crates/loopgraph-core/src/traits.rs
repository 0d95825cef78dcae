use crate::error::NodeError;
use crate::state::State;

/// A named, pure state transformation.
///
/// `run` receives the full current state and returns only the keys it wants
/// to change. The executor merges that delta into the run's state. The same
/// input must always produce the same output; nodes do no I/O.
pub trait Node: Send + Sync + 'static {
    /// Registry name.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Compute the state delta for the given state.
    fn run(&self, state: &State) -> Result<State, NodeError>;
}

/// Adapter turning a closure into a [`Node`].
pub struct FnNode<F> {
    name: String,
    description: String,
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&State) -> Result<State, NodeError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            f,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl<F> Node for FnNode<F>
where
    F: Fn(&State) -> Result<State, NodeError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, state: &State) -> Result<State, NodeError> {
        (self.f)(state)
    }
}
