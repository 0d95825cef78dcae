pub mod code_review;

use std::sync::Arc;

use loopgraph_core::traits::Node;

pub use code_review::{
    CheckComplexity, DetectIssues, EvaluateQuality, ExtractFunctions, SuggestImprovements,
};

/// Every built-in node.
pub fn all() -> Vec<Arc<dyn Node>> {
    vec![
        Arc::new(ExtractFunctions),
        Arc::new(CheckComplexity),
        Arc::new(DetectIssues),
        Arc::new(SuggestImprovements),
        Arc::new(EvaluateQuality),
    ]
}
