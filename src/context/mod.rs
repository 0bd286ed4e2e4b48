pub mod aggregator;
pub mod analyzer;
pub mod prompt;
pub mod synthesis;
pub mod window;

pub use aggregator::{is_significant, AggregatorHandle, ContextAggregator, ContextState, ContextView};
pub use analyzer::LexicalAnalyzer;
pub use prompt::render_prompt;
pub use window::ActivityWindow;
