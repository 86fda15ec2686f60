//! Interactive prompt handling: recognizing confirmation prompts in agent
//! output and answering them.

pub mod automator;
pub mod matcher;

pub use automator::{DEFAULT_MAX_AUTO_RESPONSES, PromptAutomator};
pub use matcher::{PatternMatcher, PromptMatch, PromptPattern};
