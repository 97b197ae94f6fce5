//! # Shadow Pipeline
//!
//! The pure half of a conversion: everything between "pseudocode changed" and
//! "prompts are ready", plus cleanup of what comes back.
//!
//! ```text
//! checkpoint ─┐
//!             ├─ DiffEngine ──────────────┐
//! pseudocode ─┤                           ├─ PromptAssembler ─> (system, user)
//!             └─ DirectiveContextExtractor┘        ▲
//!                                   PromptLibrary ─┘
//! ```

mod context;
mod diff;
mod error;
mod output;
mod prompt;

pub use context::{ContextBundle, ContextFile, DirectiveContextExtractor};
pub use diff::{DiffEngine, ADDED_PREFIX, REMOVED_PREFIX, UNCHANGED_PREFIX};
pub use error::{PipelineError, Result};
pub use output::strip_code_fence;
pub use prompt::{
    render_placeholders, PromptAssembler, PromptInputs, PromptLibrary, PromptTemplates, Prompts,
    CONTEXT_PLACEHOLDER, DEFAULT_TEMPLATE_DIR, EXISTING_CODE_PLACEHOLDER, LANGUAGE_PLACEHOLDER,
    PSEUDOCODE_PLACEHOLDER, SYSTEM_PROMPT_FILE, USER_PROMPT_FILE,
};
