//! # Shadow Protocol
//!
//! Vocabulary shared by every shadow-sync crate.
//!
//! ```text
//! <root>/src/foo.ts  <──── ShadowLayout ────>  <root>/.shadows/src/foo.ts.shadow
//!        │                                              │
//!   LanguageTag("ts")                        use("a.ts") directives
//! ```
//!
//! Nothing in here touches the filesystem: the shadow/target mapping is a pure
//! string transformation so both directions can be recovered from either side.

mod directive;
mod language;
mod paths;
mod update;

pub use directive::{DirectiveScanner, DEFAULT_DIRECTIVE_NAMES};
pub use language::LanguageTag;
pub use paths::{
    checkpoint_key, id_from_checkpoint_key, ShadowLayout, ShadowPair, ShadowPathError,
    CHECKPOINT_KEY_PREFIX, DEFAULT_SHADOW_DIR, SHADOW_SUFFIX,
};
pub use update::{SyncOutcome, SyncUpdate};
