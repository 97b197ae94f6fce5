use serde::Serialize;
use std::time::SystemTime;

/// What happened when a scheduled trigger was evaluated for a shadow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Output was applied to the target and the checkpoint advanced.
    Converted { output_chars: usize },
    /// Pseudocode matched the checkpoint; the model was not contacted.
    Unchanged,
    /// Generation failed; the checkpoint was left untouched.
    Failed { message: String, retryable: bool },
    /// The shadow file was unwatched before the output could be applied.
    Discarded,
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Converted { .. } | Self::Unchanged)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncUpdate {
    pub shadow_id: String,
    pub outcome: SyncOutcome,
    pub duration_ms: u64,
    pub completed_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let value = serde_json::to_value(SyncOutcome::Failed {
            message: "quota".to_string(),
            retryable: true,
        })
        .expect("serialize");
        assert_eq!(value["kind"], "failed");
        assert_eq!(value["retryable"], true);
        assert!(SyncOutcome::Unchanged.is_success());
        assert!(!SyncOutcome::Discarded.is_success());
    }
}
