use serde::{Deserialize, Serialize};

/// Why an indicator is being updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarEvent {
    /// A bar replayed from history.
    HistoricalBar,
    /// A new live bar has opened; the previous bar is now closed.
    NewBar,
    /// The current live bar changed and is still forming.
    NewTick,
}

impl BarEvent {
    /// Whether this event closes the previous bar, committing whatever state
    /// was computed for it.
    pub fn commits(self) -> bool {
        !matches!(self, BarEvent::NewTick)
    }
}

/// Who changed a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Edited interactively by the user.
    Manual,
    /// Applied programmatically while restoring a saved layout.
    Restore,
}
