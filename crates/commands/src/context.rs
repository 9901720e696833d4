use std::time::Duration;

/// Who issues a command and how long it may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Recorded as the editor of every event the command appends.
    pub editor: String,
    /// Overrides the retry policy's deadline.
    pub timeout: Option<Duration>,
}

impl CommandContext {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            timeout: None,
        }
    }

    /// Context of commands the system issues on its own behalf.
    pub fn system() -> Self {
        Self::new("system")
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
