//! Deferred command batches.

/// Commands queued between `begin()` and `end()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<String>,
}

impl CommandBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command.
    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    /// Queued commands in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The single write that flushes the batch: each command followed by a newline.
    pub fn to_script(&self) -> String {
        self.commands.iter().fold(String::new(), |mut script, command| {
            script.push_str(command);
            script.push('\n');
            script
        })
    }
}
