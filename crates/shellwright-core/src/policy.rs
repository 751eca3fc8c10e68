//! Wait policies for output collection.

use std::time::Duration;

use crate::pattern::Pattern;
use crate::Result;

/// Default number of consecutive empty reads that end a collection.
pub const DEFAULT_QUIET_CYCLES: u32 = 7;

/// Policy controlling when an output collection cycle is considered complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Output is not considered new until this pattern matches
    pub start_pattern: Option<String>,

    /// Collection stops as soon as this pattern matches
    pub end_pattern: Option<String>,

    /// Do not start quiet-period counting before any output was seen
    pub require_at_least_one_char: bool,

    /// Consecutive empty reads required before ending
    pub quiet_cycles_before_end: u32,

    /// Extra sleep on each empty read once the quiet phase has begun
    pub pause_before_end: Duration,

    /// Sleep between polls
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            start_pattern: None,
            end_pattern: None,
            require_at_least_one_char: false,
            quiet_cycles_before_end: DEFAULT_QUIET_CYCLES,
            pause_before_end: Duration::from_micros(10_000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl WaitPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop collecting as soon as `pattern` matches.
    pub fn for_end_pattern(pattern: impl Into<String>) -> Self {
        Self {
            end_pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Ignore output until `pattern` has matched.
    pub fn with_start_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.start_pattern = Some(pattern.into());
        self
    }

    /// Set the end pattern.
    pub fn with_end_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.end_pattern = Some(pattern.into());
        self
    }

    /// Require at least one character of output before counting silence.
    pub fn with_require_at_least_one_char(mut self, required: bool) -> Self {
        self.require_at_least_one_char = required;
        self
    }

    /// Set the number of quiet cycles.
    pub fn with_quiet_cycles(mut self, cycles: u32) -> Self {
        self.quiet_cycles_before_end = cycles;
        self
    }

    /// Set the pause inserted on each empty read of the ending phase.
    pub fn with_pause_before_end(mut self, pause: Duration) -> Self {
        self.pause_before_end = pause;
        self
    }

    /// Set polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Apply caller overrides on top of this policy.
    pub fn merge(&self, overrides: &WaitPolicyOverrides) -> Self {
        Self {
            start_pattern: overrides
                .start_pattern
                .clone()
                .or_else(|| self.start_pattern.clone()),
            end_pattern: overrides
                .end_pattern
                .clone()
                .or_else(|| self.end_pattern.clone()),
            require_at_least_one_char: overrides
                .require_at_least_one_char
                .unwrap_or(self.require_at_least_one_char),
            quiet_cycles_before_end: overrides
                .quiet_cycles_before_end
                .unwrap_or(self.quiet_cycles_before_end),
            pause_before_end: overrides.pause_before_end.unwrap_or(self.pause_before_end),
            poll_interval: overrides.poll_interval.unwrap_or(self.poll_interval),
        }
    }

    /// Compile the start and end patterns.
    pub fn compile(&self) -> Result<(Option<Pattern>, Option<Pattern>)> {
        let start = self.start_pattern.as_deref().map(Pattern::parse).transpose()?;
        let end = self.end_pattern.as_deref().map(Pattern::parse).transpose()?;
        Ok((start, end))
    }
}

/// Per-call overrides merged onto a base [`WaitPolicy`].
///
/// Every `None` field keeps the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitPolicyOverrides {
    /// Start pattern override
    pub start_pattern: Option<String>,
    /// End pattern override
    pub end_pattern: Option<String>,
    /// Minimum-character gate override
    pub require_at_least_one_char: Option<bool>,
    /// Quiet cycle override
    pub quiet_cycles_before_end: Option<u32>,
    /// Ending pause override
    pub pause_before_end: Option<Duration>,
    /// Poll interval override
    pub poll_interval: Option<Duration>,
}

impl WaitPolicyOverrides {
    /// Overrides that keep every base value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the start pattern.
    pub fn with_start_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.start_pattern = Some(pattern.into());
        self
    }

    /// Override the end pattern.
    pub fn with_end_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.end_pattern = Some(pattern.into());
        self
    }

    /// Override the minimum-character gate.
    pub fn with_require_at_least_one_char(mut self, required: bool) -> Self {
        self.require_at_least_one_char = Some(required);
        self
    }

    /// Override the quiet cycle count.
    pub fn with_quiet_cycles(mut self, cycles: u32) -> Self {
        self.quiet_cycles_before_end = Some(cycles);
        self
    }

    /// Override the ending pause.
    pub fn with_pause_before_end(mut self, pause: Duration) -> Self {
        self.pause_before_end = Some(pause);
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Check whether no field is overridden.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
