//! Output buffering and scrubbing.

/// How [`SessionOutput::render`] presents the last output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Strip echoed command lines and the trailing prompt line
    pub just_output: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { just_output: true }
    }
}

impl OutputOptions {
    /// Options that return the last output untouched.
    pub fn raw() -> Self {
        Self { just_output: false }
    }
}

/// The text buffers a session keeps.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    /// Output of the most recent completed collection
    last: String,
    /// Everything read since connect
    cumulative: String,
    /// Every command passed to exec, batched or not
    commands: Vec<String>,
}

impl SessionOutput {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the last output.
    pub fn set_last(&mut self, output: String) {
        self.last = output;
    }

    /// Output of the most recent completed collection, unmodified.
    pub fn last(&self) -> &str {
        &self.last
    }

    /// All output read since connect.
    pub fn cumulative(&self) -> &str {
        &self.cumulative
    }

    /// Append-only access for the collector.
    pub fn cumulative_mut(&mut self) -> &mut String {
        &mut self.cumulative
    }

    /// Remember a command for scrubbing.
    pub fn record_command(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    /// Commands recorded so far.
    pub fn recorded_commands(&self) -> &[String] {
        &self.commands
    }

    /// The last output as requested by `options`.
    pub fn render(&self, options: &OutputOptions) -> String {
        if options.just_output {
            scrub(&self.last, &self.commands)
        } else {
            self.last.clone()
        }
    }
}

/// Remove echoed command lines and the final line from `text`.
///
/// A line is an echo when it starts with one of `commands` once a trailing
/// carriage return is ignored. The final line is dropped regardless, since a
/// shell leaves its prompt there.
///
/// # Example
/// ```
/// use shellwright_session::output::scrub;
///
/// let raw = "ls -1\r\nCargo.toml\r\nsrc\r\n$ ";
/// assert_eq!(scrub(raw, &["ls -1".to_string()]), "Cargo.toml\r\nsrc\r");
/// ```
pub fn scrub(text: &str, commands: &[String]) -> String {
    let mut lines: Vec<&str> = text
        .split('\n')
        .filter(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            !commands
                .iter()
                .any(|command| !command.is_empty() && line.starts_with(command.as_str()))
        })
        .collect();
    lines.pop();
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_scrub_drops_echo_and_prompt() {
        let raw = "whoami\ndeploy\n$ ";
        assert_eq!(scrub(raw, &commands(&["whoami"])), "deploy");
    }

    #[test]
    fn test_scrub_without_echo_drops_last_line_only() {
        assert_eq!(scrub("ok\n", &[]), "ok");
        assert_eq!(scrub("a\nb\nc", &[]), "a\nb");
        assert_eq!(scrub("single", &[]), "");
        assert_eq!(scrub("", &[]), "");
    }

    #[test]
    fn test_scrub_ignores_empty_commands() {
        assert_eq!(scrub("a\nb\n", &commands(&[""])), "a\nb");
    }

    #[test]
    fn test_scrub_filters_before_dropping_last_line() {
        // The trailing echo is filtered out, then the remaining last line goes
        let raw = "out1\nout2\nexit";
        assert_eq!(scrub(raw, &commands(&["exit"])), "out1");
    }

    #[test]
    fn test_scrub_matches_prefix_with_carriage_return() {
        let raw = "cd /tmp\r\npwd\r\n/tmp\r\n$ ";
        assert_eq!(scrub(raw, &commands(&["cd /tmp", "pwd"])), "/tmp\r");
    }

    #[test]
    fn test_render_modes() {
        let mut output = SessionOutput::new();
        output.record_command("uptime");
        output.set_last("uptime\n 10:00 up 3 days\n$ ".to_string());

        assert_eq!(output.render(&OutputOptions::default()), " 10:00 up 3 days");
        assert_eq!(
            output.render(&OutputOptions::raw()),
            "uptime\n 10:00 up 3 days\n$ "
        );
        assert_eq!(output.recorded_commands(), &["uptime".to_string()]);
    }

    #[test]
    fn test_cumulative_is_append_only() {
        let mut output = SessionOutput::new();
        output.cumulative_mut().push_str("banner\n");
        output.set_last("first".to_string());
        output.cumulative_mut().push_str("first");
        output.set_last("second".to_string());
        assert_eq!(output.cumulative(), "banner\nfirst");
        assert_eq!(output.last(), "second");
    }
}
