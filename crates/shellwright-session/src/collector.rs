//! Output collection for streams without an end-of-command marker.
//!
//! A remote shell gives no structural signal that a command has finished, so
//! the collector infers it: a fixed run of empty polls means the other side
//! has gone idle. An end pattern (typically a prompt) ends collection as soon
//! as it matches instead, and a start pattern holds collection back until a
//! known marker has been seen.

use std::time::{Duration, Instant};

use tracing::debug;

use shellwright_core::{Error, Result, WaitPolicy};
use shellwright_transport::Channel;

/// Collects one command's response from a channel's stdout.
#[derive(Debug, Clone, Copy)]
pub struct OutputCollector<'a> {
    policy: &'a WaitPolicy,
    timeout: Duration,
}

impl<'a> OutputCollector<'a> {
    /// Create a collector bounded by `timeout`.
    pub fn new(policy: &'a WaitPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    /// Poll `channel` until the policy says the response is complete.
    ///
    /// Every chunk read is also appended to `cumulative`, including chunks
    /// read while start-gated and chunks of a collection that times out.
    ///
    /// # Errors
    ///
    /// `Error::Regex` if a pattern does not compile (before any read),
    /// `Error::Timeout` if the deadline passes first; the partial output is
    /// not returned.
    ///
    /// # Example
    /// ```
    /// # use std::time::Duration;
    /// # use shellwright_core::WaitPolicy;
    /// # use shellwright_session::OutputCollector;
    /// # use shellwright_transport::testing::{ChannelScript, ScriptedChannel};
    /// let mut channel = ScriptedChannel::new(ChannelScript::new().then("total 0\n$ "));
    /// let policy = WaitPolicy::for_end_pattern(r"\$ $");
    /// let mut cumulative = String::new();
    ///
    /// let output = OutputCollector::new(&policy, Duration::from_secs(1))
    ///     .collect(&mut channel, &mut cumulative)
    ///     .unwrap();
    /// assert_eq!(output, "total 0\n$ ");
    /// ```
    pub fn collect(&self, channel: &mut dyn Channel, cumulative: &mut String) -> Result<String> {
        let (start_pattern, end_pattern) = self.policy.compile()?;
        let quiet_target = self.policy.quiet_cycles_before_end;

        let started = Instant::now();
        let deadline = started.checked_add(self.timeout);

        let mut decoder = Utf8Decoder::default();
        let mut collected = String::new();
        let mut gate_open = start_pattern.is_none();
        let mut seen_output = false;
        let mut quiet = 0u32;
        let mut ending = 0u32;
        let mut polls = 0usize;

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(
                    "Collection timed out: polls={}, collected={} bytes, gate_open={}",
                    polls,
                    collected.len(),
                    gate_open
                );
                return Err(Error::Timeout(timeout_ms(self.timeout)));
            }

            let bytes = channel.read_stdout()?;
            polls += 1;
            let chunk = decoder.decode(&bytes);
            collected.push_str(&chunk);
            cumulative.push_str(&chunk);

            if !gate_open {
                if start_pattern
                    .as_ref()
                    .is_some_and(|pattern| pattern.is_match(&collected))
                {
                    debug!("Start pattern matched after {} polls", polls);
                    gate_open = true;
                } else {
                    std::thread::sleep(self.policy.poll_interval);
                    continue;
                }
            }

            if bytes.is_empty() {
                if quiet < quiet_target
                    && (seen_output || !self.policy.require_at_least_one_char)
                {
                    quiet += 1;
                }
                if quiet >= quiet_target {
                    std::thread::sleep(self.policy.pause_before_end);
                    ending += 1;
                }
            } else {
                // Past warm-up for the rest of this cycle; quiet runs must be consecutive
                seen_output = true;
                quiet = quiet_target;
                ending = 0;
            }

            let done = match &end_pattern {
                Some(pattern) => pattern.is_match(&collected),
                None => ending >= quiet_target,
            };

            if done {
                let tail = decoder.finish();
                collected.push_str(&tail);
                cumulative.push_str(&tail);
                debug!(
                    "Collection complete: polls={}, bytes={}, elapsed={}ms",
                    polls,
                    collected.len(),
                    started.elapsed().as_millis()
                );
                return Ok(collected);
            }

            std::thread::sleep(self.policy.poll_interval);
        }
    }
}

/// Milliseconds reported by `Error::Timeout`, saturating at `u64::MAX`.
fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Decodes UTF-8 across chunk boundaries.
///
/// An incomplete multi-byte sequence at the end of a chunk is held back until
/// the next chunk instead of becoming a replacement character.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a trailing, not yet complete, UTF-8 sequence.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for k in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - k];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > k { k } else { 0 };
    }
    0
}
