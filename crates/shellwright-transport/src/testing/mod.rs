//! Scripted in-memory transport for deterministic tests.
//!
//! Every channel replays a [`ChannelScript`]: one entry per stdout poll,
//! followed by a tail that is either silent forever or repeats a chunk.
//! All activity is recorded in a shared [`TransportLog`] that tests can
//! inspect after the transport has been moved into a session.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use shellwright_core::{Error, HashAlgorithm, Result};

use crate::hostkey;
use crate::transport::{Channel, Connector, PublicKeyCredentials, Transport};

/// What a channel yields once its scripted polls are used up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Tail {
    /// Every further poll is empty
    #[default]
    Silent,
    /// Every further poll yields this chunk
    Repeat(Vec<u8>),
}

/// Per-poll script for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelScript {
    stdout: VecDeque<Vec<u8>>,
    stderr: Vec<u8>,
    tail: Tail,
}

impl ChannelScript {
    /// A channel that never produces output.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next poll yields `chunk`.
    pub fn then(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.stdout.push_back(chunk.as_ref().to_vec());
        self
    }

    /// The next `polls` polls are empty.
    pub fn then_quiet(mut self, polls: usize) -> Self {
        for _ in 0..polls {
            self.stdout.push_back(Vec::new());
        }
        self
    }

    /// Bytes returned by the first stderr read.
    pub fn with_stderr(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.stderr = bytes.as_ref().to_vec();
        self
    }

    /// After the scripted polls, keep yielding `chunk` forever.
    pub fn repeating(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.tail = Tail::Repeat(chunk.as_ref().to_vec());
        self
    }
}

/// Activity recorded for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelLog {
    /// Number of stdout polls
    pub polls: usize,
    /// Every write, in order
    pub writes: Vec<Vec<u8>>,
    /// Whether `close` was called
    pub closed: bool,
}

impl ChannelLog {
    /// All writes concatenated as text.
    pub fn written_text(&self) -> String {
        self.writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

/// Kind of channel recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// Exec channel for the given command
    Exec(String),
    /// Interactive shell channel
    Shell,
}

/// Activity recorded for a transport and all of its channels.
#[derive(Debug, Default)]
pub struct TransportLog {
    /// Successful connections
    pub connects: usize,
    /// Authentication attempts as `method:user`
    pub auth_attempts: Vec<String>,
    /// Fingerprint queries
    pub fingerprint_queries: Vec<HashAlgorithm>,
    /// Opened channels, in order
    pub channels: Vec<(ChannelKind, Arc<Mutex<ChannelLog>>)>,
    /// Whether `disconnect` was called
    pub disconnected: bool,
}

impl TransportLog {
    /// Commands of every exec channel opened so far.
    pub fn exec_commands(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter_map(|(kind, _)| match kind {
                ChannelKind::Exec(command) => Some(command.clone()),
                ChannelKind::Shell => None,
            })
            .collect()
    }

    /// Number of shell channels opened so far.
    pub fn shells_opened(&self) -> usize {
        self.channels
            .iter()
            .filter(|(kind, _)| *kind == ChannelKind::Shell)
            .count()
    }

    /// Snapshot of the `index`-th opened channel.
    pub fn channel(&self, index: usize) -> Option<ChannelLog> {
        self.channels
            .get(index)
            .map(|(_, log)| log.lock().unwrap().clone())
    }

    /// Channels opened plus polls and writes across all channels.
    pub fn io_events(&self) -> usize {
        self.channels
            .iter()
            .map(|(_, log)| {
                let log = log.lock().unwrap();
                1 + log.polls + log.writes.len()
            })
            .sum()
    }
}

/// Channel replaying a [`ChannelScript`].
#[derive(Debug)]
pub struct ScriptedChannel {
    script: ChannelScript,
    log: Arc<Mutex<ChannelLog>>,
}

impl ScriptedChannel {
    /// Create a channel with its own log.
    pub fn new(script: ChannelScript) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(ChannelLog::default())),
        }
    }

    /// Shared handle to this channel's log.
    pub fn log(&self) -> Arc<Mutex<ChannelLog>> {
        Arc::clone(&self.log)
    }
}

impl Channel for ScriptedChannel {
    fn read_stdout(&mut self) -> Result<Vec<u8>> {
        self.log.lock().unwrap().polls += 1;
        Ok(match self.script.stdout.pop_front() {
            Some(chunk) => chunk,
            None => match &self.script.tail {
                Tail::Silent => Vec::new(),
                Tail::Repeat(chunk) => chunk.clone(),
            },
        })
    }

    fn read_stderr(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.script.stderr))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut log = self.log.lock().unwrap();
        if log.closed {
            return Err(Error::Transport("channel is closed".to_string()));
        }
        log.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Transport handing out scripted channels.
///
/// Exec and shell channels are served from separate queues in open order;
/// once a queue is empty further channels are silent.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    exec_scripts: VecDeque<ChannelScript>,
    shell_scripts: VecDeque<ChannelScript>,
    host_key: Vec<u8>,
    credentials: Option<(String, String)>,
    log: Arc<Mutex<TransportLog>>,
}

impl ScriptedTransport {
    /// Create a transport accepting any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next exec channel.
    pub fn with_exec(mut self, script: ChannelScript) -> Self {
        self.exec_scripts.push_back(script);
        self
    }

    /// Queue a script for the next shell channel.
    pub fn with_shell(mut self, script: ChannelScript) -> Self {
        self.shell_scripts.push_back(script);
        self
    }

    /// Host key blob that fingerprints are computed from.
    pub fn with_host_key(mut self, blob: impl AsRef<[u8]>) -> Self {
        self.host_key = blob.as_ref().to_vec();
        self
    }

    /// Only accept this user and password; disables the "none" method.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Shared handle to the transport log.
    pub fn log(&self) -> Arc<Mutex<TransportLog>> {
        Arc::clone(&self.log)
    }

    fn check_user(&self, username: &str) -> Result<()> {
        match &self.credentials {
            Some((user, _)) if user != username => Err(Error::AuthenticationFailed(format!(
                "unknown user '{username}'"
            ))),
            _ => Ok(()),
        }
    }

    fn register(&mut self, kind: ChannelKind, script: ChannelScript) -> Box<dyn Channel> {
        let channel = ScriptedChannel::new(script);
        self.log.lock().unwrap().channels.push((kind, channel.log()));
        Box::new(channel)
    }
}

impl Transport for ScriptedTransport {
    fn fingerprint(&mut self, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
        self.log.lock().unwrap().fingerprint_queries.push(algorithm);
        Ok(hostkey::digest(algorithm, &self.host_key))
    }

    fn auth_password(&mut self, username: &str, password: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .auth_attempts
            .push(format!("password:{username}"));
        self.check_user(username)?;
        match &self.credentials {
            Some((_, expected)) if expected != password => Err(Error::AuthenticationFailed(
                "password rejected".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn auth_public_key(
        &mut self,
        username: &str,
        _credentials: &PublicKeyCredentials,
    ) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .auth_attempts
            .push(format!("publickey:{username}"));
        self.check_user(username)
    }

    fn auth_none(&mut self, username: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .auth_attempts
            .push(format!("none:{username}"));
        if self.credentials.is_some() {
            return Err(Error::AuthenticationFailed(
                "none method not allowed".to_string(),
            ));
        }
        Ok(())
    }

    fn open_exec_channel(&mut self, command: &str) -> Result<Box<dyn Channel>> {
        let script = self.exec_scripts.pop_front().unwrap_or_default();
        Ok(self.register(ChannelKind::Exec(command.to_string()), script))
    }

    fn open_shell_channel(&mut self) -> Result<Box<dyn Channel>> {
        let script = self.shell_scripts.pop_front().unwrap_or_default();
        Ok(self.register(ChannelKind::Shell, script))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.log.lock().unwrap().disconnected = true;
        Ok(())
    }
}

/// Connector handing out clones of a [`ScriptedTransport`], or refusing.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    transport: ScriptedTransport,
    refusal: Option<String>,
}

impl ScriptedConnector {
    /// Connector that always succeeds with `transport`.
    pub fn new(transport: ScriptedTransport) -> Self {
        Self {
            transport,
            refusal: None,
        }
    }

    /// Connector that always refuses with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            transport: ScriptedTransport::new(),
            refusal: Some(reason.into()),
        }
    }

    /// Shared handle to the transport log.
    pub fn log(&self) -> Arc<Mutex<TransportLog>> {
        self.transport.log()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        if let Some(reason) = &self.refusal {
            return Err(Error::ConnectionRefused {
                host: host.to_string(),
                port,
                reason: reason.clone(),
            });
        }
        self.transport.log.lock().unwrap().connects += 1;
        Ok(Box::new(self.transport.clone()))
    }
}
