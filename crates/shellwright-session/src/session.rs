//! Remote command session.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use shellwright_core::{
    ClientConfig, Error, ExecMode, FingerprintFlags, Result, SessionId, SessionState, WaitPolicy,
    WaitPolicyOverrides,
};
use shellwright_transport::{Channel, Connector, Transport};

use crate::auth::Authenticator;
use crate::batch::CommandBatch;
use crate::collector::OutputCollector;
use crate::output::{OutputOptions, SessionOutput};

/// Default wait budget for a single output collection.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where commands outside a batch are sent.
enum ChannelMode {
    /// One exec channel per command
    Direct,
    /// Persistent interactive shell
    Shell(Box<dyn Channel>),
}

impl ChannelMode {
    fn kind(&self) -> ExecMode {
        match self {
            Self::Direct => ExecMode::Direct,
            Self::Shell(_) => ExecMode::Shell,
        }
    }
}

/// A stateful session against one host.
///
/// Operations are synchronous: each `exec` blocks until the output collector
/// decides the command's response is complete or the timeout elapses.
pub struct Session {
    /// Session identifier, used for log correlation
    id: SessionId,

    /// Target host
    host: String,

    /// Target port
    port: u16,

    /// Budget for each output collection
    timeout: Duration,

    /// Default wait policy
    policy: WaitPolicy,

    /// Factory for the transport
    connector: Box<dyn Connector>,

    /// Established transport, absent before connect and after disconnect
    transport: Option<Box<dyn Transport>>,

    /// Connection state
    state: SessionState,

    /// Direct or shell execution
    mode: ChannelMode,

    /// Commands queued between begin() and end()
    batch: Option<CommandBatch>,

    /// Output buffers and recorded commands
    output: SessionOutput,
}

impl Session {
    /// Create an idle session for `host:port`.
    pub fn new(host: impl Into<String>, port: u16, connector: impl Connector + 'static) -> Self {
        let session = Self {
            id: SessionId::new(),
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            policy: WaitPolicy::default(),
            connector: Box::new(connector),
            transport: None,
            state: SessionState::Idle,
            mode: ChannelMode::Direct,
            batch: None,
            output: SessionOutput::new(),
        };
        debug!(
            "Session created: id={}, target={}:{}",
            session.id, session.host, session.port
        );
        session
    }

    /// Create an idle session from the connection and wait sections of `config`.
    pub fn from_config(config: &ClientConfig, connector: impl Connector + 'static) -> Self {
        let mut session = Self::new(config.connection.host.clone(), config.connection.port, connector)
            .with_policy(config.wait.to_policy());
        session.set_timeout(config.timeout());
        session
    }

    /// Replace the default wait policy.
    pub fn with_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Default wait policy.
    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Get the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Target port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Budget for each output collection.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the collection budget for subsequent waits.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a transport was established.
    ///
    /// Keeps its value after [`disconnect`](Self::disconnect).
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Whether authentication completed.
    ///
    /// Keeps its value after [`disconnect`](Self::disconnect).
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Current execution mode.
    pub fn mode(&self) -> ExecMode {
        self.mode.kind()
    }

    /// Whether commands are being queued.
    pub fn is_in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Commands queued since `begin()`.
    pub fn pending_commands(&self) -> &[String] {
        match &self.batch {
            Some(batch) => batch.commands(),
            None => &[],
        }
    }

    /// Establish the transport.
    ///
    /// Does nothing when a transport is already held.
    pub fn connect(&mut self) -> Result<&mut Self> {
        if self.transport.is_some() {
            debug!("Session {} already connected", self.id);
            return Ok(self);
        }

        info!(
            "Connecting session {} to {}:{}",
            self.id, self.host, self.port
        );
        let transport = match self.connector.connect(&self.host, self.port) {
            Ok(transport) => transport,
            Err(e) => {
                error!(
                    "Connection to {}:{} failed: {}",
                    self.host, self.port, e
                );
                return Err(e);
            }
        };

        self.transport = Some(transport);
        self.state = SessionState::Connected;
        info!("Session {} connected", self.id);
        Ok(self)
    }

    /// Compare the host's identity fingerprint against `expected`.
    ///
    /// The comparison ignores ASCII case. Leaves the state unchanged.
    pub fn verify_fingerprint(
        &mut self,
        expected: &str,
        flags: FingerprintFlags,
    ) -> Result<&mut Self> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        let digest = transport.fingerprint(flags.algorithm)?;

        if !flags.matches(&digest, expected) {
            let actual = flags.render(&digest);
            warn!(
                "Fingerprint mismatch for {}: expected={}, actual={}",
                self.host, expected, actual
            );
            return Err(Error::BadFingerprint {
                expected: expected.to_string(),
                actual,
            });
        }

        debug!("Fingerprint verified for {} ({:?})", self.host, flags.algorithm);
        Ok(self)
    }

    /// Authenticate with `authenticator`.
    ///
    /// Failures from the strategy are returned unmodified.
    pub fn authenticate(&mut self, authenticator: &dyn Authenticator) -> Result<&mut Self> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        if let Err(e) = authenticator.authenticate(transport.as_mut()) {
            error!("Authentication failed for session {}: {}", self.id, e);
            return Err(e);
        }

        self.state = SessionState::Authenticated;
        info!("Session {} authenticated", self.id);
        Ok(self)
    }

    /// Open a persistent shell and send later commands to it.
    ///
    /// The login banner is collected with the default policy and kept only in
    /// the global output.
    pub fn enter_shell_mode(&mut self) -> Result<&mut Self> {
        self.enter_shell_mode_with_policy(&WaitPolicyOverrides::default())
    }

    /// Like [`enter_shell_mode`](Self::enter_shell_mode), collecting the banner
    /// with `overrides` merged onto the default policy.
    pub fn enter_shell_mode_with_policy(
        &mut self,
        overrides: &WaitPolicyOverrides,
    ) -> Result<&mut Self> {
        self.ensure_authenticated()?;
        if let ChannelMode::Shell(_) = self.mode {
            debug!("Session {} already in shell mode", self.id);
            return Ok(self);
        }

        let policy = self.policy.merge(overrides);
        let timeout = self.timeout;
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        let mut channel = transport.open_shell_channel()?;
        let banner = OutputCollector::new(&policy, timeout)
            .collect(channel.as_mut(), self.output.cumulative_mut())?;
        debug!("Discarded shell banner: {} bytes", banner.len());

        self.mode = ChannelMode::Shell(channel);
        info!("Session {} entered shell mode", self.id);
        Ok(self)
    }

    /// Run `command` with the default policy.
    ///
    /// Inside a batch the command is only queued.
    pub fn exec(&mut self, command: &str) -> Result<&mut Self> {
        self.exec_inner(command, &WaitPolicyOverrides::default(), None::<fn(&str, &str)>)
    }

    /// Run `command` with `overrides` merged onto the default policy.
    pub fn exec_with_policy(
        &mut self,
        command: &str,
        overrides: &WaitPolicyOverrides,
    ) -> Result<&mut Self> {
        self.exec_inner(command, overrides, None::<fn(&str, &str)>)
    }

    /// Run `command` and hand its stdout and stderr to `callback`.
    ///
    /// The output is buffered as well. Queued commands never invoke the callback.
    pub fn exec_with_callback<F>(&mut self, command: &str, callback: F) -> Result<&mut Self>
    where
        F: FnOnce(&str, &str),
    {
        self.exec_inner(command, &WaitPolicyOverrides::default(), Some(callback))
    }

    /// Run `command` with both a policy override and a callback.
    pub fn exec_with<F>(
        &mut self,
        command: &str,
        overrides: &WaitPolicyOverrides,
        callback: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&str, &str),
    {
        self.exec_inner(command, overrides, Some(callback))
    }

    /// Start queueing commands instead of running them.
    ///
    /// An existing queue is kept.
    pub fn begin(&mut self) -> &mut Self {
        if self.batch.is_none() {
            debug!("Session {} entering batch mode", self.id);
            self.batch = Some(CommandBatch::new());
        }
        self
    }

    /// Run the queued commands on a new shell channel and leave batch mode.
    pub fn end(&mut self) -> Result<&mut Self> {
        self.end_inner(&WaitPolicyOverrides::default(), None::<fn(&str, &str)>)
    }

    /// Like [`end`](Self::end), with `overrides` merged onto the default policy.
    pub fn end_with_policy(&mut self, overrides: &WaitPolicyOverrides) -> Result<&mut Self> {
        self.end_inner(overrides, None::<fn(&str, &str)>)
    }

    /// Like [`end`](Self::end), handing the response and stderr to `callback`.
    pub fn end_with_callback<F>(&mut self, callback: F) -> Result<&mut Self>
    where
        F: FnOnce(&str, &str),
    {
        self.end_inner(&WaitPolicyOverrides::default(), Some(callback))
    }

    /// Like [`end`](Self::end), with both a policy override and a callback.
    pub fn end_with<F>(&mut self, overrides: &WaitPolicyOverrides, callback: F) -> Result<&mut Self>
    where
        F: FnOnce(&str, &str),
    {
        self.end_inner(overrides, Some(callback))
    }

    /// Last collected output with echoed commands and the prompt line removed.
    pub fn output(&self) -> String {
        self.output.render(&OutputOptions::default())
    }

    /// Last collected output rendered per `options`.
    pub fn output_with(&self, options: OutputOptions) -> String {
        self.output.render(&options)
    }

    /// Last collected output, unmodified.
    pub fn raw_output(&self) -> &str {
        self.output.last()
    }

    /// Everything read since connect, including shell banners.
    pub fn global_output(&self) -> &str {
        self.output.cumulative()
    }

    /// Tear down the transport.
    ///
    /// Best-effort: sends `exit` on the primary channel, asks the transport
    /// to disconnect and drops it. Failures are logged, not returned.
    pub fn disconnect(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            debug!("Session {} has no transport to disconnect", self.id);
            return;
        };

        match std::mem::replace(&mut self.mode, ChannelMode::Direct) {
            ChannelMode::Shell(mut channel) => {
                if let Err(e) = channel.write(b"exit\n") {
                    warn!("Failed to send exit to shell: {}", e);
                }
                if let Err(e) = channel.close() {
                    warn!("Failed to close shell channel: {}", e);
                }
            }
            ChannelMode::Direct => match transport.open_exec_channel("exit") {
                Ok(mut channel) => {
                    if let Err(e) = channel.close() {
                        warn!("Failed to close exit channel: {}", e);
                    }
                }
                Err(e) => warn!("Failed to send exit: {}", e),
            },
        }

        if let Err(e) = transport.disconnect() {
            warn!("Transport disconnect failed: {}", e);
        }
        info!("Session {} disconnected", self.id);
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }
        if !self.state.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        Ok(())
    }

    fn exec_inner<F>(
        &mut self,
        command: &str,
        overrides: &WaitPolicyOverrides,
        callback: Option<F>,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&str, &str),
    {
        self.ensure_authenticated()?;

        if let Some(batch) = self.batch.as_mut() {
            batch.push(command);
            debug!(
                "Queued command: session={}, command='{}', pending={}",
                self.id,
                command,
                batch.len()
            );
            self.output.record_command(command);
            return Ok(self);
        }

        let policy = self.policy.merge(overrides);
        let (stdout, stderr) = self.dispatch(command, &policy)?;

        self.output.record_command(command);
        self.output.set_last(stdout);
        if let Some(callback) = callback {
            callback(self.output.last(), &stderr);
        }
        Ok(self)
    }

    fn dispatch(&mut self, command: &str, policy: &WaitPolicy) -> Result<(String, String)> {
        let timeout = self.timeout;
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;

        match &mut self.mode {
            ChannelMode::Shell(channel) => {
                debug!("Writing to shell: session={}, command='{}'", self.id, command);
                channel.write(format!("{command}\n").as_bytes())?;
                collect_response(channel.as_mut(), policy, timeout, &mut self.output)
            }
            ChannelMode::Direct => {
                debug!("Opening exec channel: session={}, command='{}'", self.id, command);
                let mut channel = transport.open_exec_channel(command)?;
                let response = collect_response(channel.as_mut(), policy, timeout, &mut self.output);
                if let Err(e) = channel.close() {
                    warn!("Failed to close exec channel: {}", e);
                }
                response
            }
        }
    }

    fn end_inner<F>(
        &mut self,
        overrides: &WaitPolicyOverrides,
        callback: Option<F>,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&str, &str),
    {
        let batch = self.batch.as_ref().ok_or(Error::NotInBatch)?;
        let (script, count) = (batch.to_script(), batch.len());
        self.ensure_authenticated()?;

        let policy = self.policy.merge(overrides);
        let timeout = self.timeout;
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;

        info!("Flushing batch: session={}, commands={}", self.id, count);
        let mut channel = transport.open_shell_channel()?;
        let response = flush(channel.as_mut(), &script, &policy, timeout, &mut self.output);
        if let Err(e) = channel.close() {
            warn!("Failed to close batch channel: {}", e);
        }
        let (stdout, stderr) = response?;

        self.output.set_last(stdout);
        if let Some(callback) = callback {
            callback(self.output.last(), &stderr);
        }
        self.batch = None;
        Ok(self)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .field("mode", &self.mode.kind())
            .field("batch", &self.batch)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}

/// Collect stdout, then drain whatever stderr is pending.
fn collect_response(
    channel: &mut dyn Channel,
    policy: &WaitPolicy,
    timeout: Duration,
    output: &mut SessionOutput,
) -> Result<(String, String)> {
    let stdout = OutputCollector::new(policy, timeout).collect(channel, output.cumulative_mut())?;
    let stderr = String::from_utf8_lossy(&channel.read_stderr()?).into_owned();
    Ok((stdout, stderr))
}

fn flush(
    channel: &mut dyn Channel,
    script: &str,
    policy: &WaitPolicy,
    timeout: Duration,
    output: &mut SessionOutput,
) -> Result<(String, String)> {
    channel.write(script.as_bytes())?;
    collect_response(channel, policy, timeout, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordAuth;
    use shellwright_core::{FingerprintEncoding, HashAlgorithm};
    use shellwright_transport::hostkey;
    use shellwright_transport::testing::{
        ChannelKind, ChannelScript, ScriptedConnector, ScriptedTransport,
    };

    fn fast_policy() -> WaitPolicy {
        WaitPolicy::default()
            .with_pause_before_end(Duration::ZERO)
            .with_poll_interval(Duration::from_micros(100))
    }

    fn session_for(transport: ScriptedTransport) -> Session {
        Session::new("build01", 22, ScriptedConnector::new(transport)).with_policy(fast_policy())
    }

    fn ready(transport: ScriptedTransport) -> Session {
        let mut session = session_for(transport);
        session
            .connect()
            .unwrap()
            .authenticate(&PasswordAuth::new("deploy", "hunter2"))
            .unwrap();
        session
    }

    #[test]
    fn test_session_new_is_idle() {
        let session = session_for(ScriptedTransport::new());
        assert_eq!(session.host(), "build01");
        assert_eq!(session.port(), 22);
        assert_eq!(session.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.mode(), ExecMode::Direct);
        assert!(!session.is_connected());
        assert!(!session.is_in_batch());
        assert!(session.pending_commands().is_empty());
    }

    #[test]
    fn test_session_id_unique() {
        let a = session_for(ScriptedTransport::new());
        let b = session_for(ScriptedTransport::new());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig::from_yaml(
            "connection:\n  host: db01\n  port: 2222\n  timeout_ms: 1500\nwait:\n  quiet_cycles: 3\n",
        )
        .unwrap();
        let session = Session::from_config(&config, ScriptedConnector::new(ScriptedTransport::new()));
        assert_eq!(session.host(), "db01");
        assert_eq!(session.port(), 2222);
        assert_eq!(session.timeout(), Duration::from_millis(1500));
        assert_eq!(session.policy().quiet_cycles_before_end, 3);
    }

    #[test]
    fn test_state_transitions() {
        let transport = ScriptedTransport::new();
        let log = transport.log();
        let mut session = session_for(transport);

        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_connected());
        assert!(!session.is_authenticated());

        // Connecting again keeps the transport
        session.connect().unwrap();
        assert_eq!(log.lock().unwrap().connects, 1);

        session
            .authenticate(&PasswordAuth::new("deploy", "hunter2"))
            .unwrap();
        assert!(session.is_authenticated());
        assert!(session.is_connected());
    }

    #[test]
    fn test_connect_refused() {
        let mut session = Session::new("10.255.0.1", 22, ScriptedConnector::refusing("unreachable"));
        let result = session.connect();
        assert!(matches!(result, Err(Error::ConnectionRefused { .. })));
        assert!(!session.is_connected());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_operations_require_connection() {
        let mut session = session_for(ScriptedTransport::new());
        assert!(matches!(session.exec("ls"), Err(Error::NotConnected)));
        assert!(matches!(
            session.authenticate(&PasswordAuth::new("deploy", "x")),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.verify_fingerprint("00", FingerprintFlags::default()),
            Err(Error::NotConnected)
        ));

        session.connect().unwrap();
        assert!(matches!(session.exec("ls"), Err(Error::NotAuthenticated)));
        assert!(matches!(
            session.enter_shell_mode(),
            Err(Error::NotAuthenticated)
        ));
    }

    #[test]
    fn test_authentication_failure_keeps_state() {
        let transport = ScriptedTransport::new().with_credentials("deploy", "hunter2");
        let mut session = session_for(transport);
        session.connect().unwrap();

        let result = session.authenticate(&PasswordAuth::new("deploy", "wrong"));
        assert!(matches!(result, Err(Error::AuthenticationFailed(_))));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_exec_direct() {
        let transport = ScriptedTransport::new().with_exec(ChannelScript::new().then("ok\n"));
        let log = transport.log();
        let mut session = ready(transport);

        session.exec("echo ok").unwrap();

        assert_eq!(session.raw_output(), "ok\n");
        assert_eq!(session.output(), "ok");
        assert_eq!(session.global_output(), "ok\n");

        let log = log.lock().unwrap();
        assert_eq!(log.exec_commands(), vec!["echo ok".to_string()]);
        assert!(log.channel(0).unwrap().closed);
    }

    #[test]
    fn test_exec_chaining_overwrites_last_output() {
        let transport = ScriptedTransport::new()
            .with_exec(ChannelScript::new().then("first\n"))
            .with_exec(ChannelScript::new().then("second\n"));
        let mut session = ready(transport);

        session.exec("one").unwrap().exec("two").unwrap();

        assert_eq!(session.raw_output(), "second\n");
        assert_eq!(session.global_output(), "first\nsecond\n");
    }

    #[test]
    fn test_exec_with_policy_end_pattern() {
        let transport = ScriptedTransport::new().with_exec(
            ChannelScript::new()
                .then("building\n")
                .then("done\n$ ")
                .repeating("noise\n"),
        );
        let mut session = ready(transport);

        session
            .exec_with_policy("make", &WaitPolicyOverrides::new().with_end_pattern(r"\$ $"))
            .unwrap();
        assert_eq!(session.raw_output(), "building\ndone\n$ ");
    }

    #[test]
    fn test_exec_overrides_keep_session_defaults() {
        let transport = ScriptedTransport::new().with_exec(ChannelScript::new().then("x\n"));
        let log = transport.log();
        let mut session = ready(transport);
        session.policy = fast_policy().with_quiet_cycles(3);

        session
            .exec_with_policy(
                "x",
                &WaitPolicyOverrides::new().with_require_at_least_one_char(true),
            )
            .unwrap();

        // One data poll, then the session's three quiet polls
        assert_eq!(log.lock().unwrap().channel(0).unwrap().polls, 4);
        assert_eq!(session.raw_output(), "x\n");
    }

    #[test]
    fn test_exec_with_overrides_and_callback() {
        let transport = ScriptedTransport::new().with_exec(
            ChannelScript::new()
                .then("compiling\n")
                .then("ok\n$ ")
                .repeating("tail\n")
                .with_stderr("1 warning\n"),
        );
        let log = transport.log();
        let mut session = ready(transport);

        let mut seen = None;
        session
            .exec_with(
                "cargo build",
                &WaitPolicyOverrides::new().with_end_pattern(r"\$ $"),
                |stdout, stderr| seen = Some((stdout.to_string(), stderr.to_string())),
            )
            .unwrap();

        assert_eq!(
            seen,
            Some(("compiling\nok\n$ ".to_string(), "1 warning\n".to_string()))
        );
        assert_eq!(log.lock().unwrap().channel(0).unwrap().polls, 2);
    }

    #[test]
    fn test_end_with_overrides_and_callback() {
        let transport = ScriptedTransport::new().with_shell(
            ChannelScript::new()
                .then("a\nb\nDONE\n")
                .repeating("more\n"),
        );
        let mut session = ready(transport);
        session.begin().exec("a").unwrap().exec("b").unwrap();

        let mut seen = String::new();
        session
            .end_with(
                &WaitPolicyOverrides::new().with_end_pattern("DONE"),
                |stdout, _| seen = stdout.to_string(),
            )
            .unwrap();

        assert_eq!(seen, "a\nb\nDONE\n");
        assert!(!session.is_in_batch());
        assert_eq!(session.output(), "DONE");
    }

    #[test]
    fn test_exec_callback_receives_stderr() {
        let transport = ScriptedTransport::new().with_exec(
            ChannelScript::new()
                .then("data\n")
                .with_stderr("warning: disk almost full\n"),
        );
        let mut session = ready(transport);

        let mut seen = None;
        session
            .exec_with_callback("df -h", |stdout, stderr| {
                seen = Some((stdout.to_string(), stderr.to_string()));
            })
            .unwrap();

        assert_eq!(
            seen,
            Some((
                "data\n".to_string(),
                "warning: disk almost full\n".to_string()
            ))
        );
        assert_eq!(session.raw_output(), "data\n");
    }

    #[test]
    fn test_exec_timeout_keeps_previous_output() {
        let transport = ScriptedTransport::new()
            .with_exec(ChannelScript::new().then("before\n"))
            .with_exec(ChannelScript::new().then("partial"));
        let mut session = ready(transport);
        session.exec("first").unwrap();

        session.set_timeout(Duration::from_millis(20));
        let result = session.exec_with_policy(
            "second",
            &WaitPolicyOverrides::new().with_start_pattern("never"),
        );

        assert!(matches!(result, Err(Error::Timeout(20))));
        assert_eq!(session.raw_output(), "before\n");
        assert!(session.global_output().ends_with("partial"));
    }

    #[test]
    fn test_fingerprint_verification() {
        let transport = ScriptedTransport::new().with_host_key(b"host key blob");
        let mut session = session_for(transport);
        session.connect().unwrap();

        let digest = hostkey::digest(HashAlgorithm::Md5, b"host key blob");
        let expected = FingerprintFlags::default().render(&digest).to_uppercase();
        session
            .verify_fingerprint(&expected, FingerprintFlags::default())
            .unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let sha256 = FingerprintFlags::new(HashAlgorithm::Sha256, FingerprintEncoding::Hex);
        match session.verify_fingerprint(&expected, sha256) {
            Err(Error::BadFingerprint { expected: e, actual }) => {
                assert_eq!(e, expected);
                let digest = hostkey::digest(HashAlgorithm::Sha256, b"host key blob");
                assert_eq!(actual, sha256.render(&digest));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_shell_mode_discards_banner() {
        let transport = ScriptedTransport::new().with_shell(
            ChannelScript::new()
                .then("Welcome to build01\n$ ")
                .then_quiet(7)
                .then("pwd\n/home/deploy\n$ "),
        );
        let log = transport.log();
        let mut session = ready(transport);

        session.enter_shell_mode().unwrap();
        assert_eq!(session.mode(), ExecMode::Shell);
        assert_eq!(session.raw_output(), "");

        session.exec("pwd").unwrap();
        assert_eq!(session.raw_output(), "pwd\n/home/deploy\n$ ");
        assert_eq!(session.output(), "/home/deploy");
        assert!(session.global_output().starts_with("Welcome to build01"));

        let log = log.lock().unwrap();
        assert_eq!(log.shells_opened(), 1);
        assert!(log.exec_commands().is_empty());
        assert_eq!(log.channel(0).unwrap().written_text(), "pwd\n");
    }

    #[test]
    fn test_batch_isolation() {
        let transport = ScriptedTransport::new()
            .with_exec(ChannelScript::new().then("up 3 days\n"))
            .with_shell(ChannelScript::new().then("a-out\nb-out\n"));
        let log = transport.log();
        let mut session = ready(transport);

        session.exec("uptime").unwrap();
        let events = log.lock().unwrap().io_events();

        session.begin().exec("a").unwrap().exec("b").unwrap();
        assert!(session.is_in_batch());
        assert_eq!(session.pending_commands(), &["a".to_string(), "b".to_string()]);
        assert_eq!(log.lock().unwrap().io_events(), events);
        assert_eq!(session.raw_output(), "up 3 days\n");

        session.end().unwrap();
        assert!(!session.is_in_batch());
        assert!(session.pending_commands().is_empty());
        assert_eq!(session.raw_output(), "a-out\nb-out\n");

        let log = log.lock().unwrap();
        let batch_channel = log.channel(1).unwrap();
        assert_eq!(batch_channel.writes, vec![b"a\nb\n".to_vec()]);
        assert!(batch_channel.closed);
    }

    #[test]
    fn test_begin_keeps_existing_queue() {
        let mut session = ready(ScriptedTransport::new());
        session.begin().exec("first").unwrap();
        session.begin().exec("second").unwrap();
        assert_eq!(session.pending_commands().len(), 2);
    }

    #[test]
    fn test_end_opens_new_shell_in_shell_mode() {
        let transport = ScriptedTransport::new()
            .with_shell(ChannelScript::new().then("$ "))
            .with_shell(ChannelScript::new().then("hostname\nbuild01\n"));
        let log = transport.log();
        let mut session = ready(transport);

        session.enter_shell_mode().unwrap();
        session.begin().exec("hostname").unwrap();
        session
            .end_with_callback(|stdout, _| assert!(stdout.contains("build01")))
            .unwrap();

        assert_eq!(session.mode(), ExecMode::Shell);
        assert_eq!(session.output(), "build01");

        let log = log.lock().unwrap();
        assert_eq!(log.shells_opened(), 2);
        assert!(!log.channel(0).unwrap().closed);
        assert!(log.channel(1).unwrap().closed);
    }

    #[test]
    fn test_end_without_begin() {
        let mut session = ready(ScriptedTransport::new());
        assert!(matches!(session.end(), Err(Error::NotInBatch)));
    }

    #[test]
    fn test_failed_end_keeps_batch() {
        let mut session = ready(ScriptedTransport::new());
        session.begin().exec("reboot").unwrap();
        session.set_timeout(Duration::from_millis(10));

        let result = session.end_with_policy(&WaitPolicyOverrides::new().with_end_pattern("never"));
        assert!(matches!(result, Err(Error::Timeout(10))));
        assert!(session.is_in_batch());
        assert_eq!(session.pending_commands(), &["reboot".to_string()]);
    }

    #[test]
    fn test_disconnect_direct_mode() {
        let transport = ScriptedTransport::new();
        let log = transport.log();
        let mut session = ready(transport);

        session.disconnect();

        {
            let log = log.lock().unwrap();
            assert!(log.disconnected);
            assert_eq!(log.channels[0].0, ChannelKind::Exec("exit".to_string()));
            assert!(log.channel(0).unwrap().closed);
        }

        // State flags keep their last value
        assert!(session.is_connected());
        assert!(session.is_authenticated());
        assert!(matches!(session.exec("ls"), Err(Error::NotConnected)));

        // A second disconnect is a no-op
        session.disconnect();
        assert_eq!(log.lock().unwrap().channels.len(), 1);
    }

    #[test]
    fn test_disconnect_shell_mode() {
        let transport = ScriptedTransport::new().with_shell(ChannelScript::new().then("$ "));
        let log = transport.log();
        let mut session = ready(transport);
        session.enter_shell_mode().unwrap();

        session.disconnect();

        assert_eq!(session.mode(), ExecMode::Direct);
        let log = log.lock().unwrap();
        let shell = log.channel(0).unwrap();
        assert_eq!(shell.written_text(), "exit\n");
        assert!(shell.closed);
        assert!(log.exec_commands().is_empty());
        assert!(log.disconnected);
    }

    #[test]
    fn test_debug_output() {
        let session = session_for(ScriptedTransport::new());
        let debug = format!("{:?}", session);
        assert!(debug.contains("build01"));
        assert!(debug.contains("Idle"));
    }
}
