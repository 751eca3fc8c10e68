//! Loopback transport.
//!
//! Serves only loopback hosts. Exec channels run `<shell> -c <command>` as a
//! child process with separate stdout/stderr pipes; shell channels run an
//! interactive shell on a pseudo-terminal (portable-pty), so their stderr is
//! merged into stdout and input is echoed like a remote login shell.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::net::IpAddr;
use std::process::{ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{debug, error, info, warn};

use shellwright_core::{Error, HashAlgorithm, LocalSettings, Result};

use crate::hostkey;
use crate::transport::{Channel, Connector, PublicKeyCredentials, Transport};

/// Shell channel terminal size. Wide so command output is not wrapped.
const SHELL_PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 200,
    pixel_width: 0,
    pixel_height: 0,
};

/// Connector for the loopback transport.
#[derive(Debug, Clone, Default)]
pub struct LocalConnector {
    settings: LocalSettings,
}

impl LocalConnector {
    /// Create a connector with the given settings.
    pub fn new(settings: LocalSettings) -> Self {
        Self { settings }
    }
}

impl Connector for LocalConnector {
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>> {
        if !is_loopback(host) {
            return Err(Error::ConnectionRefused {
                host: host.to_string(),
                port,
                reason: "loopback transport only serves localhost".to_string(),
            });
        }

        info!("Opening loopback transport: {}:{}", host, port);
        Ok(Box::new(LocalTransport::new(self.settings.clone())))
    }
}

fn is_loopback(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Name of the user this process runs as.
fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}

/// Transport running commands on the local machine.
///
/// The process already holds the local user's privileges, so authentication
/// only checks that the requested user name is the current user.
#[derive(Debug)]
pub struct LocalTransport {
    settings: LocalSettings,
    user: Option<String>,
    closed: bool,
}

impl LocalTransport {
    /// Create a transport with the given settings.
    pub fn new(settings: LocalSettings) -> Self {
        Self {
            settings,
            user: None,
            closed: false,
        }
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn accept_user(&mut self, username: &str) -> Result<()> {
        if self.closed {
            return Err(Error::NotConnected);
        }

        match current_user() {
            Some(current) if current == username => {
                info!("Loopback authentication accepted: user={}", username);
                self.user = Some(current);
                Ok(())
            }
            Some(current) => Err(Error::AuthenticationFailed(format!(
                "user '{username}' is not the local user '{current}'"
            ))),
            None => Err(Error::AuthenticationFailed(
                "cannot determine the local user".to_string(),
            )),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.closed {
            return Err(Error::NotConnected);
        }
        if self.user.is_none() {
            return Err(Error::NotAuthenticated);
        }
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn fingerprint(&mut self, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::NotConnected);
        }
        let blob = hostkey::read_public_key_blob(&self.settings.host_key_path)?;
        Ok(hostkey::digest(algorithm, &blob))
    }

    fn auth_password(&mut self, username: &str, _password: &str) -> Result<()> {
        self.accept_user(username)
    }

    fn auth_public_key(
        &mut self,
        username: &str,
        credentials: &PublicKeyCredentials,
    ) -> Result<()> {
        std::fs::File::open(&credentials.private_key).map_err(|e| {
            Error::AuthenticationFailed(format!(
                "cannot read private key {}: {e}",
                credentials.private_key.display()
            ))
        })?;
        self.accept_user(username)
    }

    fn auth_none(&mut self, username: &str) -> Result<()> {
        self.accept_user(username)
    }

    fn open_exec_channel(&mut self, command: &str) -> Result<Box<dyn Channel>> {
        self.ensure_ready()?;
        Ok(Box::new(LocalExecChannel::spawn(&self.settings.shell, command)?))
    }

    fn open_shell_channel(&mut self) -> Result<Box<dyn Channel>> {
        self.ensure_ready()?;
        Ok(Box::new(LocalShellChannel::spawn(&self.settings.shell)?))
    }

    fn disconnect(&mut self) -> Result<()> {
        info!("Closing loopback transport");
        self.closed = true;
        self.user = None;
        Ok(())
    }
}

/// Pump a blocking reader into a channel so it can be polled.
fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) | Err(_) => break, // EOF or error
                Ok(n) => {
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break; // Receiver dropped
                    }
                }
            }
        }
    });
    rx
}

fn drain(rx: &Receiver<Vec<u8>>) -> Vec<u8> {
    let mut bytes = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        bytes.extend_from_slice(&chunk);
    }
    bytes
}

/// One-shot channel running a single command as a child process.
#[derive(Debug)]
pub struct LocalExecChannel {
    child: std::process::Child,
    stdin: Option<ChildStdin>,
    stdout: Receiver<Vec<u8>>,
    stderr: Receiver<Vec<u8>>,
}

impl LocalExecChannel {
    /// Run `command` through `shell -c`.
    pub fn spawn(shell: &str, command: &str) -> Result<Self> {
        debug!("Spawning exec channel: shell='{}', command='{}'", shell, command);

        let mut child = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn '{}': {}", shell, e);
                Error::Transport(format!("Failed to spawn exec channel: {e}"))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("exec channel has no stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Transport("exec channel has no stderr".to_string()))?;
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            stdout: spawn_reader(stdout),
            stderr: spawn_reader(stderr),
        })
    }
}

impl Channel for LocalExecChannel {
    fn read_stdout(&mut self) -> Result<Vec<u8>> {
        Ok(drain(&self.stdout))
    }

    fn read_stderr(&mut self) -> Result<Vec<u8>> {
        Ok(drain(&self.stderr))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Transport("exec channel stdin is closed".to_string()))?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        self.stdin = None;
        if self.child.try_wait()?.is_none() {
            debug!("Killing exec channel process: pid={}", self.child.id());
            self.child.kill()?;
        }
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for LocalExecChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Failed to close exec channel: {}", e);
        }
    }
}

/// Persistent interactive shell on a pseudo-terminal.
pub struct LocalShellChannel {
    /// Kept alive so the PTY stays open
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    /// Reader on the non-blocking master FD
    reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for LocalShellChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalShellChannel").finish_non_exhaustive()
    }
}

impl LocalShellChannel {
    /// Start `shell` on a new pseudo-terminal.
    pub fn spawn(shell: &str) -> Result<Self> {
        info!("Spawning shell channel: shell='{}'", shell);

        let pair = native_pty_system().openpty(SHELL_PTY_SIZE).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::Transport(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.env("TERM", "dumb");

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn shell '{}': {}", shell, e);
            Error::Transport(format!("Failed to spawn shell: {e}"))
        })?;

        let writer = pair.master.take_writer().map_err(|e| {
            error!("Failed to take PTY writer: {}", e);
            Error::Transport(format!("Failed to take writer: {e}"))
        })?;

        let reader = pair.master.try_clone_reader().map_err(|e| {
            error!("Failed to clone PTY reader: {}", e);
            Error::Transport(format!("Failed to clone reader: {e}"))
        })?;

        // Reads must not block the collector's poll loop
        #[cfg(unix)]
        {
            if let Some(master_fd) = pair.master.as_raw_fd() {
                unsafe {
                    let flags = libc::fcntl(master_fd, libc::F_GETFL, 0);
                    if flags != -1 {
                        let result =
                            libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                        if result == -1 {
                            error!("Failed to set master PTY to non-blocking mode");
                        } else {
                            debug!("Set master PTY FD {} to non-blocking mode", master_fd);
                        }
                    }
                }
            }
        }

        Ok(Self {
            _master: pair.master,
            child,
            writer,
            reader,
        })
    }

    /// Check if the shell process is still running.
    pub fn is_alive(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }
}

impl Channel for LocalShellChannel {
    fn read_stdout(&mut self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; 4096];
        match self.reader.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                if n > 0 {
                    debug!("Read {} bytes from shell channel", n);
                }
                Ok(buffer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_stderr(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        debug!("Writing {} bytes to shell channel", data.len());
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.is_alive() {
            info!("Killing shell channel process");
            self.child
                .kill()
                .map_err(|e| Error::Transport(format!("Kill failed: {e}")))?;
            let status = self
                .child
                .wait()
                .map_err(|e| Error::Transport(format!("Wait failed: {e}")))?;
            debug!("Shell channel process exited: {:?}", status);
        }
        Ok(())
    }
}

impl Drop for LocalShellChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close shell channel: {}", e);
        }
    }
}
