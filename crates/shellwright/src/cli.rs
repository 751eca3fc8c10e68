//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use shellwright_core::{ClientConfig, HashAlgorithm};

/// Run commands through a shell session and print their output.
#[derive(Parser, Debug, Clone)]
#[command(name = "shellwright")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to connect to
    #[arg(long, env = "SHELLWRIGHT_HOST")]
    pub host: Option<String>,

    /// Port to connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// User to authenticate as (defaults to $USER)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Name of the environment variable holding the password
    #[arg(long, value_name = "VAR")]
    pub password_env: Option<String>,

    /// Private key for public-key authentication
    #[arg(short, long, value_name = "FILE")]
    pub identity: Option<PathBuf>,

    /// Expected host fingerprint; the connection is aborted on mismatch
    #[arg(long, value_name = "HEX")]
    pub fingerprint: Option<String>,

    /// Digest used for the fingerprint (md5, sha1, sha256)
    #[arg(long, default_value = "md5", value_name = "ALGORITHM")]
    pub fingerprint_hash: HashAlgorithm,

    /// Run commands through one persistent shell
    #[arg(long)]
    pub shell: bool,

    /// Send all commands as a single batch
    #[arg(long)]
    pub batch: bool,

    /// Maximum wait for one command's output, in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Ignore output until this pattern has matched
    #[arg(long, value_name = "REGEX")]
    pub start_pattern: Option<String>,

    /// Stop collecting as soon as this pattern matches
    #[arg(long, value_name = "REGEX")]
    pub end_pattern: Option<String>,

    /// Do not count silence before the first character of output
    #[arg(long)]
    pub require_output: bool,

    /// Print output as received, without removing echoed commands and prompts
    #[arg(long)]
    pub raw: bool,

    /// Commands to run, in order
    #[arg(required = true, value_name = "COMMAND")]
    pub commands: Vec<String>,
}

impl Args {
    /// Overlay command-line values on `config` and validate the result.
    pub fn apply(&self, config: &mut ClientConfig) -> shellwright_core::Result<()> {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(user) = &self.user {
            config.connection.user = Some(user.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.connection.timeout_ms = timeout_ms;
        }
        if let Some(pattern) = &self.start_pattern {
            config.wait.start_pattern = Some(pattern.clone());
        }
        if let Some(pattern) = &self.end_pattern {
            config.wait.end_pattern = Some(pattern.clone());
        }
        if self.require_output {
            config.wait.require_at_least_one_char = true;
        }
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from(["shellwright", "uptime"]).unwrap();
        assert_eq!(args.commands, vec!["uptime"]);
        assert_eq!(args.fingerprint_hash, HashAlgorithm::Md5);
        assert!(!args.shell);
        assert!(!args.batch);
        assert!(!args.raw);
    }

    #[test]
    fn test_commands_required() {
        assert!(Args::try_parse_from(["shellwright", "--shell"]).is_err());
    }

    #[test]
    fn test_unknown_hash_rejected() {
        let result = Args::try_parse_from(["shellwright", "--fingerprint-hash", "crc32", "ls"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let args = Args::try_parse_from([
            "shellwright",
            "--host",
            "127.0.0.1",
            "--port",
            "2222",
            "--user",
            "deploy",
            "--timeout-ms",
            "500",
            "--end-pattern",
            r"\$ $",
            "--require-output",
            "--fingerprint-hash",
            "SHA256",
            "ls",
            "pwd",
        ])
        .unwrap();

        let mut config = ClientConfig::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.connection.host, "127.0.0.1");
        assert_eq!(config.connection.port, 2222);
        assert_eq!(config.connection.user.as_deref(), Some("deploy"));
        assert_eq!(config.connection.timeout_ms, 500);
        assert_eq!(config.wait.end_pattern.as_deref(), Some(r"\$ $"));
        assert!(config.wait.require_at_least_one_char);
        assert_eq!(args.fingerprint_hash, HashAlgorithm::Sha256);
        assert_eq!(args.commands, vec!["ls", "pwd"]);
    }

    #[test]
    fn test_apply_rejects_bad_pattern() {
        let args =
            Args::try_parse_from(["shellwright", "--start-pattern", "(", "ls"]).unwrap();
        let mut config = ClientConfig::default();
        assert!(args.apply(&mut config).is_err());
    }
}
