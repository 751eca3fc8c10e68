//! Drives one session from parsed arguments.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use shellwright_core::{ClientConfig, FingerprintEncoding, FingerprintFlags};
use shellwright_session::{
    Authenticator, NoneAuth, OutputOptions, PasswordAuth, PublicKeyAuth, Session,
};
use shellwright_transport::Connector;

use crate::cli::Args;

/// Load the configuration file named by `args`, if any, and apply overrides.
pub fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    args.apply(&mut config).context("invalid command-line options")?;
    Ok(config)
}

/// Pick the authentication strategy implied by `args`.
///
/// An identity file wins over a password; with neither, the "none" method
/// is tried.
pub fn authenticator(args: &Args, config: &ClientConfig) -> Result<Box<dyn Authenticator>> {
    let user = config
        .connection
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("LOGNAME").ok())
        .ok_or_else(|| anyhow!("no user given and $USER is not set"))?;

    if let Some(identity) = &args.identity {
        debug!("Using public key authentication with {}", identity.display());
        return Ok(Box::new(PublicKeyAuth::new(user, identity.clone())));
    }

    if let Some(var) = &args.password_env {
        let password = std::env::var(var)
            .with_context(|| format!("password variable {var} is not set"))?;
        return Ok(Box::new(PasswordAuth::new(user, password)));
    }

    Ok(Box::new(NoneAuth::new(user)))
}

/// Connect, authenticate and run every command, writing output to `out`.
///
/// The session is disconnected whether or not the commands succeed.
pub fn run_with_connector(
    args: &Args,
    config: &ClientConfig,
    connector: impl Connector + 'static,
    out: &mut dyn Write,
) -> Result<()> {
    let mut session = Session::from_config(config, connector);
    let result = drive(&mut session, args, config, out);
    session.disconnect();
    result
}

fn drive(
    session: &mut Session,
    args: &Args,
    config: &ClientConfig,
    out: &mut dyn Write,
) -> Result<()> {
    session.connect().with_context(|| {
        format!(
            "failed to connect to {}:{}",
            config.connection.host, config.connection.port
        )
    })?;

    if let Some(expected) = &args.fingerprint {
        let flags = FingerprintFlags::new(args.fingerprint_hash, FingerprintEncoding::Hex);
        session
            .verify_fingerprint(expected, flags)
            .context("host fingerprint verification failed")?;
    }

    let auth = authenticator(args, config)?;
    session
        .authenticate(auth.as_ref())
        .context("authentication failed")?;

    if args.shell {
        session.enter_shell_mode().context("failed to open shell")?;
    }

    let options = if args.raw {
        OutputOptions::raw()
    } else {
        OutputOptions::default()
    };

    if args.batch {
        session.begin();
        for command in &args.commands {
            session.exec(command)?;
        }
        session.end().context("batch failed")?;
        print_output(out, &session.output_with(options), args.raw)?;
    } else {
        for command in &args.commands {
            session
                .exec(command)
                .with_context(|| format!("command '{command}' failed"))?;
            print_output(out, &session.output_with(options), args.raw)?;
        }
    }

    info!("Ran {} command(s)", args.commands.len());
    Ok(())
}

fn print_output(out: &mut dyn Write, output: &str, raw: bool) -> Result<()> {
    if raw {
        write!(out, "{output}")?;
    } else if !output.is_empty() {
        writeln!(out, "{output}")?;
    }
    out.flush()?;
    Ok(())
}
