//! ssh-session - 复用 ssh-agent 并同步密钥
//!
//! 子命令只做参数解析和输出格式，逻辑全部在库里：
//! - `sync`：ensure → scan → reconcile → load（默认）
//! - `env`：输出可 eval 的两行赋值（profile source 用）
//! - `check` / `status` / `scan` / `clear`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use ssh_agent_session::{
    scan_manifest, sync, unload_all, CommandBackend, Error, IdentityCount, LoadPolicy, ResolveMode,
    ScanOutcome, SessionConfig, SessionResolver, UnloadOutcome,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "ssh-session",
    about = "Reuse one ssh-agent per login and keep its keys loaded",
    version
)]
struct Cli {
    /// Only print warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print debug logs.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Key directory (default: ~/.ssh).
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// State directory for the session record and manifest (default: ~/.ssh-session).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Credential loading policy.
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum PolicyArg {
    /// One ssh-add call per key.
    PerEntry,
    /// A single ssh-add call for all keys.
    Batch,
}

impl From<PolicyArg> for LoadPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PerEntry => LoadPolicy::PerEntry,
            PolicyArg::Batch => LoadPolicy::Batch,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ensure an agent and load keys that are not loaded yet (default).
    Sync {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print shell assignments for the agent, for `eval "$(ssh-session env)"`.
    Env {
        /// Never start an agent; exit 1 when none is running.
        #[arg(long)]
        check: bool,
    },

    /// Exit 0 if a live agent is available, 1 otherwise. Never starts one.
    Check,

    /// Rescan the key directory and rewrite the manifest cache.
    Scan,

    /// Show agent, identity and manifest state without changing anything.
    Status {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove all identities from the running agent.
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("ssh-session: failed to initialise logging: {}", e);
    }

    let config = build_config(&cli);
    let backend = CommandBackend::new(config.commands.clone());
    let mut resolver = SessionResolver::new(config, backend);

    match run(&cli, &mut resolver) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("ssh_agent_session={}", level).parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init()?;
    Ok(())
}

fn build_config(cli: &Cli) -> SessionConfig {
    let mut config = SessionConfig::from_env();
    if let Some(ref dir) = cli.key_dir {
        config.key_dir = dir.clone();
    }
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(policy) = cli.policy {
        config.load_policy = policy.into();
    }
    config
}

fn run(
    cli: &Cli,
    resolver: &mut SessionResolver<CommandBackend>,
) -> std::result::Result<ExitCode, Error> {
    let default = Command::Sync { json: false };
    let command = cli.command.as_ref().unwrap_or(&default);

    match command {
        Command::Sync { json } => {
            let report = sync::run(resolver, ResolveMode::Ensure)?;
            if !report.is_success() {
                tracing::warn!("⚠️ no credentials were loaded");
            }
            if *json {
                println!("{}", report.to_json()?);
            } else if !cli.quiet {
                println!("agent: {} ({})", report.session.descriptor, report.session.origin);
                println!("{}", report.message());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Env { check } => {
            let mode = if *check {
                ResolveMode::CheckOnly
            } else {
                ResolveMode::Ensure
            };
            match resolver.ensure_session(mode) {
                Ok(session) => {
                    print!("{}", session.descriptor.to_assignments());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if mode == ResolveMode::CheckOnly && e.is_agent_unavailable() => {
                    Ok(ExitCode::from(1))
                }
                Err(e) => Err(e),
            }
        }

        Command::Check => match resolver.ensure_session(ResolveMode::CheckOnly) {
            Ok(session) => {
                if !cli.quiet {
                    println!("{}", session.descriptor);
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) if e.is_agent_unavailable() => Ok(ExitCode::from(1)),
            Err(e) => Err(e),
        },

        Command::Scan => {
            let config = resolver.config();
            let outcome = scan_manifest(
                &config.key_dir,
                &config.public_suffix,
                &config.manifest_path(),
            )?;
            if !cli.quiet {
                match outcome {
                    ScanOutcome::Empty => println!("no keys found in {}", config.key_dir.display()),
                    ScanOutcome::NonEmpty(manifest) => {
                        for name in manifest.iter() {
                            println!("{}", name);
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Status { json } => {
            let report = sync::status(resolver)?;
            if *json {
                println!("{}", report.to_json()?);
            } else if !cli.quiet {
                match &report.session {
                    Some(session) => println!("agent: {} ({})", session.descriptor, session.origin),
                    None => println!("agent: none"),
                }
                match report.identities {
                    Some(IdentityCount::Loaded(count)) => println!("identities: {}", count),
                    Some(IdentityCount::Unreachable) => println!("identities: agent unreachable"),
                    None => {}
                }
                match report.manifest_entries {
                    Some(entries) => println!("manifest: {} key(s)", entries),
                    None => println!("manifest: never scanned"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Clear => {
            let session = match resolver.ensure_session(ResolveMode::CheckOnly) {
                Ok(session) => session,
                Err(e) if e.is_agent_unavailable() => {
                    if !cli.quiet {
                        println!("no agent running");
                    }
                    return Ok(ExitCode::SUCCESS);
                }
                Err(e) => return Err(e),
            };

            let outcome = unload_all(resolver.backend(), &session)?;
            if !cli.quiet {
                match outcome {
                    UnloadOutcome::Removed => println!("all identities removed"),
                    UnloadOutcome::NothingRemoved => println!("no identities to remove"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
