use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::ArgAction;
use clap::Parser;
use clap::Subcommand;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use chronicle_core::read_log;
use chronicle_core::replay_into;
use chronicle_core::Config;
use chronicle_core::JsonRuleStore;
use chronicle_core::MemoryRuleStore;
use chronicle_core::PermissionDecision;
use chronicle_core::PermissionKind;
use chronicle_core::PermissionPolicy;
use chronicle_core::PermissionRequest;
use chronicle_core::ReplayMetadata;
use chronicle_core::ReplayOutcome;
use chronicle_core::RuleStore;
use chronicle_core::SessionArchive;
use chronicle_core::SessionInfo;
use chronicle_core::SessionState;

mod demo;
mod render;

/// Live transcripts and permission gating for coding agents.
#[derive(Debug, Parser)]
#[command(name = "chronicle", version)]
struct Cli {
    /// Config file. Defaults to `<config dir>/chronicle/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild and print the transcript recorded in a session log.
    Replay {
        log: PathBuf,
        /// Print the transcript, session and diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Inspect or edit always-allow rules.
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
    /// Evaluate one permission request against the saved rules.
    Check {
        #[arg(value_parser = parse_kind)]
        kind: PermissionKind,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        command: Option<String>,
        /// Working root. Defaults to the current directory.
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        auto_approve: bool,
    },
    /// List recorded sessions, newest first.
    Sessions,
    /// Run a scripted session through the host and record it.
    Demo {
        #[arg(long)]
        root: Option<String>,
        /// Answer given to every permission prompt.
        #[arg(long, default_value = "allow", value_parser = parse_decision)]
        decision: PermissionDecision,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    List,
    Add {
        #[arg(value_parser = parse_kind)]
        kind: PermissionKind,
        prefix: String,
    },
    Remove {
        index: usize,
    },
    Clear,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Replay { log, json } => replay(&config, &log, json),
        Command::Rules { action } => rules(&config, action),
        Command::Check {
            kind,
            path,
            command,
            root,
            auto_approve,
        } => {
            let mut request = PermissionRequest::new(kind);
            request.path = path;
            request.command = command;
            check(&config, &request, &working_root(root)?, auto_approve)
        }
        Command::Sessions => sessions(&config),
        Command::Demo { root, decision } => {
            let store = MemoryRuleStore::with_rules(rule_store(&config).load()?);
            let policy = PermissionPolicy::open(Box::new(store))?;
            let options = demo::DemoOptions {
                working_root: working_root(root)?,
                decision,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(demo::run(&config, policy, archive(&config), options))
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir() {
            Some(dir) => dir.join("chronicle").join("config.toml"),
            None => return Ok(Config::default()),
        },
    };
    if !path.exists() {
        if explicit.is_some() {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn data_dir(config: &Config) -> PathBuf {
    config
        .storage
        .data_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|dir| dir.join("chronicle")))
        .unwrap_or_else(|| PathBuf::from(".chronicle"))
}

fn rule_store(config: &Config) -> JsonRuleStore {
    let path = config
        .storage
        .rules_file
        .clone()
        .unwrap_or_else(|| data_dir(config).join("rules.json"));
    JsonRuleStore::new(path)
}

fn archive(config: &Config) -> SessionArchive {
    SessionArchive::new(
        data_dir(config).join("sessions"),
        config.storage.max_log_events,
    )
}

fn working_root(root: Option<String>) -> Result<String> {
    match root {
        Some(root) => Ok(root),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            Ok(cwd.to_string_lossy().into_owned())
        }
    }
}

fn replay(config: &Config, path: &Path, json: bool) -> Result<()> {
    let (header, records) = read_log(path)?;
    let metadata = ReplayMetadata::from(&header);
    let session = SessionInfo::new(metadata.working_root)
        .with_model(metadata.model)
        .with_session_id(header.session_id.clone());
    let mut state = SessionState::from_config(session, config)?;
    replay_into(&mut state, &records);
    let outcome = ReplayOutcome {
        session: state.session,
        transcript: state.transcript,
        diagnostics: state.diagnostics,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    println!(
        "session {} in {} ({} events)",
        header.session_id,
        header.working_root,
        records.len()
    );
    for line in render::transcript_lines(&outcome.transcript) {
        println!("{line}");
    }
    let diagnostics = &outcome.diagnostics;
    if diagnostics.unknown_correlation + diagnostics.unknown_kinds + diagnostics.malformed_events > 0
    {
        println!(
            "skipped: {} unknown tool calls, {} unknown kinds, {} malformed events",
            diagnostics.unknown_correlation, diagnostics.unknown_kinds, diagnostics.malformed_events
        );
    }
    Ok(())
}

fn rules(config: &Config, action: RulesCommand) -> Result<()> {
    let store = rule_store(config);
    let path = store.path().to_path_buf();
    let mut policy = PermissionPolicy::open(Box::new(store))?;
    match action {
        RulesCommand::List => {
            if policy.rules().is_empty() {
                println!("no rules in {}", path.display());
            }
            for (index, rule) in policy.rules().iter().enumerate() {
                println!("{index}: {} {}", rule.kind.label(), rule.path_prefix);
            }
        }
        RulesCommand::Add { kind, prefix } => {
            if policy.add_rule(kind, &prefix)? {
                println!("added {} {}", kind.label(), prefix);
            } else {
                println!("rule already present or not usable");
            }
        }
        RulesCommand::Remove { index } => match policy.remove_rule(index)? {
            Some(rule) => println!("removed {} {}", rule.kind.label(), rule.path_prefix),
            None => bail!("no rule at index {index}"),
        },
        RulesCommand::Clear => {
            policy.clear_rules()?;
            println!("cleared rules in {}", path.display());
        }
    }
    Ok(())
}

fn check(
    config: &Config,
    request: &PermissionRequest,
    root: &str,
    auto_approve: bool,
) -> Result<()> {
    let mut policy = PermissionPolicy::open(Box::new(rule_store(config)))?;
    policy.set_auto_approve(auto_approve);
    let decision = policy.evaluate(request, root);
    println!("{}", render::decision_line(&decision));
    Ok(())
}

fn sessions(config: &Config) -> Result<()> {
    let archive = archive(config);
    let sessions = archive.list()?;
    if sessions.is_empty() {
        println!("no sessions in {}", archive.root().display());
    }
    for summary in sessions {
        let header = summary.header;
        println!(
            "{}  {}  {}",
            header.session_id,
            header.working_root,
            summary.path.display()
        );
    }
    Ok(())
}

fn parse_kind(value: &str) -> Result<PermissionKind, String> {
    PermissionKind::parse(value)
        .ok_or_else(|| format!("unknown permission kind `{value}` (read, write, shell, url, mcp)"))
}

fn parse_decision(value: &str) -> Result<PermissionDecision, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "allow" => Ok(PermissionDecision::Allow),
        "deny" => Ok(PermissionDecision::Deny),
        "always" => Ok(PermissionDecision::Always),
        _ => Err(format!("unknown decision `{value}` (allow, deny, always)")),
    }
}
