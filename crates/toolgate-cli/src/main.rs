//! toolgate CLI
//!
//! The `toolgate` command exercises the tool layer from a terminal.
//!
//! ## Commands
//!
//! - `policy`: validate, evaluate, compile and apply network policies
//! - `sanitize`: clean text read from stdin, optionally fenced or as a label
//! - `anchors`: print a file with hashline anchors
//! - `call`: run any tool call against the local shell sandbox
//! - `exec`: shorthand for `call exec`

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, Level};

use toolgate_core::anchor::{render_anchored, render_plain};
use toolgate_core::audit::TracingAuditSink;
use toolgate_core::metrics::METRICS;
use toolgate_core::network_policy::{presets, SandboxFileSyncer};
use toolgate_core::{
    evaluate, BoundaryKind, Capabilities, EditMode, EnforcementRuleSet, ExecutionContext,
    LocalShellSandbox, PolicyDraft, PolicyService, ReqwestTransport, Sanitizer, ToolDispatcher,
    ToolResult, ToolgateConfig,
};
use toolgate_state::fakes::{MemoryCredentialVault, MemoryPolicyStore, MemorySandboxDirectory};
use toolgate_state::{Credential, PolicyStore, SandboxDirectory, SandboxRecord, SurrealPolicyStore};

/// Machine id of the host when it stands in for a sandbox.
const LOCAL_SANDBOX: &str = "local";

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sandboxed tool execution, credential injection and prompt sanitization", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "TOOLGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with network policies
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Sanitize text from stdin
    Sanitize {
        /// Fence the output in a boundary of this kind (e.g. tool_output)
        #[arg(long, conflicts_with = "label")]
        boundary: Option<String>,

        /// Provenance recorded on the boundary
        #[arg(long, requires = "boundary")]
        source: Option<String>,

        /// Treat the input as a short label
        #[arg(long)]
        label: bool,
    },

    /// Print a file with line anchors
    Anchors {
        path: PathBuf,

        /// Number lines without hashes
        #[arg(long)]
        plain: bool,
    },

    /// Run a tool call against the local shell sandbox
    Call {
        /// Tool name (exec, read_file, edit_file, ...)
        tool: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run a shell command through the session driver
    Exec {
        command: String,

        /// Timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Validate a policy file and list every problem
    Validate { path: PathBuf },

    /// Evaluate hosts against a policy file
    Eval {
        path: PathBuf,

        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Print the enforcement rule set a policy compiles to
    Compile { path: PathBuf },

    /// List built-in presets
    Presets,

    /// Store a policy (or preset) for an agent and sync it to the local sandbox
    Apply {
        #[arg(long)]
        agent: String,

        /// Policy file
        #[arg(long, conflicts_with = "preset", required_unless_present = "preset")]
        file: Option<PathBuf>,

        /// Built-in preset id
        #[arg(long)]
        preset: Option<String>,

        /// SurrealDB URL for the policy store (default: in memory)
        #[arg(long, env = "TOOLGATE_DB_URL")]
        db: Option<String>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    #[arg(long, default_value = "local-agent")]
    agent: String,

    /// Working directory (default: current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Use plain string edits instead of anchors
    #[arg(long)]
    plain_edits: bool,

    /// JSON array of credentials to assign to the agent
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// SurrealDB URL for the policy store (default: in memory)
    #[arg(long, env = "TOOLGATE_DB_URL")]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    toolgate_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let outcome = match cli.command {
        Commands::Policy { action } => match action {
            PolicyAction::Validate { path } => cmd_policy_validate(&config, &path),
            PolicyAction::Eval { path, hosts } => cmd_policy_eval(&config, &path, &hosts),
            PolicyAction::Compile { path } => cmd_policy_compile(&config, &path),
            PolicyAction::Presets => cmd_policy_presets(),
            PolicyAction::Apply {
                agent,
                file,
                preset,
                db,
            } => cmd_policy_apply(&config, &agent, file.as_deref(), preset.as_deref(), db.as_deref()).await,
        },
        Commands::Sanitize {
            boundary,
            source,
            label,
        } => cmd_sanitize(&config, boundary.as_deref(), source.as_deref(), label),
        Commands::Anchors { path, plain } => cmd_anchors(&config, &path, plain),
        Commands::Call { tool, args, run } => {
            let args: Value = serde_json::from_str(&args).context("arguments must be JSON")?;
            cmd_call(&config, &tool, args, &run).await
        }
        Commands::Exec {
            command,
            timeout_ms,
            run,
        } => {
            let mut args = json!({ "command": command });
            if let Some(ms) = timeout_ms {
                args["timeoutMs"] = json!(ms);
            }
            cmd_call(&config, "exec", args, &run).await
        }
    };

    METRICS.flush();
    outcome
}

fn load_config(path: Option<&Path>) -> Result<ToolgateConfig> {
    let config = match path {
        Some(path) => ToolgateConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ToolgateConfig::default(),
    };
    config
        .with_env_overrides()
        .context("Invalid TOOLGATE_* environment override")
}

fn read_policy_draft(path: &Path) -> Result<PolicyDraft> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a policy document", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// -------------------------------------------------------------------------
// policy
// -------------------------------------------------------------------------

fn cmd_policy_validate(config: &ToolgateConfig, path: &Path) -> Result<()> {
    let validator = toolgate_core::PolicyValidator::new(config.policy.strict_catch_all);
    let report = validator.validate(&read_policy_draft(path)?);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    if !report.valid {
        bail!("{} is invalid ({} error(s))", path.display(), report.errors.len());
    }
    println!("{} is valid", path.display());
    Ok(())
}

fn parse_policy(config: &ToolgateConfig, path: &Path) -> Result<toolgate_core::NetworkPolicy> {
    let validator = toolgate_core::PolicyValidator::new(config.policy.strict_catch_all);
    match validator.parse(&read_policy_draft(path)?) {
        Ok((policy, _)) => Ok(policy),
        Err(report) => bail!("invalid policy: {}", report.errors.join("; ")),
    }
}

fn cmd_policy_eval(config: &ToolgateConfig, path: &Path, hosts: &[String]) -> Result<()> {
    let policy = parse_policy(config, path)?;
    for host in hosts {
        println!("{}", evaluate(&policy, host).describe());
    }
    Ok(())
}

fn cmd_policy_compile(config: &ToolgateConfig, path: &Path) -> Result<()> {
    let policy = parse_policy(config, path)?;
    println!("{}", EnforcementRuleSet::compile(&policy).to_json()?);
    Ok(())
}

fn cmd_policy_presets() -> Result<()> {
    for preset in presets() {
        println!(
            "{} (v{}, {}, {} rules): {}",
            preset.id,
            preset.version,
            preset.mode,
            preset.rules.len(),
            preset.description
        );
    }
    Ok(())
}

async fn policy_store(db: Option<&str>) -> Result<Arc<dyn PolicyStore>> {
    Ok(match db {
        Some(url) => Arc::new(
            SurrealPolicyStore::connect_url(url)
                .await
                .context("Failed to connect to policy store")?,
        ),
        None => Arc::new(MemoryPolicyStore::new()),
    })
}

/// Sandbox directory holding the host as the agent's home sandbox.
async fn local_sandboxes(agent: &str) -> Result<Arc<MemorySandboxDirectory>> {
    let sandboxes = Arc::new(MemorySandboxDirectory::new());
    sandboxes
        .upsert_sandbox(agent, SandboxRecord::home("home", LOCAL_SANDBOX))
        .await?;
    Ok(sandboxes)
}

async fn cmd_policy_apply(
    config: &ToolgateConfig,
    agent: &str,
    file: Option<&Path>,
    preset: Option<&str>,
    db: Option<&str>,
) -> Result<()> {
    let service = PolicyService::new(
        policy_store(db).await?,
        local_sandboxes(agent).await?,
        Arc::new(SandboxFileSyncer::new(
            Arc::new(LocalShellSandbox::new()),
            config.policy.enforcement_path.clone(),
        )),
        &config.policy,
    );

    let outcome = match (file, preset) {
        (Some(path), _) => service.replace_policy(agent, &read_policy_draft(path)?).await?,
        (None, Some(id)) => service.apply_preset(agent, id).await?,
        (None, None) => bail!("either --file or --preset is required"),
    };
    info!(agent, synced = outcome.sync.is_synced(), "policy stored");
    print_json(&outcome)
}

// -------------------------------------------------------------------------
// sanitize / anchors
// -------------------------------------------------------------------------

fn cmd_sanitize(
    config: &ToolgateConfig,
    boundary: Option<&str>,
    source: Option<&str>,
    label: bool,
) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    let sanitizer = Sanitizer::new(&config.sanitize);

    let output = match boundary {
        Some(kind) => {
            let kind: BoundaryKind = serde_json::from_value(Value::String(kind.to_string()))
                .with_context(|| format!("unknown boundary kind '{kind}'"))?;
            let provenance: Vec<(&str, &str)> = source.map(|s| ("source", s)).into_iter().collect();
            sanitizer.wrap_boundary(kind, &input, &provenance)
        }
        None if label => sanitizer.sanitize_label(&input, "unnamed"),
        None => sanitizer.sanitize(&input),
    };
    println!("{output}");
    Ok(())
}

fn cmd_anchors(config: &ToolgateConfig, path: &Path, plain: bool) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let lines = content.lines();
    let rendered = if plain {
        render_plain(lines, 1)
    } else {
        render_anchored(lines, 1, config.edit.anchor_hash_len)
    };
    print!("{rendered}");
    Ok(())
}

// -------------------------------------------------------------------------
// call / exec
// -------------------------------------------------------------------------

fn read_credentials(path: &Path) -> Result<Vec<Credential>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a credential list", path.display()))
}

async fn build_dispatcher(config: &ToolgateConfig, run: &RunArgs) -> Result<ToolDispatcher> {
    let vault = Arc::new(MemoryCredentialVault::new());
    if let Some(path) = &run.credentials {
        for credential in read_credentials(path)? {
            vault.assign(&run.agent, credential)?;
        }
    }
    let transport =
        ReqwestTransport::new(&config.http.user_agent).context("Failed to build HTTP client")?;

    Ok(ToolDispatcher::new(
        config,
        Capabilities {
            sandbox: Arc::new(LocalShellSandbox::new()),
            vault,
            policy_store: policy_store(run.db.as_deref()).await?,
            sandboxes: local_sandboxes(&run.agent).await?,
            transport: Arc::new(transport),
            audit: Arc::new(TracingAuditSink),
            syncer: None,
        },
    ))
}

async fn cmd_call(config: &ToolgateConfig, tool: &str, args: Value, run: &RunArgs) -> Result<()> {
    let cwd = match &run.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let mut ctx = ExecutionContext::new(
        run.agent.clone(),
        format!("cli-{}", uuid::Uuid::new_v4().simple()),
        LOCAL_SANDBOX,
        cwd.to_string_lossy().into_owned(),
    );
    if run.plain_edits {
        ctx = ctx.with_edit_mode(EditMode::Plain);
    }

    let dispatcher = build_dispatcher(config, run).await?;
    let result: ToolResult = dispatcher.dispatch(tool, args, &ctx).await;
    print_json(&result)?;
    if !result.success {
        bail!(
            "{tool} failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
