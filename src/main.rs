use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use conform_check::Orchestrator;
use conform_core::{
    validate_git_url, CheckRequest, CheckStatus, ConformConfig, ModelStatus, OutputFormat,
};
use conform_repo::Workspace;
use conform_server::AppState;

const CONFIG_FILE: &str = ".conform.toml";

#[derive(Parser)]
#[command(
    name = "conform",
    version,
    about = "Spec compliance checker service",
    long_about = "Conform clones a repository, reads the specification documents under spec/,\n\
                   judges the code against each requirement and renders a TODO.md checklist.\n\n\
                   Examples:\n  \
                     conform serve                         Run the HTTP API on 0.0.0.0:8080\n  \
                     conform check https://github.com/o/r  Check one repository and print the report\n  \
                     conform doctor                        Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .conform.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    #[command(long_about = "Run the HTTP API.\n\n\
        Routes are mounted under /api/v1. Every route except /health requires\n\
        'Authorization: Bearer <API_KEY>'.\n\n\
        Examples:\n  conform serve\n  conform serve --port 9000")]
    Serve {
        /// Bind address (overrides server.host / SERVICE_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides server.port / SERVICE_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check one repository and print its report
    #[command(long_about = "Check one repository and print its report.\n\n\
        Runs the same pipeline as the HTTP API in-process and waits for it.\n\
        Exits with an error if the check fails.\n\n\
        Examples:\n  conform check https://github.com/org/repo.git\n  \
        conform check git@github.com:org/repo.git --branch develop --llm")]
    Check {
        /// Git URL of the repository
        repository_url: String,
        /// Branch to check
        #[arg(long, default_value = conform_core::DEFAULT_BRANCH)]
        branch: String,
        /// Specification files to use instead of spec/*.md
        #[arg(long = "spec")]
        spec_files: Vec<String>,
        /// Limit analysis to these paths or globs
        #[arg(long = "target")]
        target_paths: Vec<String>,
        /// Ask the model backend instead of using keyword heuristics
        #[arg(long)]
        llm: bool,
    },
    /// Create a default .conform.toml configuration file
    #[command(long_about = "Create a default .conform.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .conform.toml already exists.")]
    Init,
    /// Check your setup and environment
    #[command(long_about = "Check your setup and environment.\n\n\
        Runs diagnostics for git, the config file, the API key, the model backend,\n\
        the workspace directory and the publish target. Use --format json for\n\
        machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("conform v{version} — judge a repository against its own specification\n");

    println!("Quick start:");
    println!("  conform init                  Create a .conform.toml config file");
    println!("  conform serve                 Run the HTTP API");
    println!("  conform check <url>           Check one repository now\n");

    println!("All commands:");
    println!("  serve     HTTP API for asynchronous checks");
    println!("  check     One-shot check printing the TODO report");
    println!("  doctor    Check your setup and environment");
    println!("  init      Create default configuration\n");

    println!("Run 'conform <command> --help' for details.");
}

fn load_config(path: Option<&Path>) -> Result<ConformConfig> {
    let mut config = match path {
        Some(path) => ConformConfig::from_file(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                ConformConfig::from_file(default_path)?
            } else {
                ConformConfig::default()
            }
        }
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn init_tracing(config: &ConformConfig, verbose: bool) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.is_empty() => EnvFilter::new(value),
        _ => {
            let level = if verbose {
                "debug"
            } else {
                config.server.log_level.as_str()
            };
            EnvFilter::new(format!("{level},hyper=warn,reqwest=warn,h2=warn"))
        }
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

async fn run_doctor(
    config: &ConformConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. git executable
    match conform_repo::git_version().await {
        Some(version) => checks.push(CheckResult::pass("git", version)),
        None => checks.push(CheckResult::fail(
            "git",
            "git not found on PATH",
            "install git; clones and publishing shell out to it",
        )),
    }

    // 2. Config file
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));
    if path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using defaults and environment", path.display()),
        ));
    }

    // 3. API key
    if config.server.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
        checks.push(CheckResult::pass("api_key", "API_KEY set"));
    } else {
        checks.push(CheckResult::fail(
            "api_key",
            "API_KEY not set",
            "export API_KEY=... or set server.api_key; protected routes answer 500 until then",
        ));
    }

    // 4. Model backend
    let llm = conform_review::LlmClient::new(&config.llm)?;
    let health = llm.health().await;
    match health.status {
        ModelStatus::Connected if health.primary_model_available => checks.push(CheckResult::pass(
            "model_backend",
            format!("{} at {} ({} models loaded)", health.model, config.llm.host, health.models_loaded),
        )),
        ModelStatus::Connected => checks.push(CheckResult::fail(
            "model_backend",
            format!("{} is not loaded at {}", health.model, config.llm.host),
            format!("ollama pull {}", health.model),
        )),
        _ => {
            let detail = health.error.unwrap_or_else(|| "unreachable".into());
            let line = format!("{} ({detail})", config.llm.host);
            if config.analysis.use_llm {
                checks.push(CheckResult::fail(
                    "model_backend",
                    line,
                    "set OLLAMA_HOST or start the model server",
                ));
            } else {
                checks.push(CheckResult::info("model_backend", line));
            }
        }
    }

    // 5. Workspace root
    let workspace = Workspace::new(&config.git.workspace_root);
    match workspace.ensure_root() {
        Ok(root) => checks.push(CheckResult::pass("workspace", root.display().to_string())),
        Err(e) => checks.push(CheckResult::fail(
            "workspace",
            e.to_string(),
            "set WORKSPACE_ROOT to a writable directory",
        )),
    }

    // 6. Publish target
    match config.publish.spec_repo_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) if validate_git_url(url) => {
            let shown = conform_core::redact_secrets(url, &conform_core::secrets_for(url, None));
            checks.push(CheckResult::pass(
                "publish_target",
                format!("{shown} ({} on {})", config.publish.report_path, config.publish.branch),
            ));
        }
        Some(_) => checks.push(CheckResult::fail(
            "publish_target",
            "SPEC_REPO_URL is not a valid git URL",
            "use an https://, git@ or git:// URL",
        )),
        None => checks.push(CheckResult::info(
            "publish_target",
            "not configured, reports stay in memory",
        )),
    }

    // Output
    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Text => {
            let version = env!("CARGO_PKG_VERSION");
            println!("conform v{version} — Environment Check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<16} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

async fn run_check(config: &ConformConfig, request: CheckRequest, format: OutputFormat) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let started = orchestrator.start(request);
    let id = started.check_id;

    let record = loop {
        let record = orchestrator.status(&id)?;
        if record.status.is_terminal() {
            break record;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&record).into_diagnostic()?);
        }
        OutputFormat::Text if record.status == CheckStatus::Completed => {
            print!("{}", orchestrator.report(&id)?);
        }
        OutputFormat::Text => {}
    }

    if record.status == CheckStatus::Failed {
        miette::bail!(
            "check {id} failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# conform configuration
# Environment variables override every value below.

[server]
# host = "0.0.0.0"                  # SERVICE_HOST
# port = 8080                       # SERVICE_PORT
# max_concurrent_checks = 3         # MAX_CONCURRENT_CHECKS
# api_key = "change-me"             # API_KEY
# log_level = "info"                # LOG_LEVEL

[llm]
# host = "http://ollama:11434"      # OLLAMA_HOST
# model = "codellama:7b-instruct"   # OLLAMA_MODEL
# timeout_secs = 30
# max_retries = 3

[git]
# workspace_root = "/tmp/spec-checker"      # WORKSPACE_ROOT
# token = "ghp_..."                         # GIT_TOKEN
# user_name = "Spec Checker Bot"            # GIT_USER_NAME
# user_email = "spec-checker@example.com"   # GIT_USER_EMAIL
# clone_timeout_secs = 300
# push_timeout_secs = 60

[publish]
# spec_repo_url = "https://github.com/org/specs.git"   # SPEC_REPO_URL
# report_path = "TODO.md"
# branch = "main"
# max_report_bytes = 10485760

[analysis]
# max_requirements = 5
# use_llm = false
# max_context_files = 10
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => print_welcome(),
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "conform", &mut std::io::stdout());
        }
        Some(Command::Doctor) => {
            let config = load_config(cli.config.as_deref())?;
            run_doctor(&config, cli.config.as_deref(), cli.format, use_color).await?;
        }
        Some(Command::Serve { host, port }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_tracing(&config, cli.verbose);

            let orchestrator = Orchestrator::from_config(&config)?;
            let state = AppState::new(
                orchestrator,
                config.server.api_key.clone(),
                config.git.workspace_root.clone(),
            );
            if config.server.api_key.is_none() {
                tracing::warn!("API_KEY is not set; protected routes will answer 500");
            }

            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .into_diagnostic()
                .wrap_err_with(|| format!("binding {addr}"))?;
            conform_server::serve(listener, state, conform_server::shutdown_signal()).await?;
        }
        Some(Command::Check {
            repository_url,
            branch,
            spec_files,
            target_paths,
            llm,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(&config, cli.verbose);

            if !validate_git_url(&repository_url) {
                miette::bail!("invalid repository URL: {repository_url}");
            }
            let mut request = CheckRequest::new(repository_url);
            request.branch = branch;
            request.spec_files = (!spec_files.is_empty()).then_some(spec_files);
            request.target_paths = (!target_paths.is_empty()).then_some(target_paths);
            if llm {
                request
                    .options
                    .insert("use_llm".into(), serde_json::Value::Bool(true));
            }
            run_check(&config, request, cli.format).await?;
        }
    }

    Ok(())
}
