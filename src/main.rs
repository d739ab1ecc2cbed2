//! # Project Context CLI (`pctx`)
//!
//! ## Usage
//!
//! ```bash
//! pctx --config ./pctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pctx structure [root]` | Print the folder structure |
//! | `pctx context [root]` | Print structure, file contents, and statistics |
//! | `pctx targeted <root> <file>...` | Print the structure plus selected files |
//! | `pctx prompt <root> "<query>"` | Print the full prompt without calling a model |
//! | `pctx ask <root> "<query>"` | Answer one query with retrieval escalation |
//! | `pctx chat <root>` | Interactive session (`/reset`, `/reload`, `/exit`) |
//! | `pctx sandbox <root> "<request>"` | Generate Python code, optionally run and fix it |
//! | `pctx run <file>` | Run a script through the sandbox |
//!
//! Logging is controlled by `PCTX_LOG` (e.g. `PCTX_LOG=debug`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use project_context::config::{self, Config};
use project_context::context::{
    extract_full, extract_structure, extract_targeted, render_full, render_targeted,
};
use project_context::escalation::{Escalator, QueryOutcome};
use project_context::llm::{CompletionClient, OpenAiClient};
use project_context::models::{Message, ProjectReport, TargetFileSet};
use project_context::policy::ExtractionPolicy;
use project_context::prompt;
use project_context::report::ProgressMode;
use project_context::sandbox::{self, ExecutionOutput};

/// Project Context CLI: extract a project's context and ask a language
/// model about it.
#[derive(Parser)]
#[command(
    name = "pctx",
    about = "Extract project context and query a language model with adaptive retrieval",
    version,
    long_about = "pctx walks a project directory, extracts text from source files, notebooks, \
    documents and workbooks, and sends the relevant part to a language model. When the model \
    rejects a request as too large, the context is narrowed step by step down to the bare \
    folder structure."
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used when it
    /// does not exist.
    #[arg(long, global = true, default_value = "./pctx.toml")]
    config: PathBuf,

    /// Comma-separated extensions, replacing the configured allowlist.
    #[arg(long, global = true)]
    ext: Option<String>,

    /// Comma-separated names to exclude, replacing the configured additions.
    /// The built-in exclusions always apply.
    #[arg(long, global = true)]
    exclude: Option<String>,

    /// Escalation notices on stderr. Defaults to `human` on a terminal,
    /// `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the folder structure of a project.
    Structure {
        #[arg(default_value = ".")]
        root: PathBuf,
    },

    /// Print the folder structure, every file's content, and statistics.
    ///
    /// Files above `extraction.max_file_bytes` are listed as `[too large]`.
    Context {
        #[arg(default_value = ".")]
        root: PathBuf,
    },

    /// Print the full structure plus the content of the given files only.
    ///
    /// Files may be given as root-relative paths or bare names.
    Targeted {
        root: PathBuf,
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Print the prompt that would carry the full project content,
    /// without calling a model.
    Prompt { root: PathBuf, query: String },

    /// Answer one query about a project.
    Ask { root: PathBuf, query: String },

    /// Multi-turn session about a project.
    Chat { root: PathBuf },

    /// Ask for Python code using the project structure as context.
    Sandbox {
        root: PathBuf,
        request: String,

        /// Run the generated code.
        #[arg(long)]
        execute: bool,

        /// When the run fails, ask once for a fix and run the fixed code.
        #[arg(long, requires = "execute")]
        fix: bool,
    },

    /// Run a script file through the sandbox.
    Run { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?
        .with_overrides(cli.ext.as_deref(), cli.exclude.as_deref());
    cfg.validate()?;
    let policy = cfg.extraction.policy();
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Structure { root } => {
            let report = ProjectReport {
                structure: extract_structure(&root, &policy),
                ..Default::default()
            };
            println!("{}", render_full(&report, false));
        }
        Commands::Context { root } => {
            let report = extract_full(&root, &policy, true);
            println!("{}", render_full(&report, true));
        }
        Commands::Targeted { root, files } => {
            let report = extract_targeted(&root, &policy, &TargetFileSet::new(files));
            println!("{}", render_targeted(&report));
        }
        Commands::Prompt { root, query } => {
            let report = extract_full(&root, &policy, true);
            println!(
                "{}",
                prompt::preview_block(&render_full(&report, true), &query)
            );
        }
        Commands::Ask { root, query } => {
            let mut escalator = build_escalator(&cfg, root, policy, progress)?;
            match escalator.ask(&query).await {
                QueryOutcome::Answered { text, .. } => println!("{}", text),
                QueryOutcome::Exhausted => anyhow::bail!(
                    "project is too voluminous: even the structure-only request was rate limited"
                ),
            }
        }
        Commands::Chat { root } => {
            let escalator = build_escalator(&cfg, root, policy, progress)?;
            run_chat(escalator).await?;
        }
        Commands::Sandbox {
            root,
            request,
            execute,
            fix,
        } => {
            run_sandbox(&cfg, &root, &policy, &request, execute, fix).await?;
        }
        Commands::Run { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read script: {}", file.display()))?;
            let output = sandbox::execute(&source, &cfg.sandbox).await;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if output.failed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PCTX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_escalator(
    cfg: &Config,
    root: PathBuf,
    policy: ExtractionPolicy,
    progress: ProgressMode,
) -> Result<Escalator> {
    let client: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(&cfg.llm)?);
    Ok(Escalator::new(client, cfg.models.clone(), root, policy).with_reporter(progress.reporter()))
}

async fn run_chat(mut escalator: Escalator) -> Result<()> {
    escalator.structure();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                escalator.reset_history();
                println!("conversation cleared");
            }
            "/reload" => {
                escalator.reload_structure();
                println!("structure reloaded, conversation cleared");
            }
            query => match escalator.ask(query).await {
                QueryOutcome::Answered { text, .. } => println!("\n{}\n", text),
                QueryOutcome::Exhausted => println!(
                    "\nerror: project is too voluminous, even structure only failed\n"
                ),
            },
        }
    }
    Ok(())
}

async fn run_sandbox(
    cfg: &Config,
    root: &Path,
    policy: &ExtractionPolicy,
    request: &str,
    execute: bool,
    fix: bool,
) -> Result<()> {
    let client = OpenAiClient::new(&cfg.llm)?;
    let structure = render_full(
        &ProjectReport {
            structure: extract_structure(root, policy),
            ..Default::default()
        },
        false,
    );

    let mut history = vec![Message::system(prompt::SANDBOX_SYSTEM_PROMPT)];
    let mut outgoing = history.clone();
    outgoing.push(Message::user(prompt::sandbox_request(&structure, "", request)));
    history.push(Message::user(request));

    let reply = client
        .complete(&outgoing, &cfg.models.selector)
        .await
        .into_text();
    history.push(Message::assistant(reply.clone()));

    let Some(code) = present_code(&reply) else {
        return Ok(());
    };
    if !execute {
        return Ok(());
    }

    let output = sandbox::execute(&code, &cfg.sandbox).await;
    print_output(&output);
    if !(output.failed() && fix) {
        return Ok(());
    }

    history.push(Message::user(prompt::sandbox_debug_request(
        &output.stderr,
        &code,
    )));
    let reply = client
        .complete(&history, &cfg.models.selector)
        .await
        .into_text();
    if let Some(fixed) = present_code(&reply) {
        print_output(&sandbox::execute(&fixed, &cfg.sandbox).await);
    }
    Ok(())
}

/// Print a sandbox reply and return its code block, if any.
fn present_code(reply: &str) -> Option<String> {
    let code = prompt::extract_code_block(reply);
    match &code {
        Some(code) => {
            println!("{}\n", prompt::explanation_without_code(reply));
            println!("```python\n{}\n```", code);
        }
        None => println!("{}", reply),
    }
    code
}

fn print_output(output: &ExecutionOutput) {
    if !output.stdout.is_empty() {
        println!("--- stdout ---\n{}", output.stdout);
    }
    if output.failed() {
        println!("--- stderr ---\n{}", output.stderr);
    } else {
        println!("execution finished successfully");
    }
}
