use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use rewind::bisect::BisectSession;
use rewind::config::Config;
use rewind::git::GitBackend;
use rewind::outcome::Outcome;
use rewind::rebase::{DisplayFormat, RebaseInstruction};
use rewind::tools::Tools;
use rewind::{rlog, rlog_error, rlog_warn, Result};

const SESSION_FILE: &str = "rewind-bisect.json";

/// Rewind - bisect, interactive rebase and reflog time travel for git repositories
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    REWIND_DEBUG=1  Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.rewind/rewind.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Repository to operate on (defaults to the configured repo, then ".")
    #[arg(short = 'C', long, global = true)]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Binary search for the commit that introduced a fault
    Bisect {
        #[command(subcommand)]
        action: BisectCommand,

        /// File holding the bisect session between invocations
        /// (default: rewind-bisect.json in the repository's git directory)
        #[arg(long, global = true)]
        session: Option<PathBuf>,
    },

    /// Plan, run and steer interactive rebases
    Rebase {
        #[command(subcommand)]
        action: RebaseCommand,
    },

    /// Inspect the reflog and move refs back in time
    Reflog {
        #[command(subcommand)]
        action: ReflogCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum BisectCommand {
    /// Start bisecting between a known good and a known bad commit
    Start { good: String, bad: String },
    /// Mark the checked-out commit as good
    Good,
    /// Mark the checked-out commit as bad
    Bad,
    /// End the session and return to the original HEAD
    Reset,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct FormatArgs {
    /// Show full 40-character commit ids
    #[arg(long)]
    pub full_id: bool,

    /// Show full commit messages instead of the first line
    #[arg(long)]
    pub full_message: bool,
}

impl From<&FormatArgs> for DisplayFormat {
    fn from(args: &FormatArgs) -> Self {
        DisplayFormat {
            full_id: args.full_id,
            full_message: args.full_message,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum RebaseCommand {
    /// Show the commits in upstream..branch as a pick list
    Plan {
        upstream: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Preview the commits a rebase onto BASE would replay
    Preview {
        base: String,
        /// 0 shows every commit
        #[arg(short = 'n', long, default_value_t = 0, allow_negative_numbers = true)]
        max_count: i64,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Number commits for use in `rebase execute` instructions
    List {
        #[arg(long)]
        base: Option<String>,
        /// 0 uses the configured list limit
        #[arg(short = 'n', long, default_value_t = 0, allow_negative_numbers = true)]
        max_count: i64,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Start an all-pick rebase onto UPSTREAM
    Start { upstream: String },
    /// Rebase onto UPSTREAM applying instructions such as `drop:2` or `reword:1:New subject`
    Execute {
        upstream: String,
        #[arg(required = true)]
        instructions: Vec<RebaseInstruction>,
    },
    /// Continue after resolving conflicts or finishing an edit
    Continue,
    /// Skip the current commit
    Skip,
    /// Abort and restore the original branch
    Abort,
    /// Show progress of the current rebase
    Status,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ReflogCommand {
    /// List reflog entries, newest first
    Show {
        /// Ref to read (default HEAD)
        reference: Option<String>,
        /// 0 shows every entry; defaults to the configured reflog_limit
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },
    /// Hard-reset a ref to a commit
    Revert {
        commit: String,
        /// Ref to move (default HEAD)
        #[arg(long = "ref")]
        reference: Option<String>,
    },
    /// Hard-reset to where `ref@{n}` pointed
    Goto {
        expression: String,
        /// Only show the target commit
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if rewind::log::init_with_debug(cli.debug) {
        rlog!("rewind starting (debug mode enabled)");
    }

    let config = Config::load().unwrap_or_else(|e| {
        rlog_warn!("Could not load config, using defaults: {}", e);
        Config::default()
    });

    let tools = match Tools::open(cli.repo.as_deref(), config) {
        Ok(tools) => tools,
        Err(e) => {
            emit(&Outcome::<()>::failure(e.to_string()))?;
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Bisect { action, session } => session_file(&tools, session)
            .and_then(|session_path| run_bisect(&tools, action, &session_path)),
        Command::Rebase { action } => run_rebase(&tools, action),
        Command::Reflog { action } => run_reflog(&tools, action),
    };
    let ok = match result {
        Ok(ok) => ok,
        Err(e) => {
            rlog_error!("Command failed: {}", e);
            emit(&Outcome::<()>::failure(e.to_string()))?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Print `outcome` as JSON; returns whether it succeeded.
fn emit<T: Serialize>(outcome: &Outcome<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(outcome.is_success())
}

/// Sessions live with the repository so `-C` invocations never share one.
fn session_file(tools: &Tools<GitBackend>, explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(tools.graph().git_dir()?.join(SESSION_FILE)),
    }
}

fn load_session(path: &Path) -> Result<Option<BisectSession>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
}

fn store_session(path: &Path, session: &BisectSession) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(session)?)?;
    Ok(())
}

fn run_bisect(tools: &Tools<GitBackend>, action: BisectCommand, session_path: &Path) -> Result<bool> {
    rlog!("Bisect command: {:?}", action);
    let outcome = match action {
        BisectCommand::Start { good, bad } => tools.bisect_start(&good, &bad),
        BisectCommand::Good | BisectCommand::Bad => {
            let Some(session) = load_session(session_path)? else {
                return emit(&Outcome::<()>::failure(format!(
                    "No bisect session found at {}",
                    session_path.display()
                )));
            };
            if action == BisectCommand::Good {
                tools.bisect_good(&session)
            } else {
                tools.bisect_bad(&session)
            }
        }
        BisectCommand::Reset => {
            let session = load_session(session_path)?;
            let outcome = tools.bisect_reset(session.as_ref());
            if outcome.is_success() && session_path.exists() {
                fs::remove_file(session_path)?;
            }
            outcome
        }
    };

    if let Some(session) = outcome.value().and_then(|report| report.session.as_ref()) {
        store_session(session_path, session)?;
    }
    emit(&outcome)
}

fn run_rebase(tools: &Tools<GitBackend>, action: RebaseCommand) -> Result<bool> {
    rlog!("Rebase command: {:?}", action);
    match action {
        RebaseCommand::Plan { upstream, branch } => {
            emit(&tools.rebase_plan(&upstream, branch.as_deref()))
        }
        RebaseCommand::Preview {
            base,
            max_count,
            format,
        } => emit(&tools.rebase_preview(&base, max_count, (&format).into())),
        RebaseCommand::List {
            base,
            max_count,
            format,
        } => emit(&tools.list_commits(base.as_deref(), max_count, (&format).into())),
        RebaseCommand::Start { upstream } => emit(&tools.rebase_start(&upstream)),
        RebaseCommand::Execute {
            upstream,
            instructions,
        } => emit(&tools.rebase_execute(&upstream, &instructions)),
        RebaseCommand::Continue => emit(&tools.rebase_continue()),
        RebaseCommand::Skip => emit(&tools.rebase_skip()),
        RebaseCommand::Abort => emit(&tools.rebase_abort()),
        RebaseCommand::Status => emit(&tools.rebase_status()),
    }
}

fn run_reflog(tools: &Tools<GitBackend>, action: ReflogCommand) -> Result<bool> {
    rlog!("Reflog command: {:?}", action);
    match action {
        ReflogCommand::Show {
            reference,
            max_count,
        } => emit(&tools.reflog(reference.as_deref(), max_count)),
        ReflogCommand::Revert { commit, reference } => {
            emit(&tools.reflog_revert(reference.as_deref(), &commit))
        }
        ReflogCommand::Goto {
            expression,
            dry_run: true,
        } => emit(&tools.reflog_resolve(&expression)),
        ReflogCommand::Goto { expression, .. } => emit(&tools.reflog_goto(&expression)),
    }
}
