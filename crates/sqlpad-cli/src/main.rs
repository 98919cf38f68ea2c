//! SQLPad - SQL playground CLI
//!
//! The `sqlpad` command runs SQL in a learner's sandbox database and checks
//! it against the curriculum.
//!
//! ## Commands
//!
//! - `exec`: Run SQL in the learner's sandbox
//! - `submit`: Run SQL for a task and validate the result
//! - `reset`: Drop the learner's tables and types
//! - `status`: List the learner's tables, types and extensions
//! - `tasks`: List curriculum tasks
//! - `hint`: Show a task hint

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, Level};

use sqlpad_core::guard::Row;
use sqlpad_core::{
    Curriculum, ExecutionOutcome, ExecutorConfig, LearnerId, PgConfig, Playground, SandboxStatus,
    SubmitOutcome,
};

#[derive(Parser)]
#[command(name = "sqlpad")]
#[command(author = "Golden Whisk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run SQL lessons in a personal Postgres sandbox", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON results and JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Curriculum file (.json or .toml); the bundled kitchen course if omitted
    #[arg(long, global = true, env = "SQLPAD_CURRICULUM")]
    curriculum: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LearnerArg {
    /// Learner whose sandbox to use
    #[arg(short, long, env = "SQLPAD_LEARNER")]
    learner: String,
}

#[derive(Args)]
struct SqlInput {
    /// SQL text; read from --file or stdin when omitted
    sql: Option<String>,

    /// Read SQL from a file ("-" for stdin)
    #[arg(short, long, conflicts_with = "sql")]
    file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run SQL in the learner's sandbox
    Exec {
        #[command(flatten)]
        learner: LearnerArg,

        #[command(flatten)]
        input: SqlInput,
    },

    /// Run SQL for a task, then check the task's validation rule
    Submit {
        #[command(flatten)]
        learner: LearnerArg,

        /// Task id, e.g. task-2-1
        #[arg(short, long)]
        task: String,

        #[command(flatten)]
        input: SqlInput,
    },

    /// Drop every table and type in the learner's sandbox
    Reset {
        #[command(flatten)]
        learner: LearnerArg,
    },

    /// Show the learner's tables, types and extensions
    Status {
        #[command(flatten)]
        learner: LearnerArg,
    },

    /// List curriculum tasks in order
    Tasks,

    /// Show a hint for a task
    Hint {
        /// Task id
        task: String,

        /// Hint level, 1 (nudge) to 3 (answer)
        #[arg(default_value = "1", value_parser = clap::value_parser!(u8).range(1..=3))]
        level: u8,
    },
}

#[derive(Debug, Serialize)]
struct TaskSummary<'a> {
    id: &'a str,
    module: &'a str,
    title: &'a str,
    rule: &'a str,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sqlpad_core::telemetry::init_tracing(cli.json, level);

    let curriculum = load_curriculum(cli.curriculum.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Tasks => cmd_tasks(&curriculum, json),
        Commands::Hint { task, level } => cmd_hint(&curriculum, &task, level, json),
        Commands::Exec { learner, input } => {
            let learner = parse_learner(&learner)?;
            let sql = input.read()?;
            with_playground(curriculum, |pg| async move {
                cmd_exec(&pg, &learner, &sql, json).await
            })
            .await
        }
        Commands::Submit {
            learner,
            task,
            input,
        } => {
            let learner = parse_learner(&learner)?;
            let sql = input.read()?;
            with_playground(curriculum, |pg| async move {
                cmd_submit(&pg, &learner, &task, &sql, json).await
            })
            .await
        }
        Commands::Reset { learner } => {
            let learner = parse_learner(&learner)?;
            with_playground(curriculum, |pg| async move { cmd_reset(&pg, &learner).await }).await
        }
        Commands::Status { learner } => {
            let learner = parse_learner(&learner)?;
            with_playground(curriculum, |pg| async move {
                cmd_status(&pg, &learner, json).await
            })
            .await
        }
    }
}

fn load_curriculum(path: Option<&Path>) -> Result<Curriculum> {
    match path {
        Some(path) => Curriculum::from_path(path)
            .with_context(|| format!("Failed to load curriculum {}", path.display())),
        None => Curriculum::kitchen().context("Bundled curriculum is invalid"),
    }
}

fn parse_learner(arg: &LearnerArg) -> Result<LearnerId> {
    LearnerId::new(arg.learner.as_str()).context("Invalid learner id")
}

impl SqlInput {
    fn read(&self) -> Result<String> {
        let sql = match (&self.sql, &self.file) {
            (Some(sql), _) => sql.clone(),
            (None, Some(path)) if path.as_os_str() != "-" => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            _ => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read SQL from stdin")?;
                buf
            }
        };
        if sql.trim().is_empty() {
            bail!("No SQL given");
        }
        Ok(sql)
    }
}

/// Open a playground from the environment, run `f`, then close every pool.
async fn with_playground<F, Fut>(curriculum: Curriculum, f: F) -> Result<ExitCode>
where
    F: FnOnce(Arc<Playground>) -> Fut,
    Fut: std::future::Future<Output = Result<ExitCode>>,
{
    let pg = PgConfig::from_env().context("Invalid database configuration")?;
    let config = ExecutorConfig::from_env().context("Invalid executor configuration")?;
    debug!(host = %pg.host, port = pg.port, "opening playground");
    let playground = Arc::new(
        Playground::connect(pg, config, curriculum).context("Failed to open playground")?,
    );

    let result = f(Arc::clone(&playground)).await;
    playground.shutdown().await;
    result
}

async fn cmd_exec(
    playground: &Playground,
    learner: &LearnerId,
    sql: &str,
    json: bool,
) -> Result<ExitCode> {
    let outcome = playground
        .execute(learner, sql)
        .await
        .context("Execution failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_execution(&outcome));
    }
    Ok(exit_code(outcome.success))
}

async fn cmd_submit(
    playground: &Playground,
    learner: &LearnerId,
    task: &str,
    sql: &str,
    json: bool,
) -> Result<ExitCode> {
    let outcome = playground
        .submit(learner, task, sql)
        .await
        .with_context(|| format!("Failed to submit task '{task}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            SubmitOutcome::PolicyBlocked(execution) | SubmitOutcome::ExecutionFailed(execution) => {
                print!("{}", render_execution(execution));
            }
            SubmitOutcome::Validated {
                validation,
                elapsed_ms,
            } => {
                let mark = if validation.is_correct { "PASS" } else { "FAIL" };
                println!("{mark}: {}", validation.message);
                if let (Some(expected), Some(actual)) = (&validation.expected, &validation.actual)
                {
                    println!("  expected: {expected}");
                    println!("  actual:   {actual}");
                }
                println!("({elapsed_ms} ms)");
            }
        }
    }
    Ok(exit_code(outcome.is_correct()))
}

async fn cmd_reset(playground: &Playground, learner: &LearnerId) -> Result<ExitCode> {
    playground
        .reset(learner)
        .await
        .with_context(|| format!("Failed to reset sandbox for '{learner}'"))?;
    println!("Reset sandbox for '{learner}'");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(playground: &Playground, learner: &LearnerId, json: bool) -> Result<ExitCode> {
    let status = playground
        .status(learner)
        .await
        .context("Failed to read sandbox status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render_status(&status));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_tasks(curriculum: &Curriculum, json: bool) -> Result<ExitCode> {
    let summaries: Vec<TaskSummary<'_>> = curriculum
        .modules()
        .iter()
        .flat_map(|module| {
            module.tasks.iter().map(move |task| TaskSummary {
                id: &task.id,
                module: &module.title,
                title: &task.title,
                rule: task.validation.kind.as_str(),
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut current_module = "";
    for summary in summaries {
        if summary.module != current_module {
            println!("{}", summary.module);
            current_module = summary.module;
        }
        println!("  {:<10} {}", summary.id, summary.title);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_hint(curriculum: &Curriculum, task_id: &str, level: u8, json: bool) -> Result<ExitCode> {
    let task = curriculum
        .task(task_id)
        .with_context(|| format!("Unknown task '{task_id}'"))?;
    let Some(hint) = task.hints.iter().find(|h| h.level == level) else {
        bail!("Task '{task_id}' has no level {level} hint");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(hint)?);
    } else {
        println!("{} (hint {level})", task.title);
        println!();
        println!("{}", hint.content);
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Plain-text rendering of rows, or the error for a failed run.
fn render_execution(outcome: &ExecutionOutcome) -> String {
    if let Some(error) = &outcome.error {
        return format!("ERROR: {error}\n");
    }
    let mut out = String::new();
    if let Some(first) = outcome.rows.first() {
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        out.push_str(&columns.join(" | "));
        out.push('\n');
        for row in &outcome.rows {
            out.push_str(&render_row(row, &columns));
            out.push('\n');
        }
        out.push_str(&format!(
            "({} row{}, {} ms)\n",
            outcome.row_count,
            if outcome.row_count == 1 { "" } else { "s" },
            outcome.elapsed_ms
        ));
    } else {
        out.push_str(&format!(
            "OK, {} row(s) affected ({} ms)\n",
            outcome.rows_affected, outcome.elapsed_ms
        ));
    }
    out
}

fn render_row(row: &Row, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| match row.get(*column) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => "NULL".to_string(),
            Some(other) => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn render_status(status: &SandboxStatus) -> String {
    let section = |title: &str, names: &[String]| {
        if names.is_empty() {
            format!("{title}: (none)\n")
        } else {
            format!("{title}: {}\n", names.join(", "))
        }
    };
    [
        section("Tables", &status.tables),
        section("Types", &status.types),
        section("Extensions", &status.extensions),
    ]
    .concat()
}
