mod args;
mod format;
mod history;
mod meta;
mod repl;
mod runner;
mod splitter;
mod timing;

use std::process;

use anyhow::{Context, Result};
use args::Args;
use clap::Parser;
use format::OutputMode;
use meta::{execute_meta, parse_meta, MetaResult};
use runner::StatementRunner;
use splitter::split_statements;
use supersql_client::{ClientConfig, Connection};
use tracing::debug;

/// Exit status when a script stops on its first failing statement.
const EXIT_SCRIPT_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("ssql: error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::load_or_default(&args.config);
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    let conn = Connection::connect(args.descriptor()?).with_config(config);
    debug!("Using {:?}", conn);

    let mode = args.output_mode(args.expanded);

    let code = if let Some(cmd) = args.command.as_deref() {
        debug!("Mode: -c");
        run_statements(&conn, &split_statements(cmd), mode, &args).await?
    } else if let Some(path) = args.file.as_deref() {
        debug!("Mode: -f {}", path);
        let sql =
            std::fs::read_to_string(path).with_context(|| format!("Cannot read file: {}", path))?;
        run_statements(&conn, &split_statements(&sql), mode, &args).await?
    } else {
        debug!("Mode: REPL");
        repl::run_repl(&conn, &args).await?;
        0
    };

    conn.close();
    Ok(code)
}

/// Run script statements in order on one session. Returns the process
/// exit code.
async fn run_statements(
    conn: &Connection,
    statements: &[String],
    mode: OutputMode,
    args: &Args,
) -> Result<i32> {
    let mut runner = StatementRunner::new(conn)?;
    let code = run_script(&mut runner, statements, mode, args).await;
    runner.close().await;
    Ok(code)
}

async fn run_script(
    runner: &mut StatementRunner,
    statements: &[String],
    mode: OutputMode,
    args: &Args,
) -> i32 {
    let mut failed = false;
    for sql in statements {
        let result = match parse_meta(sql) {
            Some(cmd) => match execute_meta(&cmd, runner).await {
                Ok(MetaResult::Quit) => break,
                Ok(MetaResult::Output(s)) => Ok(s),
                Ok(MetaResult::ToggleExpanded | MetaResult::ToggleTiming) => Ok(String::new()),
                Err(e) => Err(e),
            },
            None => runner.run(sql, mode, args.tuples_only).await,
        };
        match result {
            Ok(out) => print!("{}", out),
            Err(e) => {
                eprintln!("ERROR: {:#}", e);
                failed = true;
                if args.on_error_stop() {
                    return EXIT_SCRIPT_ERROR;
                }
            }
        }
    }
    if failed {
        1
    } else {
        0
    }
}
