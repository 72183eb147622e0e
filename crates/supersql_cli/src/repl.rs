use anyhow::Result;
use rustyline::error::ReadlineError;
use supersql_client::Connection;
use tracing::debug;

use crate::args::Args;
use crate::history::{worth_recording, CommandHistory};
use crate::meta::{execute_meta, parse_meta, MetaResult};
use crate::runner::StatementRunner;
use crate::splitter::{is_complete, split_statements};
use crate::timing::TimingState;

pub async fn run_repl(conn: &Connection, args: &Args) -> Result<()> {
    let history = CommandHistory::locate();
    let mut rl = history.editor()?;
    history.restore(&mut rl);
    let mut runner = StatementRunner::new(conn)?;

    let mut expanded = args.expanded;
    let mut timing = TimingState::default();
    let mut buffer = String::new();
    let descriptor = conn.descriptor();

    println!(
        "ssql v{} (client API {}), connected to {}",
        env!("CARGO_PKG_VERSION"),
        supersql_client::API_LEVEL,
        descriptor
    );
    println!("Type \\? for help, \\q to quit.");

    loop {
        let prompt = if buffer.is_empty() {
            format!("ssql ({})> ", descriptor.schema())
        } else {
            "ssql ...> ".to_string()
        };

        let line = match rl.readline(&prompt) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) => {
                if !buffer.is_empty() {
                    println!("(buffer cleared)");
                    buffer.clear();
                }
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if worth_recording(&line) {
            let _ = rl.add_history_entry(line.as_str());
        }

        if buffer.is_empty() {
            if let Some(cmd) = parse_meta(trimmed) {
                let timer = timing.maybe_start();
                match execute_meta(&cmd, &runner).await {
                    Ok(MetaResult::Quit) => break,
                    Ok(MetaResult::Output(s)) => print!("{}", s),
                    Ok(MetaResult::ToggleExpanded) => {
                        expanded = !expanded;
                        println!(
                            "Expanded display is {}.",
                            if expanded { "on" } else { "off" }
                        );
                    }
                    Ok(MetaResult::ToggleTiming) => {
                        let on = timing.toggle();
                        println!("Timing is {}.", if on { "on" } else { "off" });
                        continue;
                    }
                    Err(e) => eprintln!("ERROR: {:#}", e),
                }
                timing.maybe_print(timer);
                continue;
            }
        }

        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(trimmed);

        if !is_complete(&buffer) {
            continue;
        }
        let statements = split_statements(&buffer);
        buffer.clear();

        let mode = args.output_mode(expanded);
        for sql in statements {
            debug!("REPL execute: {}", sql);
            let timer = timing.maybe_start();
            match runner.run(&sql, mode, args.tuples_only).await {
                Ok(out) => print!("{}", out),
                Err(e) => eprintln!("ERROR: {:#}", e),
            }
            timing.maybe_print(timer);
        }
    }

    runner.close().await;
    history.persist(&mut rl);
    Ok(())
}
