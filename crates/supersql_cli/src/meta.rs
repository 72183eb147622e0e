use anyhow::Result;
use supersql_client::LogicalType;

use crate::runner::StatementRunner;

/// Result of parsing a meta-command line.
#[derive(Debug, PartialEq, Eq)]
pub enum MetaCommand {
    Quit,
    Help,
    ConnInfo,
    ListSchemas,
    ListTables(Option<String>),
    DescribeTable {
        schema: Option<String>,
        table: String,
    },
    ToggleExpanded,
    ToggleTiming,
    Unknown(String),
}

/// What the caller should do after a meta-command.
#[derive(Debug, PartialEq, Eq)]
pub enum MetaResult {
    Quit,
    Output(String),
    ToggleExpanded,
    ToggleTiming,
}

/// Try to parse a line as a meta-command. Returns None if it's not one.
pub fn parse_meta(line: &str) -> Option<MetaCommand> {
    let rest = line.trim().strip_prefix('\\')?.trim();
    let (cmd, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(c, a)| (c, a.trim()))
        .unwrap_or((rest, ""));
    let arg = (!arg.is_empty()).then(|| arg.to_string());

    Some(match (cmd, arg) {
        ("q" | "quit", _) => MetaCommand::Quit,
        ("?" | "help", _) => MetaCommand::Help,
        ("conninfo", _) => MetaCommand::ConnInfo,
        ("dn", _) => MetaCommand::ListSchemas,
        ("dt", schema) => MetaCommand::ListTables(schema),
        ("d", None) => MetaCommand::ListTables(None),
        ("d", Some(target)) => match target.split_once('.') {
            Some((schema, table)) => MetaCommand::DescribeTable {
                schema: Some(schema.to_string()),
                table: table.to_string(),
            },
            None => MetaCommand::DescribeTable {
                schema: None,
                table: target,
            },
        },
        ("x", _) => MetaCommand::ToggleExpanded,
        ("timing", _) => MetaCommand::ToggleTiming,
        (other, _) => MetaCommand::Unknown(format!("\\{}", other)),
    })
}

const HELP: &str = "\
General
  \\q                    quit ssql
  \\?                    show this help

Connection
  \\conninfo             display connection information

Informational
  \\dn                   list schemas
  \\dt [SCHEMA]          list tables
  \\d [SCHEMA.]TABLE     describe table columns

Formatting
  \\x                    toggle expanded output mode
  \\timing               toggle execution timing
";

pub async fn execute_meta(cmd: &MetaCommand, runner: &StatementRunner) -> Result<MetaResult> {
    match cmd {
        MetaCommand::Quit => Ok(MetaResult::Quit),
        MetaCommand::Help => Ok(MetaResult::Output(HELP.to_string())),
        MetaCommand::ConnInfo => {
            let conn = runner.connection();
            let d = conn.descriptor();
            Ok(MetaResult::Output(format!(
                "Connected to {} as user \"{}\" (schema \"{}\").\n",
                d,
                conn.config().user,
                d.schema()
            )))
        }
        MetaCommand::ListSchemas => {
            let schemas = runner.introspector().list_schemas().await?;
            Ok(MetaResult::Output(name_list("Schema", &schemas)))
        }
        MetaCommand::ListTables(schema) => {
            let tables = runner.introspector().list_tables(schema.as_deref()).await?;
            if tables.is_empty() {
                return Ok(MetaResult::Output("No relations found.\n".to_string()));
            }
            Ok(MetaResult::Output(name_list("Table", &tables)))
        }
        MetaCommand::DescribeTable { schema, table } => {
            let columns = runner
                .introspector()
                .describe_columns(table, schema.as_deref())
                .await?;
            let mut out = format!("{:<30} {:<24} {}\n", "Column", "Type", "Comment");
            out.push_str(&"-".repeat(70));
            out.push('\n');
            for c in &columns {
                let ty = if c.logical_type == LogicalType::Unknown {
                    format!("{} (?)", c.raw_type)
                } else {
                    c.raw_type.clone()
                };
                out.push_str(&format!(
                    "{:<30} {:<24} {}\n",
                    c.name,
                    ty,
                    c.comment.as_deref().unwrap_or("")
                ));
            }
            Ok(MetaResult::Output(out))
        }
        MetaCommand::ToggleExpanded => Ok(MetaResult::ToggleExpanded),
        MetaCommand::ToggleTiming => Ok(MetaResult::ToggleTiming),
        MetaCommand::Unknown(c) => Ok(MetaResult::Output(format!(
            "Invalid command {}. Try \\? for help.\n",
            c
        ))),
    }
}

fn name_list(header: &str, names: &[String]) -> String {
    let mut out = format!("{}\n{}\n", header, "-".repeat(header.len().max(20)));
    for n in names {
        out.push_str(n);
        out.push('\n');
    }
    out
}
