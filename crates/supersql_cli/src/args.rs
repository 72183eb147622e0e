use anyhow::{Context, Result};
use clap::Parser;
use supersql_client::ConnectionDescriptor;

use crate::format::OutputMode;

/// ssql, the supersql interactive SQL shell
#[derive(Debug, Parser)]
#[command(
    name = "ssql",
    about = "Interactive SQL shell for the supersql engine",
    version,
    disable_help_flag = true
)]
pub struct Args {
    /// Print help (-h is the host)
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Full address, e.g. supersql://engine:7911/web?source=ssql
    #[arg(long, env = "SUPERSQL_URL", conflicts_with_all = ["host", "port"])]
    pub url: Option<String>,

    /// Engine host
    #[arg(short = 'h', long, env = "SUPERSQL_HOST", default_value = "localhost")]
    pub host: String,

    /// Engine port
    #[arg(short = 'p', long, env = "SUPERSQL_PORT", default_value_t = 7911)]
    pub port: u16,

    /// Catalog
    #[arg(long, env = "SUPERSQL_CATALOG")]
    pub catalog: Option<String>,

    /// Default schema
    #[arg(short = 's', long, env = "SUPERSQL_SCHEMA")]
    pub schema: Option<String>,

    /// User reported to the engine
    #[arg(short = 'U', long, env = "SUPERSQL_USER")]
    pub user: Option<String>,

    /// Client config file (TOML)
    #[arg(long, env = "SUPERSQL_CONFIG", default_value = "supersql.toml")]
    pub config: String,

    /// Session property sent with every statement (repeatable)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Execute a single command and exit
    #[arg(short = 'c', long)]
    pub command: Option<String>,

    /// Execute statements from a file and exit
    #[arg(short = 'f', long)]
    pub file: Option<String>,

    /// Tuples only: suppress headers and footers
    #[arg(short = 't', long)]
    pub tuples_only: bool,

    /// Expanded (vertical) output mode
    #[arg(long)]
    pub expanded: bool,

    /// CSV output mode
    #[arg(long)]
    pub csv: bool,

    /// JSON output mode
    #[arg(long)]
    pub json: bool,

    /// Set a variable (e.g. -v ON_ERROR_STOP=1)
    #[arg(short = 'v', long = "variable", value_name = "NAME=VALUE")]
    pub variables: Vec<String>,
}

impl Args {
    pub fn on_error_stop(&self) -> bool {
        self.variables.iter().any(|v| {
            v.eq_ignore_ascii_case("ON_ERROR_STOP=1") || v.eq_ignore_ascii_case("ON_ERROR_STOP=true")
        })
    }

    pub fn output_mode(&self, expanded: bool) -> OutputMode {
        if self.csv {
            OutputMode::Csv
        } else if self.json {
            OutputMode::Json
        } else if expanded {
            OutputMode::Expanded
        } else if self.tuples_only {
            OutputMode::TuplesOnly
        } else {
            OutputMode::Table
        }
    }

    /// Where to connect: `--url` if given, else the individual flags.
    pub fn descriptor(&self) -> Result<ConnectionDescriptor> {
        let mut d = match &self.url {
            Some(url) => ConnectionDescriptor::parse(url)
                .with_context(|| format!("Invalid --url '{}'", url))?,
            None => ConnectionDescriptor::new(self.host.clone()).with_port(self.port),
        };
        if let Some(catalog) = &self.catalog {
            d = d.with_catalog(catalog.clone());
        }
        if let Some(schema) = &self.schema {
            d = d.with_schema(schema.clone());
        }
        for opt in &self.options {
            let (k, v) = opt
                .split_once('=')
                .with_context(|| format!("Option '{}' is not KEY=VALUE", opt))?;
            d = d.with_option(k.trim(), v.trim());
        }
        Ok(d)
    }
}
