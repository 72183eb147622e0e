use std::collections::BTreeMap;

use anyhow::Result;
use supersql_client::{Connection, Cursor, SchemaIntrospector, SessionState};
use tracing::debug;

use crate::format::{render, OutputMode, ResultSet};

/// Runs a script or REPL session on one long-lived cursor, so session
/// properties set by one statement apply to the ones after it.
pub struct StatementRunner {
    conn: Connection,
    cursor: Cursor,
}

impl StatementRunner {
    pub fn new(conn: &Connection) -> Result<Self> {
        Ok(Self {
            conn: conn.clone(),
            cursor: conn.cursor()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn session_properties(&self) -> &BTreeMap<String, String> {
        self.cursor.session().properties()
    }

    /// Catalog lookups see the same session properties as statements.
    pub fn introspector(&self) -> SchemaIntrospector {
        self.conn
            .introspector()
            .with_session_properties(self.session_properties().clone())
    }

    /// Execute one statement and render its result.
    /// Returns Err on engine or transport errors.
    pub async fn run(&mut self, sql: &str, mode: OutputMode, tuples_only: bool) -> Result<String> {
        debug!("run_statement: {}", sql);
        let out = render_statement(&mut self.cursor, sql, mode, tuples_only).await;
        if out.is_err() && self.cursor.session().state() == SessionState::Running {
            // timed out mid-statement; cancel it and keep the properties
            self.cursor.close().await;
            let mut fresh = self.conn.cursor()?;
            fresh
                .session_mut()
                .inherit_properties(self.cursor.session().properties());
            self.cursor = fresh;
        }
        out
    }

    pub async fn close(mut self) {
        self.cursor.close().await;
    }
}

async fn render_statement(
    cursor: &mut Cursor,
    sql: &str,
    mode: OutputMode,
    tuples_only: bool,
) -> Result<String> {
    cursor.execute(sql, None).await?;
    let Some(description) = cursor.description().await? else {
        return Ok(if tuples_only { String::new() } else { "OK\n".to_string() });
    };
    let rows = cursor.fetchall().await?;
    let columns = description.into_iter().map(|c| c.name).collect();
    Ok(render(&ResultSet::new(columns, rows), mode, tuples_only))
}
