//! Connection handle and cursors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::column::{ColumnDescription, ColumnDescriptor};
use crate::config::ClientConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{ClientError, ClientResult};
use crate::introspect::SchemaIntrospector;
use crate::params::Params;
use crate::registry::TypeRegistry;
use crate::session::{Session, SessionState};
use crate::stream::{ResultStream, Row};
use crate::tcp::TcpConnector;
use crate::transport::Connector;

/// Handle to an engine. Opening one does no I/O; each cursor acquires its
/// own engine resource when it executes. Clones share the closed flag.
#[derive(Clone)]
pub struct Connection {
    descriptor: Arc<ConnectionDescriptor>,
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    registry: &'static TypeRegistry,
    open: Arc<AtomicBool>,
}

impl Connection {
    /// Handle over TCP with default configuration.
    pub fn connect(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            config: Arc::new(ClientConfig::default()),
            connector: Arc::new(TcpConnector),
            registry: TypeRegistry::global(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Parse `supersql://host[:port][/schema]?k=v` and connect.
    pub fn open(address: &str) -> ClientResult<Self> {
        Ok(Self::connect(ConnectionDescriptor::parse(address)?))
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Route sessions through another connector, e.g. an in-process engine.
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A fresh session bound to this connection.
    pub fn session(&self) -> ClientResult<Session> {
        if self.is_closed() {
            return Err(ClientError::InvalidState {
                operation: "open a cursor",
                state: SessionState::Closed,
            });
        }
        Ok(Session::new(
            self.descriptor.clone(),
            self.config.clone(),
            self.connector.clone(),
            self.registry,
            self.open.clone(),
        ))
    }

    pub fn cursor(&self) -> ClientResult<Cursor> {
        Ok(Cursor {
            session: self.session()?,
            arraysize: self.config.arraysize,
            describe_timeout: self.config.describe_timeout(),
        })
    }

    pub fn introspector(&self) -> SchemaIntrospector {
        SchemaIntrospector::new(self.clone())
    }

    /// Statements auto-commit; nothing to do.
    pub fn commit(&self) -> ClientResult<()> {
        Ok(())
    }

    pub fn rollback(&self) -> ClientResult<()> {
        Err(ClientError::Unsupported(
            "the engine does not support transactions".to_string(),
        ))
    }

    /// Close the handle. Finished cursors keep their buffered rows; running
    /// ones fail their next fetch. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("Connection to {} closed", self.descriptor);
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("descriptor", &self.descriptor.to_string())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Portable cursor over one session.
#[derive(Debug)]
pub struct Cursor {
    session: Session,
    arraysize: usize,
    describe_timeout: Duration,
}

impl Cursor {
    /// Substitute `parameters` into `sql` and submit it. Any previous result
    /// of this cursor is discarded.
    pub async fn execute(&mut self, sql: &str, parameters: Option<&Params>) -> ClientResult<()> {
        self.session.submit(sql, parameters).await
    }

    /// Result column descriptions, waiting until the engine reports them.
    /// `None` before `execute` and for statements without a result set.
    pub async fn description(&mut self) -> ClientResult<Option<Vec<ColumnDescription>>> {
        if self.session.state() == SessionState::Idle {
            return Ok(None);
        }
        let columns = self.session.describe(self.describe_timeout).await?;
        let registry = self.session.registry();
        Ok(columns.map(|cols| {
            cols.iter()
                .map(|c| ColumnDescription::from_descriptor(c, registry))
                .collect()
        }))
    }

    /// Column metadata as already received, without waiting.
    pub fn columns(&self) -> Option<&[ColumnDescriptor]> {
        self.session.columns().map(|c| &c[..])
    }

    pub async fn fetchone(&mut self) -> ClientResult<Option<Row>> {
        ResultStream::new(&mut self.session).next().await
    }

    /// Up to `size` rows, `arraysize` when not given.
    pub async fn fetchmany(&mut self, size: Option<usize>) -> ClientResult<Vec<Row>> {
        let n = size.unwrap_or(self.arraysize);
        ResultStream::new(&mut self.session).next_batch(n).await
    }

    /// Every remaining row; polls until the statement finishes.
    pub async fn fetchall(&mut self) -> ClientResult<Vec<Row>> {
        ResultStream::new(&mut self.session).collect_all().await
    }

    /// Rows delivered so far, `-1` before any statement ran.
    pub fn rowcount(&self) -> i64 {
        match self.session.state() {
            SessionState::Idle => -1,
            _ => self.session.rows_delivered() as i64,
        }
    }

    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, arraysize: usize) -> ClientResult<()> {
        if arraysize == 0 {
            return Err(ClientError::InvalidArgument(
                "arraysize must be at least 1".to_string(),
            ));
        }
        self.arraysize = arraysize;
        Ok(())
    }

    pub fn set_describe_timeout(&mut self, timeout: Duration) {
        self.describe_timeout = timeout;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Release the engine resource. Idempotent.
    pub async fn close(&mut self) {
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{MemoryEngine, Script};
    use crate::registry::LogicalType;
    use crate::value::Value;

    fn fast_config() -> ClientConfig {
        ClientConfig {
            poll_interval_ms: 1,
            ..ClientConfig::default()
        }
    }

    fn memory_connection(engine: &MemoryEngine) -> Connection {
        Connection::connect(ConnectionDescriptor::new("mem"))
            .with_config(fast_config())
            .with_connector(engine.clone())
    }

    #[test]
    fn test_open_parses_address() {
        let conn = Connection::open("supersql://engine:9000/web").unwrap();
        assert_eq!(conn.descriptor().port(), 9000);
        assert_eq!(conn.descriptor().schema(), "web");
        assert!(Connection::open("http://engine").is_err());
    }

    #[test]
    fn test_commit_and_rollback() {
        let conn = Connection::open("supersql://engine").unwrap();
        assert!(conn.commit().is_ok());
        assert_eq!(conn.rollback().unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_cursor_lifecycle() {
        let engine = MemoryEngine::new();
        engine.script(
            "SELECT id FROM t",
            Script::new()
                .column("id", LogicalType::Long)
                .batch(vec![vec![Value::Long(1)], vec![Value::Long(2)]])
                .batch(vec![vec![Value::Long(3)]]),
        );
        let conn = memory_connection(&engine);
        let mut cur = conn.cursor().unwrap();
        assert_eq!(cur.rowcount(), -1);
        assert!(cur.description().await.unwrap().is_none());

        cur.execute("SELECT id FROM t", None).await.unwrap();
        let desc = cur.description().await.unwrap().unwrap();
        assert_eq!(desc[0].name, "id");
        assert_eq!(desc[0].type_code, "BIGINT");

        let first = cur.fetchone().await.unwrap().unwrap();
        assert_eq!(first.get(0), Some(&Value::Long(1)));
        cur.set_arraysize(5).unwrap();
        let rest = cur.fetchmany(None).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(cur.rowcount(), 3);
        assert!(cur.fetchone().await.unwrap().is_none());

        cur.close().await;
        assert_eq!(
            cur.fetchone().await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_cursors() {
        let conn = memory_connection(&MemoryEngine::new());
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert_eq!(conn.cursor().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_parameters_substituted_before_submit() {
        let engine = MemoryEngine::new();
        engine.script(
            "SELECT * FROM t WHERE name = 'O''Brien'",
            Script::new().column("name", LogicalType::Varchar),
        );
        let conn = memory_connection(&engine);
        let mut cur = conn.cursor().unwrap();
        let params = Params::positional(["O'Brien"]);
        cur.execute("SELECT * FROM t WHERE name = %s", Some(&params))
            .await
            .unwrap();
        assert!(cur.fetchall().await.unwrap().is_empty());
        assert_eq!(
            engine.stats().statements,
            vec!["SELECT * FROM t WHERE name = 'O''Brien'".to_string()]
        );
    }
}
