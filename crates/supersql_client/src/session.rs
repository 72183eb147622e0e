//! Statement session state machine.
//!
//! Lifecycle: Idle → Running → (Finished | Error), and any state → Closed.
//! Re-submitting from Finished or Error resets to Idle first.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use supersql_protocol::{Param, QueryResults, QueryStats, RawRow};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::column::ColumnDescriptor;
use crate::config::ClientConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{classify_engine_error, ClientError, ClientResult};
use crate::params::{self, Params};
use crate::registry::TypeRegistry;
use crate::transport::{Connector, EngineReply, EngineRequest, EngineTransport, StatementRequest};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Finished,
    Error,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Finished => "finished",
            SessionState::Error => "failed",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Outcome of a non-blocking row fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFetch<T> {
    Row(T),
    /// Nothing buffered, but the statement is still running.
    Pending,
    /// Nothing buffered and nothing more will arrive.
    Done,
}

static SESSION_ID_SEQ: AtomicU64 = AtomicU64::new(1);

/// One statement's execution lifecycle. Not shareable across tasks; owned by
/// whoever created it.
pub struct Session {
    id: u64,
    descriptor: Arc<ConnectionDescriptor>,
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    registry: &'static TypeRegistry,
    connection_open: Arc<AtomicBool>,
    state: SessionState,
    sql: Option<String>,
    query_id: Option<String>,
    next_token: Option<String>,
    columns: Option<Arc<[ColumnDescriptor]>>,
    buffer: VecDeque<RawRow>,
    error: Option<ClientError>,
    transport: Option<Box<dyn EngineTransport>>,
    awaiting_reply: bool,
    properties: BTreeMap<String, String>,
    stats: QueryStats,
    rows_delivered: u64,
}

impl Session {
    pub(crate) fn new(
        descriptor: Arc<ConnectionDescriptor>,
        config: Arc<ClientConfig>,
        connector: Arc<dyn Connector>,
        registry: &'static TypeRegistry,
        connection_open: Arc<AtomicBool>,
    ) -> Self {
        let mut properties = config.session_properties.clone();
        properties.extend(
            descriptor
                .options()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self {
            id: SESSION_ID_SEQ.fetch_add(1, Ordering::Relaxed),
            descriptor,
            config,
            connector,
            registry,
            connection_open,
            state: SessionState::Idle,
            sql: None,
            query_id: None,
            next_token: None,
            columns: None,
            buffer: VecDeque::new(),
            error: None,
            transport: None,
            awaiting_reply: false,
            properties,
            stats: QueryStats::default(),
            rows_delivered: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Statement text as sent, after parameter substitution.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Engine-assigned query id, once the engine has acknowledged.
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// Progress reported with the most recent page.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Terminal failure, set in the `Error` state.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    /// Column metadata if already received. Never waits; see `describe`.
    pub fn columns(&self) -> Option<&Arc<[ColumnDescriptor]>> {
        self.columns.as_ref()
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    pub fn rows_delivered(&self) -> u64 {
        self.rows_delivered
    }

    /// Session properties sent with the next statement.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Overlay properties carried over from another session.
    pub fn inherit_properties(&mut self, properties: &BTreeMap<String, String>) {
        self.properties
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn registry(&self) -> &'static TypeRegistry {
        self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn invalid(&self, operation: &'static str) -> ClientError {
        ClientError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn ensure_connection_open(&self, operation: &'static str) -> ClientResult<()> {
        if self.connection_open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    /// Record a fatal error. Only a running statement moves to `Error`.
    pub(crate) fn fail(&mut self, err: ClientError) -> ClientError {
        if self.state == SessionState::Running {
            warn!(session = self.id, query_id = ?self.query_id, "statement failed: {}", err);
            self.state = SessionState::Error;
            self.error = Some(err.duplicate());
        }
        err
    }

    /// Record a row that could not be decoded. Rows behind it are discarded
    /// and a running statement is cancelled, so every later fetch reports the
    /// failure instead of continuing past the lost row.
    pub(crate) async fn fail_decode(&mut self, err: ClientError) -> ClientError {
        match self.state {
            SessionState::Running => self.release_transport(true).await,
            SessionState::Finished => {}
            _ => return err,
        }
        warn!(
            session = self.id,
            query_id = ?self.query_id,
            discarded = self.buffer.len(),
            "result decoding failed: {}",
            err
        );
        self.buffer.clear();
        self.state = SessionState::Error;
        self.error = Some(err.duplicate());
        err
    }

    /// Submit a statement. Legal from `Idle`, `Finished` and `Error`.
    ///
    /// The engine's acknowledgement is absorbed before returning, so a short
    /// statement may already be `Finished` (or `Error`) afterwards.
    pub async fn submit(&mut self, sql: &str, params: Option<&Params>) -> ClientResult<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Finished | SessionState::Error => self.reset().await,
            SessionState::Running | SessionState::Closed => return Err(self.invalid("submit")),
        }
        self.ensure_connection_open("submit after connection close")?;

        let sql = params::substitute(sql, params)?;
        let request = StatementRequest {
            sql: sql.clone(),
            catalog: self.descriptor.catalog().unwrap_or_default().to_string(),
            schema: self.descriptor.schema().to_string(),
            session_params: self
                .properties
                .iter()
                .map(|(k, v)| Param::new(k.clone(), v.clone()))
                .collect(),
        };

        let mut transport = self.connector.open(&self.descriptor, &self.config).await?;
        transport.send(EngineRequest::Submit(request)).await?;

        debug!(session = self.id, "submitted: {}", sql);
        metrics::counter!("supersql_statements_total").increment(1);
        self.transport = Some(transport);
        self.sql = Some(sql);
        self.state = SessionState::Running;
        self.awaiting_reply = true;

        let timeout = self.config.request_timeout();
        self.receive_reply(Instant::now() + timeout, "submit", timeout)
            .await
            .map(|_| ())
    }

    /// Fetch the next page. Only legal while `Running`. Returns the number of
    /// rows the page added to the buffer.
    ///
    /// On timeout the session stays `Running` and the request stays in
    /// flight; the next `poll` picks up its reply.
    pub async fn poll(&mut self, timeout: Duration) -> ClientResult<usize> {
        self.poll_until(Instant::now() + timeout, "poll", timeout)
            .await
    }

    async fn poll_until(
        &mut self,
        deadline: Instant,
        operation: &'static str,
        budget: Duration,
    ) -> ClientResult<usize> {
        if self.state != SessionState::Running {
            return Err(self.invalid(operation));
        }
        self.ensure_connection_open("poll after connection close")?;

        if !self.awaiting_reply {
            let token = match &self.next_token {
                Some(token) => token.clone(),
                None => return Err(self.invalid(operation)),
            };
            let request = EngineRequest::Fetch {
                query_id: self.query_id.clone().unwrap_or_default(),
                token,
            };
            let sent = match self.transport.as_mut() {
                Some(transport) => tokio::time::timeout_at(deadline, transport.send(request)).await,
                None => return Err(self.invalid(operation)),
            };
            match sent {
                Ok(Ok(())) => self.awaiting_reply = true,
                Ok(Err(e)) => return Err(self.fail(e)),
                Err(_) => {
                    return Err(ClientError::Timeout {
                        operation,
                        after: budget,
                    })
                }
            }
        }

        self.receive_reply(deadline, operation, budget).await
    }

    async fn receive_reply(
        &mut self,
        deadline: Instant,
        operation: &'static str,
        budget: Duration,
    ) -> ClientResult<usize> {
        let received = match self.transport.as_mut() {
            Some(transport) => tokio::time::timeout_at(deadline, transport.receive()).await,
            None => return Err(self.invalid(operation)),
        };
        let reply = match received {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => {
                return Err(ClientError::Timeout {
                    operation,
                    after: budget,
                })
            }
        };
        self.awaiting_reply = false;

        let added = self.absorb(reply)?;
        if self.state == SessionState::Finished {
            // the engine has nothing left for this statement
            self.release_transport(false).await;
        }
        Ok(added)
    }

    fn absorb(&mut self, reply: EngineReply) -> ClientResult<usize> {
        let page = match reply {
            EngineReply::Page(page) => page,
            EngineReply::Fault(fault) => {
                metrics::counter!("supersql_engine_failures_total").increment(1);
                return Err(self.fail(classify_engine_error(fault)));
            }
        };
        metrics::counter!("supersql_pages_total").increment(1);

        let QueryResults {
            query_id,
            columns,
            rows,
            next_token,
            stats,
            set_session,
            clear_session,
            ..
        } = page;

        if self.query_id.is_none() && !query_id.is_empty() {
            self.query_id = Some(query_id);
        }
        for p in set_session {
            self.properties.insert(p.key, p.value);
        }
        for key in clear_session {
            self.properties.remove(&key);
        }

        if let Some(metas) = columns {
            match &self.columns {
                None => {
                    let described: Vec<ColumnDescriptor> = metas
                        .iter()
                        .map(|m| ColumnDescriptor::from_meta(m, self.registry))
                        .collect();
                    self.columns = Some(described.into());
                }
                Some(existing) => {
                    let same = existing.len() == metas.len()
                        && existing.iter().zip(&metas).all(|(c, m)| c.same_shape(m));
                    if !same {
                        return Err(self.fail(corruption("column metadata changed mid-statement")));
                    }
                }
            }
        }

        if !rows.is_empty() {
            let width = match &self.columns {
                Some(columns) => columns.len(),
                None => return Err(self.fail(corruption("rows arrived before column metadata"))),
            };
            if let Some(bad) = rows.iter().find(|r| r.cells.len() != width) {
                let msg = format!("row has {} cells, expected {}", bad.cells.len(), width);
                return Err(self.fail(corruption(&msg)));
            }
        }

        let added = rows.len();
        self.buffer.extend(rows);
        self.stats = stats;
        self.next_token = next_token;
        if self.next_token.is_none() {
            debug!(
                session = self.id,
                query_id = ?self.query_id,
                rows = self.stats.processed_rows,
                "statement finished"
            );
            self.state = SessionState::Finished;
        }
        Ok(added)
    }

    /// Poll once, then back off for the poll interval if the page brought
    /// nothing new. Used by waits that loop until some condition holds.
    pub(crate) async fn advance(
        &mut self,
        deadline: Instant,
        operation: &'static str,
        budget: Duration,
    ) -> ClientResult<()> {
        if Instant::now() >= deadline {
            return Err(ClientError::Timeout {
                operation,
                after: budget,
            });
        }
        let had_columns = self.columns.is_some();
        let added = self.poll_until(deadline, operation, budget).await?;
        let progressed = added > 0 || self.columns.is_some() != had_columns;
        if !progressed && self.state == SessionState::Running {
            let pause = self
                .config
                .poll_interval()
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    /// Column metadata, waiting for the engine to produce it.
    ///
    /// Returns `None` when the statement concluded without metadata.
    pub async fn describe(
        &mut self,
        timeout: Duration,
    ) -> ClientResult<Option<Arc<[ColumnDescriptor]>>> {
        if matches!(self.state, SessionState::Idle | SessionState::Closed) {
            return Err(self.invalid("describe"));
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(columns) = &self.columns {
                return Ok(Some(columns.clone()));
            }
            if self.state != SessionState::Running {
                return Ok(None);
            }
            self.advance(deadline, "describe", timeout).await?;
        }
    }

    /// Take one buffered row without contacting the engine.
    pub fn next_raw_row(&mut self) -> ClientResult<RowFetch<RawRow>> {
        if matches!(self.state, SessionState::Idle | SessionState::Closed) {
            return Err(self.invalid("fetch"));
        }
        if self.state == SessionState::Running {
            self.ensure_connection_open("fetch after connection close")?;
        }
        if let Some(row) = self.buffer.pop_front() {
            self.rows_delivered += 1;
            return Ok(RowFetch::Row(row));
        }
        match self.state {
            SessionState::Running => Ok(RowFetch::Pending),
            SessionState::Finished => Ok(RowFetch::Done),
            _ => Err(self
                .error
                .as_ref()
                .map(ClientError::duplicate)
                .unwrap_or_else(|| self.invalid("fetch"))),
        }
    }

    /// Release the engine resource and end the session. Idempotent; safe
    /// after an error.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let still_running = self.state == SessionState::Running;
        self.release_transport(still_running).await;
        self.buffer.clear();
        self.state = SessionState::Closed;
        debug!(session = self.id, "closed");
    }

    async fn reset(&mut self) {
        self.release_transport(false).await;
        self.state = SessionState::Idle;
        self.sql = None;
        self.query_id = None;
        self.next_token = None;
        self.columns = None;
        self.buffer.clear();
        self.error = None;
        self.stats = QueryStats::default();
        self.rows_delivered = 0;
    }

    async fn release_transport(&mut self, cancel_running: bool) {
        let mut transport = match self.transport.take() {
            Some(t) => t,
            None => return,
        };
        self.awaiting_reply = false;
        let query_id = if cancel_running {
            self.query_id.clone()
        } else {
            None
        };
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, transport.release(query_id.as_deref())).await {
            Ok(Ok(())) => debug!(session = self.id, cancelled = cancel_running, "released engine resource"),
            Ok(Err(e)) => warn!(session = self.id, "releasing engine resource failed: {}", e),
            Err(_) => warn!(session = self.id, "releasing engine resource timed out after {:?}", timeout),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transport.is_some() {
            debug!(
                session = self.id,
                state = %self.state,
                "session dropped without close; engine resource released by transport drop"
            );
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("query_id", &self.query_id)
            .field("buffered_rows", &self.buffer.len())
            .finish()
    }
}

fn corruption(msg: &str) -> ClientError {
    ClientError::Transport(supersql_protocol::ProtocolError::Corruption(msg.to_string()))
}
