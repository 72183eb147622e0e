//! In-process engine with scripted results.
//!
//! Statements are matched on their exact text after parameter substitution.
//! Each scripted statement replies with an acknowledgement page carrying no
//! metadata, then one page per batch, the last without a continuation token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use supersql_protocol::{ColumnMeta, Param, ProtocolError, QueryResults, QueryStats, RawRow};

use crate::config::ClientConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{ClientError, ClientResult, EngineFault};
use crate::registry::{LogicalType, TypeRegistry};
use crate::transport::{Connector, EngineReply, EngineRequest, EngineTransport};
use crate::value::{encode_cell, Value};

pub const UNSCRIPTED_STATEMENT: &str = "UNSCRIPTED_STATEMENT";

/// Column metadata for a logical type, as the engine would report it.
pub fn column(name: &str, logical: LogicalType) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        type_id: TypeRegistry::global().wire_type_of(logical),
        type_name: logical.sql_name().to_string(),
    }
}

/// Encode a row of values into wire cells.
pub fn row(values: Vec<Value>) -> RawRow {
    RawRow::new(values.iter().map(encode_cell).collect())
}

/// Canned response for one statement.
#[derive(Debug, Clone, Default)]
pub struct Script {
    columns: Vec<ColumnMeta>,
    batches: Vec<Vec<RawRow>>,
    fault: Option<EngineFault>,
    without_metadata: bool,
    stall_after: Option<usize>,
    set_session: Vec<Param>,
    clear_session: Vec<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, logical: LogicalType) -> Self {
        self.columns.push(column(name, logical));
        self
    }

    pub fn raw_column(mut self, meta: ColumnMeta) -> Self {
        self.columns.push(meta);
        self
    }

    pub fn batch(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.batches.push(rows.into_iter().map(row).collect());
        self
    }

    pub fn raw_batch(mut self, rows: Vec<RawRow>) -> Self {
        self.batches.push(rows);
        self
    }

    /// Fail once every batch has been delivered; with no batches the
    /// statement is rejected on submission.
    pub fn fail_with(mut self, name: &str, message: &str) -> Self {
        self.fault = Some(EngineFault {
            code: supersql_protocol::ERR_INTERNAL_ERROR,
            name: name.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Complete without ever reporting column metadata.
    pub fn without_metadata(mut self) -> Self {
        self.without_metadata = true;
        self
    }

    /// Deliver `pages` replies (the acknowledgement included), then never
    /// answer again.
    pub fn stall_after(mut self, pages: usize) -> Self {
        self.stall_after = Some(pages);
        self
    }

    pub fn set_session(mut self, key: &str, value: &str) -> Self {
        self.set_session.push(Param::new(key, value));
        self
    }

    pub fn clear_session(mut self, key: &str) -> Self {
        self.clear_session.push(key.to_string());
        self
    }

    fn replies(&self, query_id: &str) -> Vec<EngineReply> {
        let page = |columns: Option<Vec<ColumnMeta>>, rows: Vec<RawRow>, processed: u64| QueryResults {
            query_id: query_id.to_string(),
            columns,
            rows,
            stats: QueryStats {
                state: "RUNNING".to_string(),
                processed_rows: processed,
                elapsed_ms: 0,
            },
            ..Default::default()
        };

        if self.batches.is_empty() {
            if let Some(fault) = &self.fault {
                // rejected outright
                return vec![EngineReply::Fault(fault.clone())];
            }
        }

        let mut replies = vec![EngineReply::Page(page(None, Vec::new(), 0))];
        let mut batches = self.batches.clone();
        if batches.is_empty() && !self.without_metadata {
            batches.push(Vec::new());
        }
        let mut processed = 0u64;
        for rows in batches {
            processed += rows.len() as u64;
            let columns = (!self.without_metadata).then(|| self.columns.clone());
            replies.push(EngineReply::Page(page(columns, rows, processed)));
        }
        if let Some(fault) = &self.fault {
            replies.push(EngineReply::Fault(fault.clone()));
        }

        // chain the pages: every page but the last points at its successor
        let count = replies.len();
        for (i, reply) in replies.iter_mut().enumerate() {
            if let EngineReply::Page(p) = reply {
                if i + 1 < count {
                    p.next_token = Some((i + 1).to_string());
                } else {
                    p.stats.state = "FINISHED".to_string();
                    p.set_session = self.set_session.clone();
                    p.clear_session = self.clear_session.clone();
                }
            }
        }
        replies
    }
}

/// What the engine has seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub opened: usize,
    pub released: usize,
    /// Query ids released while still running.
    pub cancelled: Vec<String>,
    /// Statement texts in submission order.
    pub statements: Vec<String>,
    /// Session parameters sent with the most recent statement.
    pub last_session_params: Vec<Param>,
}

#[derive(Default)]
struct EngineInner {
    scripts: Mutex<HashMap<String, Script>>,
    stats: Mutex<EngineStats>,
    query_seq: AtomicU64,
}

/// Scripted engine. Cloning shares the scripts and statistics.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response for a statement text. Replaces any earlier one.
    pub fn script(&self, sql: &str, script: Script) -> &Self {
        self.inner.scripts.lock().insert(sql.to_string(), script);
        self
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats.lock().clone()
    }

    fn reply_plan(&self, sql: &str) -> (String, Vec<EngineReply>, Option<usize>) {
        let n = self.inner.query_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let query_id = format!("mem_{:06}", n);
        match self.inner.scripts.lock().get(sql) {
            Some(script) => {
                let replies = script.replies(&query_id);
                (query_id, replies, script.stall_after)
            }
            None => {
                let fault = EngineFault {
                    code: supersql_protocol::ERR_INVALID_REQUEST,
                    name: UNSCRIPTED_STATEMENT.to_string(),
                    message: format!("no script for statement: {}", sql),
                };
                (query_id, vec![EngineReply::Fault(fault)], None)
            }
        }
    }
}

#[async_trait]
impl Connector for MemoryEngine {
    async fn open(
        &self,
        _descriptor: &ConnectionDescriptor,
        _config: &ClientConfig,
    ) -> ClientResult<Box<dyn EngineTransport>> {
        self.inner.stats.lock().opened += 1;
        Ok(Box::new(MemoryTransport {
            engine: self.clone(),
            query_id: String::new(),
            replies: Vec::new(),
            stall_after: None,
            pending: None,
        }))
    }
}

struct MemoryTransport {
    engine: MemoryEngine,
    query_id: String,
    replies: Vec<EngineReply>,
    stall_after: Option<usize>,
    pending: Option<usize>,
}

#[async_trait]
impl EngineTransport for MemoryTransport {
    async fn send(&mut self, request: EngineRequest) -> ClientResult<()> {
        if self.pending.is_some() {
            return Err(protocol_violation("request sent while a reply is outstanding"));
        }
        match request {
            EngineRequest::Submit(statement) => {
                {
                    let mut stats = self.engine.inner.stats.lock();
                    stats.statements.push(statement.sql.clone());
                    stats.last_session_params = statement.session_params.clone();
                }
                let (query_id, replies, stall_after) = self.engine.reply_plan(&statement.sql);
                self.query_id = query_id;
                self.replies = replies;
                self.stall_after = stall_after;
                self.pending = Some(0);
            }
            EngineRequest::Fetch { query_id, token } => {
                if query_id != self.query_id {
                    return Err(protocol_violation(&format!("unknown query id '{}'", query_id)));
                }
                let index = token
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < self.replies.len())
                    .ok_or_else(|| protocol_violation(&format!("unknown token '{}'", token)))?;
                self.pending = Some(index);
            }
        }
        Ok(())
    }

    async fn receive(&mut self) -> ClientResult<EngineReply> {
        let index = match self.pending {
            Some(i) => i,
            None => return Err(protocol_violation("receive without a request")),
        };
        if self.stall_after.is_some_and(|n| index >= n) {
            std::future::pending::<()>().await;
        }
        self.pending = None;
        Ok(self.replies[index].clone())
    }

    async fn release(&mut self, query_id: Option<&str>) -> ClientResult<()> {
        let mut stats = self.engine.inner.stats.lock();
        stats.released += 1;
        if let Some(id) = query_id {
            stats.cancelled.push(id.to_string());
        }
        Ok(())
    }
}

fn protocol_violation(msg: &str) -> ClientError {
    ClientError::Transport(ProtocolError::Corruption(msg.to_string()))
}
