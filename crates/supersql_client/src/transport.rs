//! The seam between a session and the engine.
//!
//! A `Connector` opens one `EngineTransport` per submitted statement; the
//! transport is that statement's engine-side resource and is released
//! exactly once by its owning session.

use async_trait::async_trait;
use supersql_protocol::{Param, QueryResults};

use crate::config::ClientConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{ClientResult, EngineFault};

/// A statement as handed to the engine, parameters already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRequest {
    pub sql: String,
    pub catalog: String,
    pub schema: String,
    pub session_params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRequest {
    Submit(StatementRequest),
    Fetch { query_id: String, token: String },
}

/// What the engine answered to the request in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    Page(QueryResults),
    Fault(EngineFault),
}

/// One statement's connection to the engine.
///
/// `send` and `receive` are split so a caller can drop a `receive` future
/// (timeout, task cancellation) and later call `receive` again for the same
/// request without re-sending it. Implementations must make both
/// cancel-safe: a dropped `send` either queued the request or did not, and a
/// dropped `receive` loses no reply bytes.
#[async_trait]
pub trait EngineTransport: Send {
    async fn send(&mut self, request: EngineRequest) -> ClientResult<()>;

    async fn receive(&mut self) -> ClientResult<EngineReply>;

    /// Release the engine-side statement. `query_id` is set when the
    /// statement may still be running and should be cancelled first.
    async fn release(&mut self, query_id: Option<&str>) -> ClientResult<()>;
}

/// Factory for transports; shared by every session of a connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        config: &ClientConfig,
    ) -> ClientResult<Box<dyn EngineTransport>>;
}
