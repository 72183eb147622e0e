//! Engine transport over the binary TCP protocol.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use supersql_protocol::{
    CancelRequest, ClientHello, FetchRequest, Message, ProtocolError, QueryRequest,
    WireCodec, PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR,
};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{classify_engine_error, ClientError, ClientResult, EngineFault};
use crate::transport::{Connector, EngineReply, EngineRequest, EngineTransport};

static REQUEST_ID_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Opens one TCP connection per statement.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        config: &ClientConfig,
    ) -> ClientResult<Box<dyn EngineTransport>> {
        let timeout = config.connect_timeout();
        let transport = tokio::time::timeout(timeout, TcpTransport::connect(descriptor, config))
            .await
            .map_err(|_| ClientError::Timeout {
                operation: "connect",
                after: timeout,
            })??;
        Ok(Box::new(transport))
    }
}

/// A handshaken connection carrying one statement.
pub struct TcpTransport {
    framed: Framed<TcpStream, WireCodec>,
    server_version: String,
}

impl TcpTransport {
    /// Connect and complete the hello exchange.
    pub async fn connect(descriptor: &ConnectionDescriptor, config: &ClientConfig) -> ClientResult<Self> {
        let addr = descriptor.socket_addr();
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, WireCodec);

        framed
            .send(Message::ClientHello(ClientHello {
                version_major: PROTOCOL_VERSION_MAJOR,
                version_minor: PROTOCOL_VERSION_MINOR,
                client_name: config.client_name.clone(),
                catalog: descriptor.catalog().unwrap_or_default().to_string(),
                schema: descriptor.schema().to_string(),
                user: config.user.clone(),
                params: Vec::new(),
            }))
            .await?;

        let hello = match framed.next().await {
            Some(Ok(Message::ServerHello(hello))) => hello,
            Some(Ok(Message::ErrorResponse(e))) => {
                return Err(classify_engine_error(EngineFault::from(e)))
            }
            Some(Ok(other)) => {
                return Err(unexpected(&other, "handshake"));
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(eof("handshake")),
        };
        if hello.version_major != PROTOCOL_VERSION_MAJOR {
            return Err(ProtocolError::UnsupportedVersion {
                major: hello.version_major,
                minor: hello.version_minor,
            }
            .into());
        }
        debug!(
            "Connected to {} (engine {} protocol {}.{})",
            addr, hello.server_version, hello.version_major, hello.version_minor
        );

        Ok(Self {
            framed,
            server_version: hello.server_version,
        })
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }
}

#[async_trait]
impl EngineTransport for TcpTransport {
    async fn send(&mut self, request: EngineRequest) -> ClientResult<()> {
        let msg = match request {
            EngineRequest::Submit(statement) => Message::QueryRequest(QueryRequest {
                request_id: next_request_id(),
                sql: statement.sql,
                catalog: statement.catalog,
                schema: statement.schema,
                session_params: statement.session_params,
            }),
            EngineRequest::Fetch { query_id, token } => Message::FetchRequest(FetchRequest {
                request_id: next_request_id(),
                query_id,
                token,
            }),
        };
        // queued only; `receive` flushes
        self.framed.feed(msg).await?;
        Ok(())
    }

    async fn receive(&mut self) -> ClientResult<EngineReply> {
        self.framed.flush().await?;
        loop {
            match self.framed.next().await {
                Some(Ok(Message::QueryResults(page))) => return Ok(EngineReply::Page(page)),
                Some(Ok(Message::ErrorResponse(e))) => return Ok(EngineReply::Fault(e.into())),
                Some(Ok(Message::Pong)) => continue,
                Some(Ok(other)) => return Err(unexpected(&other, "results")),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(eof("results")),
            }
        }
    }

    async fn release(&mut self, query_id: Option<&str>) -> ClientResult<()> {
        if let Some(query_id) = query_id {
            self.framed
                .send(Message::CancelRequest(CancelRequest {
                    request_id: next_request_id(),
                    query_id: query_id.to_string(),
                }))
                .await?;
            // a reply to an earlier request may still precede the ack
            loop {
                match self.framed.next().await {
                    Some(Ok(Message::CancelAck(_))) | None => break,
                    Some(Ok(Message::QueryResults(_)))
                    | Some(Ok(Message::ErrorResponse(_)))
                    | Some(Ok(Message::Pong)) => continue,
                    Some(Ok(other)) => return Err(unexpected(&other, "cancel acknowledgement")),
                    Some(Err(e)) => {
                        if e.is_retryable() {
                            warn!("Connection lost while cancelling {}: {}", query_id, e);
                        }
                        return Err(e.into());
                    }
                }
            }
        }
        if let Err(e) = self.framed.send(Message::Disconnect).await {
            debug!("Disconnect not delivered: {}", e);
        }
        self.framed.close().await?;
        Ok(())
    }
}

fn unexpected(msg: &Message, during: &str) -> ClientError {
    ProtocolError::Corruption(format!("unexpected {} during {}", msg.name(), during)).into()
}

fn eof(during: &str) -> ClientError {
    ProtocolError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("engine closed the connection during {}", during),
    ))
    .into()
}
