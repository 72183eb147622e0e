#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use supersql_client::memory::{MemoryEngine, Script};
use supersql_client::transport::{
    Connector, EngineReply, EngineRequest, EngineTransport, StatementRequest,
};
use supersql_client::{ClientConfig, Connection, ConnectionDescriptor, LogicalType, Value};
use supersql_protocol::{ErrorResponse, Message, ServerHello, WireCodec, PROTOCOL_VERSION_MAJOR};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub fn fast_config() -> ClientConfig {
    ClientConfig {
        poll_interval_ms: 1,
        ..ClientConfig::default()
    }
}

/// Connection whose sessions run against `engine` in-process.
pub fn memory_connection(engine: &MemoryEngine) -> Connection {
    Connection::connect(ConnectionDescriptor::new("memory"))
        .with_config(fast_config())
        .with_connector(engine.clone())
}

/// `DESCRIBE` output as the engine prints it: three varchar columns.
pub fn describe_script(rows: &[(&str, &str, &str)]) -> Script {
    Script::new()
        .column("col_name", LogicalType::Varchar)
        .column("data_type", LogicalType::Varchar)
        .column("comment", LogicalType::Varchar)
        .batch(
            rows.iter()
                .map(|(n, t, c)| {
                    vec![
                        Value::Varchar(n.to_string()),
                        Value::Varchar(t.to_string()),
                        Value::Varchar(c.to_string()),
                    ]
                })
                .collect(),
        )
}

/// Single varchar column, one row per name.
pub fn names_script(column: &str, names: &[&str]) -> Script {
    Script::new().column(column, LogicalType::Varchar).batch(
        names
            .iter()
            .map(|n| vec![Value::Varchar(n.to_string())])
            .collect(),
    )
}

/// Serve the wire protocol on 127.0.0.1, answering from `engine`.
/// Returns the bound port.
pub async fn spawn_tcp_engine(engine: MemoryEngine) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, engine.clone()));
        }
    });
    port
}

async fn serve(stream: TcpStream, engine: MemoryEngine) {
    let mut framed = Framed::new(stream, WireCodec);
    let mut statement: Option<Box<dyn EngineTransport>> = None;

    while let Some(Ok(msg)) = framed.next().await {
        let reply = match msg {
            Message::ClientHello(_) => Message::ServerHello(ServerHello {
                version_major: PROTOCOL_VERSION_MAJOR,
                version_minor: 0,
                server_version: "engine-double".into(),
                params: vec![],
            }),
            Message::QueryRequest(q) => {
                let mut t = engine
                    .open(&ConnectionDescriptor::new("double"), &ClientConfig::default())
                    .await
                    .unwrap();
                t.send(EngineRequest::Submit(StatementRequest {
                    sql: q.sql,
                    catalog: q.catalog,
                    schema: q.schema,
                    session_params: q.session_params,
                }))
                .await
                .unwrap();
                let reply = t.receive().await.unwrap();
                statement = Some(t);
                to_message(q.request_id, reply)
            }
            Message::FetchRequest(f) => {
                let t = match statement.as_mut() {
                    Some(t) => t,
                    None => break,
                };
                t.send(EngineRequest::Fetch {
                    query_id: f.query_id,
                    token: f.token,
                })
                .await
                .unwrap();
                to_message(f.request_id, t.receive().await.unwrap())
            }
            Message::CancelRequest(c) => {
                if let Some(mut t) = statement.take() {
                    t.release(Some(&c.query_id)).await.unwrap();
                }
                Message::CancelAck(c.query_id)
            }
            Message::Ping => Message::Pong,
            Message::Disconnect => break,
            _ => break,
        };
        if framed.send(reply).await.is_err() {
            break;
        }
    }
    if let Some(mut t) = statement.take() {
        let _ = t.release(None).await;
    }
}

fn to_message(request_id: u64, reply: EngineReply) -> Message {
    match reply {
        EngineReply::Page(mut page) => {
            page.request_id = request_id;
            Message::QueryResults(page)
        }
        EngineReply::Fault(fault) => Message::ErrorResponse(ErrorResponse {
            request_id,
            query_id: String::new(),
            error_code: fault.code,
            error_name: fault.name,
            message: fault.message,
        }),
    }
}

/// `n integer, label varchar` over three pages, one row each.
pub fn three_page_script() -> Script {
    Script::new()
        .column("n", LogicalType::Integer)
        .column("label", LogicalType::Varchar)
        .batch(vec![vec![Value::Integer(1), Value::Varchar("one".into())]])
        .batch(vec![vec![Value::Integer(2), Value::Null]])
        .batch(vec![vec![Value::Integer(3), Value::Varchar("three".into())]])
}
