//! Engine wire protocol message types and constants.

/// Protocol version.
pub const PROTOCOL_VERSION_MAJOR: u16 = 1;
pub const PROTOCOL_VERSION_MINOR: u16 = 0;

/// Maximum frame payload size: 64 MiB.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Frame header size: 1 byte msg_type + 4 bytes length.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Port the engine listens on when an address omits one.
pub const DEFAULT_PORT: u16 = 7911;

// ── Message type tags ────────────────────────────────────────────────────

pub const MSG_CLIENT_HELLO: u8 = 0x01;
pub const MSG_SERVER_HELLO: u8 = 0x02;
pub const MSG_QUERY_REQUEST: u8 = 0x10;
pub const MSG_QUERY_RESULTS: u8 = 0x11;
pub const MSG_ERROR_RESPONSE: u8 = 0x12;
pub const MSG_FETCH_REQUEST: u8 = 0x13;
pub const MSG_CANCEL_REQUEST: u8 = 0x14;
pub const MSG_CANCEL_ACK: u8 = 0x15;
pub const MSG_PING: u8 = 0x20;
pub const MSG_PONG: u8 = 0x21;
pub const MSG_DISCONNECT: u8 = 0x30;
pub const MSG_DISCONNECT_ACK: u8 = 0x31;

// ── Wire type ids (java.sql.Types codes) ─────────────────────────────────

pub const TYPE_BIT: i32 = -7;
pub const TYPE_TINYINT: i32 = -6;
pub const TYPE_BIGINT: i32 = -5;
pub const TYPE_LONGVARBINARY: i32 = -4;
pub const TYPE_VARBINARY: i32 = -3;
pub const TYPE_BINARY: i32 = -2;
pub const TYPE_LONGVARCHAR: i32 = -1;
pub const TYPE_NULL: i32 = 0;
pub const TYPE_CHAR: i32 = 1;
pub const TYPE_NUMERIC: i32 = 2;
pub const TYPE_DECIMAL: i32 = 3;
pub const TYPE_INTEGER: i32 = 4;
pub const TYPE_SMALLINT: i32 = 5;
pub const TYPE_FLOAT: i32 = 6;
pub const TYPE_REAL: i32 = 7;
pub const TYPE_DOUBLE: i32 = 8;
pub const TYPE_VARCHAR: i32 = 12;
pub const TYPE_BOOLEAN: i32 = 16;
pub const TYPE_DATE: i32 = 91;
pub const TYPE_TIME: i32 = 92;
pub const TYPE_TIMESTAMP: i32 = 93;
pub const TYPE_OTHER: i32 = 1111;
pub const TYPE_JAVA_OBJECT: i32 = 2000;
pub const TYPE_STRUCT: i32 = 2002;
pub const TYPE_ARRAY: i32 = 2003;
pub const TYPE_NCHAR: i32 = -15;
pub const TYPE_NVARCHAR: i32 = -9;

// ── Error codes ──────────────────────────────────────────────────────────

pub const ERR_SYNTAX_ERROR: u32 = 1;
pub const ERR_NOT_FOUND: u32 = 2;
pub const ERR_USER_CANCELED: u32 = 3;
pub const ERR_INVALID_REQUEST: u32 = 4;
pub const ERR_INTERNAL_ERROR: u32 = 65536;
pub const ERR_INSUFFICIENT_RESOURCES: u32 = 131072;

// ── Message definitions ──────────────────────────────────────────────────

/// Key-value parameter pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Client handshake initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version_major: u16,
    pub version_minor: u16,
    pub client_name: String,
    pub catalog: String,
    pub schema: String,
    pub user: String,
    pub params: Vec<Param>,
}

/// Server handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version_major: u16,
    pub version_minor: u16,
    pub server_version: String,
    pub params: Vec<Param>,
}

/// Result column metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_id: i32,
    pub type_name: String,
}

/// One result row. Cells stay undecoded at this layer; `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub cells: Vec<Option<Vec<u8>>>,
}

impl RawRow {
    pub fn new(cells: Vec<Option<Vec<u8>>>) -> Self {
        Self { cells }
    }
}

/// Statement submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub request_id: u64,
    pub sql: String,
    pub catalog: String,
    pub schema: String,
    pub session_params: Vec<Param>,
}

/// Continuation of a running statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub request_id: u64,
    pub query_id: String,
    pub token: String,
}

/// Release a statement on the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub request_id: u64,
    pub query_id: String,
}

/// Progress counters attached to every results page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryStats {
    pub state: String,
    pub processed_rows: u64,
    pub elapsed_ms: u64,
}

/// One page of a statement's results.
///
/// `columns` is present from the first page the engine knows the schema on.
/// `next_token` is absent once the statement has completed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResults {
    pub request_id: u64,
    pub query_id: String,
    pub columns: Option<Vec<ColumnMeta>>,
    pub rows: Vec<RawRow>,
    pub next_token: Option<String>,
    pub stats: QueryStats,
    pub set_session: Vec<Param>,
    pub clear_session: Vec<String>,
}

/// Engine-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub request_id: u64,
    pub query_id: String,
    pub error_code: u32,
    pub error_name: String,
    pub message: String,
}

/// All protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    QueryRequest(QueryRequest),
    QueryResults(QueryResults),
    ErrorResponse(ErrorResponse),
    FetchRequest(FetchRequest),
    CancelRequest(CancelRequest),
    CancelAck(String),
    Ping,
    Pong,
    Disconnect,
    DisconnectAck,
}

impl Message {
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::ClientHello(_) => MSG_CLIENT_HELLO,
            Message::ServerHello(_) => MSG_SERVER_HELLO,
            Message::QueryRequest(_) => MSG_QUERY_REQUEST,
            Message::QueryResults(_) => MSG_QUERY_RESULTS,
            Message::ErrorResponse(_) => MSG_ERROR_RESPONSE,
            Message::FetchRequest(_) => MSG_FETCH_REQUEST,
            Message::CancelRequest(_) => MSG_CANCEL_REQUEST,
            Message::CancelAck(_) => MSG_CANCEL_ACK,
            Message::Ping => MSG_PING,
            Message::Pong => MSG_PONG,
            Message::Disconnect => MSG_DISCONNECT,
            Message::DisconnectAck => MSG_DISCONNECT_ACK,
        }
    }

    /// Short label for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Message::ClientHello(_) => "ClientHello",
            Message::ServerHello(_) => "ServerHello",
            Message::QueryRequest(_) => "QueryRequest",
            Message::QueryResults(_) => "QueryResults",
            Message::ErrorResponse(_) => "ErrorResponse",
            Message::FetchRequest(_) => "FetchRequest",
            Message::CancelRequest(_) => "CancelRequest",
            Message::CancelAck(_) => "CancelAck",
            Message::Ping => "Ping",
            Message::Pong => "Pong",
            Message::Disconnect => "Disconnect",
            Message::DisconnectAck => "DisconnectAck",
        }
    }
}
