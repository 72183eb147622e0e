//! Client for the supersql distributed query engine.
//!
//! A [`Connection`] is a cheap handle; each [`Cursor`] runs one statement at
//! a time through its own [`Session`] and engine resource.

pub mod column;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod introspect;
pub mod memory;
pub mod params;
pub mod registry;
pub mod session;
pub mod stream;
pub mod tcp;
pub mod transport;
pub mod value;

pub use column::{ColumnDescription, ColumnDescriptor};
pub use config::ClientConfig;
pub use connection::{Connection, Cursor};
pub use descriptor::ConnectionDescriptor;
pub use error::{classify_engine_error, ClientError, ClientResult, EngineFault, ErrorKind};
pub use introspect::{IntrospectedColumn, SchemaIntrospector};
pub use params::{Params, SqlParam};
pub use registry::{LogicalType, TypeRegistry};
pub use session::{RowFetch, Session, SessionState};
pub use stream::{ResultStream, Row};
pub use value::Value;

/// DB-API level implemented by [`Cursor`].
pub const API_LEVEL: &str = "2.0";
/// Connections may be shared between threads; cursors may not.
pub const THREAD_SAFETY: u8 = 2;
pub const PARAM_STYLE: &str = "pyformat";

/// Handle for `descriptor`. Performs no I/O.
pub fn connect(descriptor: ConnectionDescriptor) -> Connection {
    Connection::connect(descriptor)
}
