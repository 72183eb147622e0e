//! Encode/decode for the supersql engine wire protocol.
//!
//! All multi-byte integers are little-endian. Every message is framed as:
//! `[msg_type: u8][length: u32 LE][payload: length bytes]`

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::types::*;

type Result<T> = std::result::Result<T, ProtocolError>;

// ── Helper: read/write primitives ────────────────────────────────────────

fn ensure(buf: &[u8], need: usize) -> Result<()> {
    if buf.len() < need {
        return Err(ProtocolError::Truncated {
            expected: need,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn read_u8(buf: &mut &[u8]) -> Result<u8> {
    ensure(buf, 1)?;
    let v = buf[0];
    *buf = &buf[1..];
    Ok(v)
}

fn read_u16(buf: &mut &[u8]) -> Result<u16> {
    ensure(buf, 2)?;
    let v = u16::from_le_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(v)
}

fn read_u32(buf: &mut &[u8]) -> Result<u32> {
    ensure(buf, 4)?;
    let v = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

fn read_i32(buf: &mut &[u8]) -> Result<i32> {
    ensure(buf, 4)?;
    let v = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    *buf = &buf[4..];
    Ok(v)
}

fn read_u64(buf: &mut &[u8]) -> Result<u64> {
    ensure(buf, 8)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[..8]);
    *buf = &buf[8..];
    Ok(u64::from_le_bytes(arr))
}

fn read_bytes(buf: &mut &[u8], n: usize) -> Result<Vec<u8>> {
    ensure(buf, n)?;
    let v = buf[..n].to_vec();
    *buf = &buf[n..];
    Ok(v)
}

fn read_string_u16(buf: &mut &[u8], field: &str) -> Result<String> {
    let len = read_u16(buf)? as usize;
    let bytes = read_bytes(buf, len)?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8 {
        field: field.to_string(),
        source: e,
    })
}

fn read_string_u32(buf: &mut &[u8], field: &str) -> Result<String> {
    let len = read_u32(buf)? as usize;
    let bytes = read_bytes(buf, len)?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8 {
        field: field.to_string(),
        source: e,
    })
}

fn read_opt_string(buf: &mut &[u8], field: &str) -> Result<Option<String>> {
    match read_u8(buf)? {
        0 => Ok(None),
        1 => read_string_u16(buf, field).map(Some),
        other => Err(ProtocolError::Corruption(format!(
            "invalid presence flag {} for '{}'",
            other, field
        ))),
    }
}

fn read_params(buf: &mut &[u8]) -> Result<Vec<Param>> {
    let n = read_u16(buf)? as usize;
    let mut params = Vec::with_capacity(n);
    for _ in 0..n {
        let key = read_string_u16(buf, "param_key")?;
        let value = read_string_u16(buf, "param_value")?;
        params.push(Param { key, value });
    }
    Ok(params)
}

fn checked_u16(len: usize, field: &'static str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len,
        max: u16::MAX as usize,
    })
}

fn checked_u32(len: usize, field: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len,
        max: u32::MAX as usize,
    })
}

fn write_string_u16(out: &mut BytesMut, s: &str, field: &'static str) -> Result<()> {
    out.put_u16_le(checked_u16(s.len(), field)?);
    out.put_slice(s.as_bytes());
    Ok(())
}

fn write_string_u32(out: &mut BytesMut, s: &str, field: &'static str) -> Result<()> {
    out.put_u32_le(checked_u32(s.len(), field)?);
    out.put_slice(s.as_bytes());
    Ok(())
}

fn write_opt_string(out: &mut BytesMut, s: Option<&str>, field: &'static str) -> Result<()> {
    match s {
        Some(s) => {
            out.put_u8(1);
            write_string_u16(out, s, field)
        }
        None => {
            out.put_u8(0);
            Ok(())
        }
    }
}

fn write_params(out: &mut BytesMut, params: &[Param]) -> Result<()> {
    out.put_u16_le(checked_u16(params.len(), "params")?);
    for p in params {
        write_string_u16(out, &p.key, "param_key")?;
        write_string_u16(out, &p.value, "param_value")?;
    }
    Ok(())
}

// ── Null bitmap helpers ──────────────────────────────────────────────────

fn null_bitmap_size(num_cols: usize) -> usize {
    num_cols.div_ceil(8)
}

fn encode_null_bitmap(out: &mut BytesMut, cells: &[Option<Vec<u8>>]) {
    let mut bitmap = vec![0u8; null_bitmap_size(cells.len())];
    for (i, c) in cells.iter().enumerate() {
        if c.is_none() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    out.put_slice(&bitmap);
}

fn decode_null_bitmap(buf: &mut &[u8], num_cols: usize) -> Result<Vec<bool>> {
    let bitmap = read_bytes(buf, null_bitmap_size(num_cols))?;
    Ok((0..num_cols)
        .map(|i| bitmap[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

// ── Row encode/decode ────────────────────────────────────────────────────

fn encode_row(out: &mut BytesMut, row: &RawRow) -> Result<()> {
    out.put_u16_le(checked_u16(row.cells.len(), "row_cells")?);
    encode_null_bitmap(out, &row.cells);
    for cell in row.cells.iter().flatten() {
        out.put_u32_le(checked_u32(cell.len(), "cell")?);
        out.put_slice(cell);
    }
    Ok(())
}

fn decode_row(buf: &mut &[u8]) -> Result<RawRow> {
    let num_cols = read_u16(buf)? as usize;
    let is_null = decode_null_bitmap(buf, num_cols)?;
    let mut cells = Vec::with_capacity(num_cols);
    for null in is_null {
        if null {
            cells.push(None);
        } else {
            let len = read_u32(buf)? as usize;
            cells.push(Some(read_bytes(buf, len)?));
        }
    }
    Ok(RawRow { cells })
}

// ── Message encode ───────────────────────────────────────────────────────

fn encode_payload(msg: &Message) -> Result<BytesMut> {
    let mut out = BytesMut::with_capacity(256);
    match msg {
        Message::ClientHello(h) => {
            out.put_u16_le(h.version_major);
            out.put_u16_le(h.version_minor);
            write_string_u16(&mut out, &h.client_name, "client_name")?;
            write_string_u16(&mut out, &h.catalog, "catalog")?;
            write_string_u16(&mut out, &h.schema, "schema")?;
            write_string_u16(&mut out, &h.user, "user")?;
            write_params(&mut out, &h.params)?;
        }
        Message::ServerHello(h) => {
            out.put_u16_le(h.version_major);
            out.put_u16_le(h.version_minor);
            write_string_u16(&mut out, &h.server_version, "server_version")?;
            write_params(&mut out, &h.params)?;
        }
        Message::QueryRequest(q) => {
            out.put_u64_le(q.request_id);
            write_string_u32(&mut out, &q.sql, "sql")?;
            write_string_u16(&mut out, &q.catalog, "catalog")?;
            write_string_u16(&mut out, &q.schema, "schema")?;
            write_params(&mut out, &q.session_params)?;
        }
        Message::QueryResults(r) => {
            out.put_u64_le(r.request_id);
            write_string_u16(&mut out, &r.query_id, "query_id")?;
            match &r.columns {
                Some(columns) => {
                    out.put_u8(1);
                    out.put_u16_le(checked_u16(columns.len(), "columns")?);
                    for c in columns {
                        write_string_u16(&mut out, &c.name, "column_name")?;
                        out.put_i32_le(c.type_id);
                        write_string_u16(&mut out, &c.type_name, "column_type_name")?;
                    }
                }
                None => out.put_u8(0),
            }
            out.put_u32_le(checked_u32(r.rows.len(), "rows")?);
            for row in &r.rows {
                encode_row(&mut out, row)?;
            }
            write_opt_string(&mut out, r.next_token.as_deref(), "next_token")?;
            write_string_u16(&mut out, &r.stats.state, "state")?;
            out.put_u64_le(r.stats.processed_rows);
            out.put_u64_le(r.stats.elapsed_ms);
            write_params(&mut out, &r.set_session)?;
            out.put_u16_le(checked_u16(r.clear_session.len(), "clear_session")?);
            for key in &r.clear_session {
                write_string_u16(&mut out, key, "clear_session_key")?;
            }
        }
        Message::ErrorResponse(e) => {
            out.put_u64_le(e.request_id);
            write_string_u16(&mut out, &e.query_id, "query_id")?;
            out.put_u32_le(e.error_code);
            write_string_u16(&mut out, &e.error_name, "error_name")?;
            write_string_u32(&mut out, &e.message, "message")?;
        }
        Message::FetchRequest(f) => {
            out.put_u64_le(f.request_id);
            write_string_u16(&mut out, &f.query_id, "query_id")?;
            write_string_u16(&mut out, &f.token, "token")?;
        }
        Message::CancelRequest(c) => {
            out.put_u64_le(c.request_id);
            write_string_u16(&mut out, &c.query_id, "query_id")?;
        }
        Message::CancelAck(query_id) => {
            write_string_u16(&mut out, query_id, "query_id")?;
        }
        Message::Ping | Message::Pong | Message::Disconnect | Message::DisconnectAck => {}
    }
    Ok(out)
}

/// Encode a `Message` into a framed byte buffer (header + payload).
///
/// Fails when a length-prefixed field overflows its prefix or the payload
/// exceeds `MAX_FRAME_SIZE`.
pub fn encode_message(msg: &Message) -> Result<BytesMut> {
    let payload = encode_payload(msg)?;
    let length = match u32::try_from(payload.len()) {
        Ok(length) if length <= MAX_FRAME_SIZE => length,
        _ => {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            })
        }
    };
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u8(msg.msg_type());
    frame.put_u32_le(length);
    frame.put_slice(&payload);
    Ok(frame)
}

// ── Message decode ───────────────────────────────────────────────────────

fn decode_results(buf: &mut &[u8]) -> Result<QueryResults> {
    let request_id = read_u64(buf)?;
    let query_id = read_string_u16(buf, "query_id")?;
    let columns = match read_u8(buf)? {
        0 => None,
        1 => {
            let n = read_u16(buf)? as usize;
            let mut columns = Vec::with_capacity(n);
            for _ in 0..n {
                let name = read_string_u16(buf, "column_name")?;
                let type_id = read_i32(buf)?;
                let type_name = read_string_u16(buf, "column_type_name")?;
                columns.push(ColumnMeta {
                    name,
                    type_id,
                    type_name,
                });
            }
            Some(columns)
        }
        other => {
            return Err(ProtocolError::Corruption(format!(
                "invalid presence flag {} for 'columns'",
                other
            )))
        }
    };
    let row_count = read_u32(buf)? as usize;
    // Each row occupies at least its 2-byte cell count.
    ensure(buf, row_count.saturating_mul(2))?;
    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        rows.push(decode_row(buf)?);
    }
    let next_token = read_opt_string(buf, "next_token")?;
    let state = read_string_u16(buf, "stats_state")?;
    let processed_rows = read_u64(buf)?;
    let elapsed_ms = read_u64(buf)?;
    let set_session = read_params(buf)?;
    let n_clear = read_u16(buf)? as usize;
    let mut clear_session = Vec::with_capacity(n_clear);
    for _ in 0..n_clear {
        clear_session.push(read_string_u16(buf, "clear_session_key")?);
    }
    Ok(QueryResults {
        request_id,
        query_id,
        columns,
        rows,
        next_token,
        stats: QueryStats {
            state,
            processed_rows,
            elapsed_ms,
        },
        set_session,
        clear_session,
    })
}

/// Length of the complete frame at the start of `input`, if the header is
/// present. Rejects oversized frames before any payload is buffered.
pub fn frame_len(input: &[u8]) -> Result<Option<usize>> {
    if input.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let length = u32::from_le_bytes([input[1], input[2], input[3], input[4]]);
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length as usize,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(Some(FRAME_HEADER_SIZE + length as usize))
}

/// Decode a `Message` from a framed byte buffer.
///
/// The input must contain the full frame (header + payload).
/// Returns `(message, bytes_consumed)`.
pub fn decode_message(input: &[u8]) -> Result<(Message, usize)> {
    let total = match frame_len(input)? {
        Some(total) => total,
        None => {
            return Err(ProtocolError::Truncated {
                expected: FRAME_HEADER_SIZE,
                actual: input.len(),
            })
        }
    };
    if input.len() < total {
        return Err(ProtocolError::Truncated {
            expected: total,
            actual: input.len(),
        });
    }

    let msg_type = input[0];
    let mut buf: &[u8] = &input[FRAME_HEADER_SIZE..total];

    let msg = match msg_type {
        MSG_CLIENT_HELLO => {
            let version_major = read_u16(&mut buf)?;
            let version_minor = read_u16(&mut buf)?;
            let client_name = read_string_u16(&mut buf, "client_name")?;
            let catalog = read_string_u16(&mut buf, "catalog")?;
            let schema = read_string_u16(&mut buf, "schema")?;
            let user = read_string_u16(&mut buf, "user")?;
            let params = read_params(&mut buf)?;
            Message::ClientHello(ClientHello {
                version_major,
                version_minor,
                client_name,
                catalog,
                schema,
                user,
                params,
            })
        }
        MSG_SERVER_HELLO => {
            let version_major = read_u16(&mut buf)?;
            let version_minor = read_u16(&mut buf)?;
            let server_version = read_string_u16(&mut buf, "server_version")?;
            let params = read_params(&mut buf)?;
            Message::ServerHello(ServerHello {
                version_major,
                version_minor,
                server_version,
                params,
            })
        }
        MSG_QUERY_REQUEST => {
            let request_id = read_u64(&mut buf)?;
            let sql = read_string_u32(&mut buf, "sql")?;
            let catalog = read_string_u16(&mut buf, "catalog")?;
            let schema = read_string_u16(&mut buf, "schema")?;
            let session_params = read_params(&mut buf)?;
            Message::QueryRequest(QueryRequest {
                request_id,
                sql,
                catalog,
                schema,
                session_params,
            })
        }
        MSG_QUERY_RESULTS => Message::QueryResults(decode_results(&mut buf)?),
        MSG_ERROR_RESPONSE => {
            let request_id = read_u64(&mut buf)?;
            let query_id = read_string_u16(&mut buf, "query_id")?;
            let error_code = read_u32(&mut buf)?;
            let error_name = read_string_u16(&mut buf, "error_name")?;
            let message = read_string_u32(&mut buf, "error_message")?;
            Message::ErrorResponse(ErrorResponse {
                request_id,
                query_id,
                error_code,
                error_name,
                message,
            })
        }
        MSG_FETCH_REQUEST => {
            let request_id = read_u64(&mut buf)?;
            let query_id = read_string_u16(&mut buf, "query_id")?;
            let token = read_string_u16(&mut buf, "token")?;
            Message::FetchRequest(FetchRequest {
                request_id,
                query_id,
                token,
            })
        }
        MSG_CANCEL_REQUEST => {
            let request_id = read_u64(&mut buf)?;
            let query_id = read_string_u16(&mut buf, "query_id")?;
            Message::CancelRequest(CancelRequest {
                request_id,
                query_id,
            })
        }
        MSG_CANCEL_ACK => Message::CancelAck(read_string_u16(&mut buf, "query_id")?),
        MSG_PING => Message::Ping,
        MSG_PONG => Message::Pong,
        MSG_DISCONNECT => Message::Disconnect,
        MSG_DISCONNECT_ACK => Message::DisconnectAck,
        other => return Err(ProtocolError::UnknownMessageType(other)),
    };

    if !buf.is_empty() {
        return Err(ProtocolError::Corruption(format!(
            "{} trailing bytes after {}",
            buf.len(),
            msg.name()
        )));
    }

    Ok((msg, total))
}

// ── Tests ────────────────────────────────────────────────────────────────
