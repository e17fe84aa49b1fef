//! Request dispatcher
//!
//! Maps wire requests onto `Database` operations and writes the response
//! frames. Streaming operations write one line per item as the result is
//! walked; the terminator carries the count (and the missing keys for
//! availability requests). Any domain error becomes a single uniform
//! error frame.

use crate::envelope::{Op, Request, Response, StreamEnd, StreamItem};
use granary_core::{GranaryError, Query, Result};
use granary_engine::Database;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

fn write_line<T: Serialize>(out: &mut impl Write, frame: &T) -> std::io::Result<()> {
    let line = serde_json::to_string(frame)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| GranaryError::internal(format!("encoding result: {}", e)))
}

// Frame writer for the streaming visitors: a channel failure becomes a
// domain error so it aborts the visit; the caller surfaces it from there.
fn write_frame<T: Serialize>(out: &mut impl Write, frame: &T) -> Result<()> {
    write_line(out, frame).map_err(|e| GranaryError::io(format!("channel write: {}", e)))
}

/// Handle one request, writing every response frame to `out`
///
/// An `Err` from this function is a channel failure (the peer went away);
/// domain failures are written to the channel and return `Ok`.
pub fn dispatch(db: &Database, request: Request, out: &mut impl Write) -> std::io::Result<()> {
    let id = request.id.clone();
    debug!(id = %id, "dispatching request");

    match request.op {
        Op::GetMany { query } => stream_records(db, &id, &query, out),
        Op::GetObjectDescriptions { query } => stream_descriptions(db, &id, &query, out),
        Op::GetAvailableItems {
            type_name,
            keys,
            filter,
        } => stream_availability(db, &id, &type_name, &keys, filter.as_ref(), out),
        op => {
            let outcome = single(db, op);
            match outcome {
                Ok(result) => write_line(out, &Response::success(&id, result)),
                Err(e) => write_line(out, &Response::failure(&id, &e)),
            }
        }
    }
}

/// Non-streaming operations: one result value each
fn single(db: &Database, op: Op) -> Result<serde_json::Value> {
    match op {
        Op::Ping => Ok(serde_json::json!("pong")),
        Op::RegisterType { description } => {
            db.register_type(description)?;
            Ok(serde_json::Value::Null)
        }
        Op::Put { type_name, record } => {
            db.put(&type_name, record)?;
            Ok(serde_json::Value::Null)
        }
        Op::Remove { type_name, primary } => {
            db.remove(&type_name, &primary)?;
            Ok(serde_json::Value::Null)
        }
        Op::GetOne {
            type_name,
            key,
            value,
        } => {
            let found = db.get_one(&type_name, &key, &value)?;
            match found {
                Some(record) => to_value(record.as_ref()),
                None => Ok(serde_json::Value::Null),
            }
        }
        Op::EvalQuery { query } => {
            let (authoritative, count) = db.eval_query(&query)?;
            Ok(serde_json::json!({ "authoritative": authoritative, "count": count }))
        }
        Op::Truncate { type_name } => {
            db.truncate(&type_name)?;
            Ok(serde_json::Value::Null)
        }
        Op::DeleteMany { query } => {
            let deleted = db.delete_many(&query)?;
            Ok(serde_json::json!({ "deleted": deleted }))
        }
        Op::DeclareDomain {
            type_name,
            description,
            mode,
        } => {
            db.declare_domain(&type_name, &description, mode)?;
            Ok(serde_json::Value::Null)
        }
        Op::GetKnownTypes => to_value(&db.known_types()),
        Op::GetServerDescription => to_value(&db.server_description()),
        Op::GenerateUniqueIds { name, count } => {
            let range = db.generate_unique_ids(&name, count)?;
            to_value(&range.iter().collect::<Vec<u64>>())
        }
        Op::Dump { path } => {
            let dir = db.dump(path)?;
            Ok(serde_json::json!({ "dir": dir.display().to_string() }))
        }
        Op::ImportDump { path } => {
            let imported = db.import_dump(path)?;
            Ok(serde_json::json!({ "imported": imported }))
        }
        Op::InitializeFromDump { path } => {
            let imported = db.initialize_from_dump(path)?;
            Ok(serde_json::json!({ "imported": imported }))
        }
        Op::GetMany { .. } | Op::GetObjectDescriptions { .. } | Op::GetAvailableItems { .. } => {
            Err(GranaryError::internal("streaming op routed to single()"))
        }
    }
}

fn stream_records(
    db: &Database,
    id: &str,
    query: &Query,
    out: &mut impl Write,
) -> std::io::Result<()> {
    let outcome = db.get_many_with(query, |record| {
        let item = to_value(record.as_ref())?;
        write_frame(
            out,
            &StreamItem {
                id: id.to_string(),
                item,
                progress: None,
            },
        )
    });
    match outcome {
        Ok(count) => write_line(
            out,
            &StreamEnd {
                id: id.to_string(),
                done: true,
                count,
                missing: None,
            },
        ),
        Err(e) => write_line(out, &Response::failure(id, &e)),
    }
}

fn stream_descriptions(
    db: &Database,
    id: &str,
    query: &Query,
    out: &mut impl Write,
) -> std::io::Result<()> {
    let outcome = db.get_object_descriptions_with(query, |description| {
        let item = to_value(&description)?;
        write_frame(
            out,
            &StreamItem {
                id: id.to_string(),
                item,
                progress: None,
            },
        )
    });
    match outcome {
        Ok(count) => write_line(
            out,
            &StreamEnd {
                id: id.to_string(),
                done: true,
                count,
                missing: None,
            },
        ),
        Err(e) => write_line(out, &Response::failure(id, &e)),
    }
}

fn stream_availability(
    db: &Database,
    id: &str,
    type_name: &str,
    keys: &[granary_core::KeyValue],
    filter: Option<&Query>,
    out: &mut impl Write,
) -> std::io::Result<()> {
    let mut count = 0usize;
    let outcome = db.get_available_items_with(type_name, keys, filter, |item| {
        let payload = to_value(item.record.as_ref())?;
        write_frame(
            out,
            &StreamItem {
                id: id.to_string(),
                item: payload,
                progress: Some((item.current, item.total)),
            },
        )?;
        count += 1;
        Ok(())
    });
    match outcome {
        Ok(missing) => write_line(
            out,
            &StreamEnd {
                id: id.to_string(),
                done: true,
                count,
                missing: Some(missing),
            },
        ),
        Err(e) => write_line(out, &Response::failure(id, &e)),
    }
}
