//! Request/response envelope for the wire protocol
//!
//! One JSON object per line. Request: `{id, op, params}`. Single
//! response: `{id, ok: true, result}` or `{id, ok: false, error: {code,
//! message}}`. Streamed response: `{id, item, progress?}`* then
//! `{id, done: true, ...}`.

use granary_core::{
    DeclareMode, DomainDescription, ErrorCode, GranaryError, KeyValue, Query, Record,
    TypeDescription,
};
use serde::{Deserialize, Serialize};

/// The operation of a request, with its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "params", rename_all = "snake_case")]
pub enum Op {
    /// Liveness probe
    Ping,
    /// Register a type schema
    RegisterType {
        /// The schema to register
        description: TypeDescription,
    },
    /// Insert or replace a record
    Put {
        /// Target type
        type_name: String,
        /// The record
        record: Record,
    },
    /// Remove a record by primary key
    Remove {
        /// Target type
        type_name: String,
        /// Primary key of the record
        primary: KeyValue,
    },
    /// Look up one record by primary or unique key
    GetOne {
        /// Target type
        type_name: String,
        /// Key name (primary or unique)
        key: String,
        /// Key value
        value: KeyValue,
    },
    /// Stream all records matching a query
    GetMany {
        /// The query
        query: Query,
    },
    /// Count matches and report authority
    EvalQuery {
        /// The query
        query: Query,
    },
    /// Stream availability of a set of primary keys
    GetAvailableItems {
        /// Target type
        type_name: String,
        /// Primary keys to probe
        keys: Vec<KeyValue>,
        /// Optional narrowing filter
        filter: Option<Query>,
    },
    /// Stream key projections of matching records
    GetObjectDescriptions {
        /// The query
        query: Query,
    },
    /// Clear a type
    Truncate {
        /// Target type
        type_name: String,
    },
    /// Delete all records matching a query
    DeleteMany {
        /// The query
        query: Query,
    },
    /// Apply a domain-completeness declaration
    DeclareDomain {
        /// Target type
        type_name: String,
        /// The declared description
        description: DomainDescription,
        /// How it combines with the current state
        mode: DeclareMode,
    },
    /// List all registered type descriptions
    GetKnownTypes,
    /// Per-type count, hit count, and schema
    GetServerDescription,
    /// Reserve consecutive ids of a named sequence
    GenerateUniqueIds {
        /// Sequence name
        name: String,
        /// How many ids
        count: u64,
    },
    /// Write a dump under a directory
    Dump {
        /// Dump root directory
        path: String,
    },
    /// Import a dump into the running store
    ImportDump {
        /// Dump root or dated directory
        path: String,
    },
    /// Import a dump into an empty store
    InitializeFromDump {
        /// Dump root or dated directory
        path: String,
    },
}

/// One request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Client-chosen id, echoed on every frame of the response
    pub id: String,
    /// The operation and its parameters
    #[serde(flatten)]
    pub op: Op,
}

/// Uniform wire error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    /// Canonical error code
    pub code: String,
    /// Server-side message
    pub message: String,
}

impl From<&GranaryError> for WireError {
    fn from(e: &GranaryError) -> Self {
        WireError {
            code: e.code().as_str().to_string(),
            message: e.to_string(),
        }
    }
}

impl WireError {
    /// The parsed error code, if recognised
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::parse(&self.code)
    }
}

/// Single-frame response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request id
    pub id: String,
    /// Success flag
    pub ok: bool,
    /// Result payload when `ok`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error when not `ok`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    /// Build a success response
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Response {
            id: id.to_string(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response
    pub fn failure(id: &str, error: &GranaryError) -> Self {
        Response {
            id: id.to_string(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// One streamed item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamItem {
    /// Request id
    pub id: String,
    /// The item payload
    pub item: serde_json::Value,
    /// `(current, total)` progress, availability streams only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<(usize, usize)>,
}

/// Stream terminator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnd {
    /// Request id
    pub id: String,
    /// Always true; marks the end of the stream
    pub done: bool,
    /// Number of items streamed
    pub count: usize,
    /// Keys that were not found, availability streams only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<KeyValue>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::Predicate;

    #[test]
    fn request_round_trips_through_json() {
        let request = Request {
            id: "r-1".to_string(),
            op: Op::GetMany {
                query: Query::filter("Item", Predicate::eq("folder", KeyValue::str("aaa"))),
            },
        };
        let line = serde_json::to_string(&request).unwrap();
        assert!(line.contains(r#""op":"get_many""#));
        let back: Request = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, "r-1");
        assert!(matches!(back.op, Op::GetMany { .. }));
    }

    #[test]
    fn error_response_carries_the_canonical_code() {
        let err = GranaryError::unknown_type("Ghost");
        let response = Response::failure("r-2", &err);
        let line = serde_json::to_string(&response).unwrap();
        let back: Response = serde_json::from_str(&line).unwrap();
        assert!(!back.ok);
        let wire = back.error.unwrap();
        assert_eq!(wire.code(), Some(ErrorCode::UnknownType));
        assert!(wire.message.contains("Ghost"));
    }

    #[test]
    fn params_less_ops_parse() {
        let back: Request =
            serde_json::from_str(r#"{"id":"x","op":"get_known_types"}"#).unwrap();
        assert!(matches!(back.op, Op::GetKnownTypes));
    }
}
