//! Error types for the Granary object cache
//!
//! This module defines the unified error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! ## Canonical Error Codes
//!
//! The following 9 error codes are the canonical wire representation:
//!
//! | Code | Description |
//! |------|-------------|
//! | NotFound | Removing or updating a missing primary key |
//! | NotIndexable | A query and-block has no indexable predicate |
//! | SchemaMismatch | Record or re-registration disagrees with the declared schema |
//! | UnknownType | Operation names a type that was never registered |
//! | InvalidQuery | Malformed predicate, wrong kind or arity for an operator |
//! | DumpCorrupt | Dump directory is incomplete or fails checksum validation |
//! | StoreNotEmpty | InitializeFromDump against a non-empty store |
//! | IoFailure | Disk or log failure |
//! | Internal | Bug or invariant violation |
//!
//! ## Wire Encoding
//!
//! Server-side failures are packaged into a single uniform error message on
//! the channel: `{ "code": "NotFound", "message": "..." }`. Clients surface
//! them as one domain error kind carrying the server message.

use std::io;
use thiserror::Error;

/// Canonical error codes for wire encoding
///
/// These 9 codes are the stable wire representation of all Granary errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Primary key not present where presence is required
    NotFound,
    /// Query has an and-block with no indexable predicate
    NotIndexable,
    /// Record or schema re-registration disagrees with the declared TypeDescription
    SchemaMismatch,
    /// Type was never registered
    UnknownType,
    /// Malformed predicate, wrong kind or arity for an operator
    InvalidQuery,
    /// Dump directory incomplete or corrupt
    DumpCorrupt,
    /// InitializeFromDump against a non-empty store
    StoreNotEmpty,
    /// Disk or transaction-log failure
    IoFailure,
    /// Bug or invariant violation
    Internal,
}

impl ErrorCode {
    /// Get the canonical string representation for wire encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NotFound",
            ErrorCode::NotIndexable => "NotIndexable",
            ErrorCode::SchemaMismatch => "SchemaMismatch",
            ErrorCode::UnknownType => "UnknownType",
            ErrorCode::InvalidQuery => "InvalidQuery",
            ErrorCode::DumpCorrupt => "DumpCorrupt",
            ErrorCode::StoreNotEmpty => "StoreNotEmpty",
            ErrorCode::IoFailure => "IoFailure",
            ErrorCode::Internal => "Internal",
        }
    }

    /// Parse an error code from its string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NotFound" => Some(ErrorCode::NotFound),
            "NotIndexable" => Some(ErrorCode::NotIndexable),
            "SchemaMismatch" => Some(ErrorCode::SchemaMismatch),
            "UnknownType" => Some(ErrorCode::UnknownType),
            "InvalidQuery" => Some(ErrorCode::InvalidQuery),
            "DumpCorrupt" => Some(ErrorCode::DumpCorrupt),
            "StoreNotEmpty" => Some(ErrorCode::StoreNotEmpty),
            "IoFailure" => Some(ErrorCode::IoFailure),
            "Internal" => Some(ErrorCode::Internal),
            _ => None,
        }
    }

    /// Check if this code represents a serious/unrecoverable failure
    pub fn is_serious(&self) -> bool {
        matches!(self, ErrorCode::Internal | ErrorCode::IoFailure)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for all Granary APIs
#[derive(Debug, Error)]
pub enum GranaryError {
    /// Primary key not present in the type
    #[error("not found: {type_name}/{key}")]
    NotFound {
        /// Type the lookup ran against
        type_name: String,
        /// Display form of the missing key
        key: String,
    },

    /// An and-block of the query has no predicate any index can drive
    #[error("query on '{type_name}' has an and-block with no indexable predicate")]
    NotIndexable {
        /// Type the query ran against
        type_name: String,
    },

    /// Record (or a re-registration) disagrees with the declared schema
    #[error("schema mismatch for '{type_name}': {reason}")]
    SchemaMismatch {
        /// Type whose description was violated
        type_name: String,
        /// What disagreed
        reason: String,
    },

    /// Operation names a type that was never registered
    #[error("unknown type '{type_name}'")]
    UnknownType {
        /// The unregistered type name
        type_name: String,
    },

    /// Malformed predicate: wrong operand kind or arity for the operator
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// What was malformed
        reason: String,
    },

    /// Dump directory incomplete or fails validation
    #[error("dump corrupt at '{path}': {reason}")]
    DumpCorrupt {
        /// Dump directory or file involved
        path: String,
        /// What failed validation
        reason: String,
    },

    /// InitializeFromDump requires an empty store
    #[error("store not empty: {reason}")]
    StoreNotEmpty {
        /// Which part of the store is non-empty
        reason: String,
    },

    /// Disk or transaction-log failure
    #[error("io failure: {message}")]
    IoFailure {
        /// Description of the failure
        message: String,
    },

    /// Bug or invariant violation
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl GranaryError {
    /// Create a NotFound error
    pub fn not_found(type_name: impl Into<String>, key: impl std::fmt::Display) -> Self {
        GranaryError::NotFound {
            type_name: type_name.into(),
            key: key.to_string(),
        }
    }

    /// Create a SchemaMismatch error
    pub fn schema_mismatch(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        GranaryError::SchemaMismatch {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnknownType error
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        GranaryError::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Create an InvalidQuery error
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        GranaryError::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Create a DumpCorrupt error
    pub fn dump_corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        GranaryError::DumpCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an IoFailure error
    pub fn io(message: impl Into<String>) -> Self {
        GranaryError::IoFailure {
            message: message.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        GranaryError::Internal {
            message: message.into(),
        }
    }

    /// Get the canonical wire code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            GranaryError::NotFound { .. } => ErrorCode::NotFound,
            GranaryError::NotIndexable { .. } => ErrorCode::NotIndexable,
            GranaryError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            GranaryError::UnknownType { .. } => ErrorCode::UnknownType,
            GranaryError::InvalidQuery { .. } => ErrorCode::InvalidQuery,
            GranaryError::DumpCorrupt { .. } => ErrorCode::DumpCorrupt,
            GranaryError::StoreNotEmpty { .. } => ErrorCode::StoreNotEmpty,
            GranaryError::IoFailure { .. } => ErrorCode::IoFailure,
            GranaryError::Internal { .. } => ErrorCode::Internal,
        }
    }
}

impl From<io::Error> for GranaryError {
    fn from(e: io::Error) -> Self {
        GranaryError::IoFailure {
            message: e.to_string(),
        }
    }
}

/// Result type used throughout Granary
pub type Result<T> = std::result::Result<T, GranaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_strings_round_trip() {
        let codes = [
            ErrorCode::NotFound,
            ErrorCode::NotIndexable,
            ErrorCode::SchemaMismatch,
            ErrorCode::UnknownType,
            ErrorCode::InvalidQuery,
            ErrorCode::DumpCorrupt,
            ErrorCode::StoreNotEmpty,
            ErrorCode::IoFailure,
            ErrorCode::Internal,
        ];
        for code in codes {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("NoSuchCode"), None);
    }

    #[test]
    fn error_carries_its_code() {
        let err = GranaryError::not_found("Item", 42);
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("Item/42"));

        let err: GranaryError = io::Error::new(io::ErrorKind::Other, "disk gone").into();
        assert_eq!(err.code(), ErrorCode::IoFailure);
        assert!(err.code().is_serious());
    }
}
