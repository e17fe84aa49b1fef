//! Wire protocol and TCP server for Granary
//!
//! The channel is newline-delimited JSON over TCP. Requests are
//! `{id, op, params}`; responses are either a single
//! `{id, ok, result|error}` frame or, for the streaming operations
//! (`get_many`, `get_available_items`, `get_object_descriptions`), a
//! sequence of `{id, item, ...}` frames closed by a `{id, done: true}`
//! terminator. The dispatcher writes items as it walks the result, never
//! a buffered whole.
//!
//! Within one connection requests run strictly in order, so a client
//! observes its own effects in issue order. A disconnect mid-stream ends
//! the worker for that connection and nothing else.

pub mod dispatch;
pub mod envelope;
pub mod server;

pub use envelope::{Op, Request, Response, StreamEnd, StreamItem, WireError};
pub use server::{Server, StopHandle};
