//! Wire protocol round trips against a live TCP server
//!
//! Starts a real server on an ephemeral port, speaks newline-delimited
//! JSON to it from a plain `TcpStream`, and checks the envelope contract:
//! single responses, streamed responses with terminators, availability
//! progress, and uniform error frames.

use granary_engine::Database;
use granary_server::Server;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use tempfile::TempDir;

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        Client {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    fn send(&mut self, frame: Value) {
        let mut line = frame.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).unwrap();
    }

    fn recv(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Read frames until the terminator; returns (items, terminator)
    fn recv_stream(&mut self) -> (Vec<Value>, Value) {
        let mut items = Vec::new();
        loop {
            let frame = self.recv();
            if frame.get("done").and_then(Value::as_bool) == Some(true) {
                return (items, frame);
            }
            items.push(frame);
        }
    }
}

fn start_server() -> (std::net::SocketAddr, TempDir, granary_server::server::StopHandle) {
    let data = TempDir::new().unwrap();
    let db = Arc::new(Database::open(data.path()).unwrap());
    let server = Server::bind(("127.0.0.1", 0), db).unwrap();
    let addr = server.local_addr().unwrap();
    let stop = server.stop_handle();
    std::thread::spawn(move || server.run());
    (addr, data, stop)
}

fn item_description() -> Value {
    json!({
        "type_name": "Item",
        "primary": { "name": "id", "kind": "Int" },
        "unique": [ { "name": "serial", "kind": "Int" } ],
        "indexes": [
            { "field": { "name": "folder", "kind": "Str" }, "ordered": false, "list": false }
        ]
    })
}

fn item(id: i64, serial: i64, folder: &str) -> Value {
    json!({
        "payload": [1, 2, 3],
        "primary": { "Int": id },
        "unique": { "serial": { "Int": serial } },
        "index": { "folder": { "Str": folder } },
        "list": {}
    })
}

#[test]
fn full_session_over_tcp() {
    let (addr, _data, stop) = start_server();
    let mut client = Client::connect(addr);

    // Register.
    client.send(json!({
        "id": "1", "op": "register_type",
        "params": { "description": item_description() }
    }));
    let response = client.recv();
    assert_eq!(response["ok"], json!(true), "register: {}", response);

    // Put two records.
    for (rid, record) in [item(1, 1001, "aaa"), item(2, 1002, "aaa")].iter().enumerate() {
        client.send(json!({
            "id": format!("put-{}", rid), "op": "put",
            "params": { "type_name": "Item", "record": record }
        }));
        assert_eq!(client.recv()["ok"], json!(true));
    }

    // GetOne by primary key.
    client.send(json!({
        "id": "3", "op": "get_one",
        "params": { "type_name": "Item", "key": "id", "value": { "Int": 1 } }
    }));
    let response = client.recv();
    assert_eq!(response["result"]["primary"], json!({ "Int": 1 }));

    // GetMany streams two items and a terminator.
    client.send(json!({
        "id": "4", "op": "get_many",
        "params": { "query": {
            "type_name": "Item",
            "blocks": [ { "predicates": [
                { "key": "folder", "op": "Eq", "operands": [ { "Str": "aaa" } ] }
            ] } ]
        } }
    }));
    let (items, end) = client.recv_stream();
    assert_eq!(items.len(), 2);
    assert_eq!(end["count"], json!(2));

    // EvalQuery.
    client.send(json!({
        "id": "5", "op": "eval_query",
        "params": { "query": {
            "type_name": "Item",
            "blocks": [ { "predicates": [
                { "key": "folder", "op": "Eq", "operands": [ { "Str": "aaa" } ] }
            ] } ]
        } }
    }));
    let response = client.recv();
    assert_eq!(response["result"], json!({ "authoritative": false, "count": 2 }));

    // Availability with progress and missing keys.
    client.send(json!({
        "id": "6", "op": "get_available_items",
        "params": { "type_name": "Item", "keys": [ { "Int": 1 }, { "Int": 7 } ], "filter": null }
    }));
    let (items, end) = client.recv_stream();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["progress"], json!([1, 1]));
    assert_eq!(end["missing"], json!([ { "Int": 7 } ]));

    // Object descriptions stream key projections, payloads omitted.
    client.send(json!({
        "id": "7", "op": "get_object_descriptions",
        "params": { "query": {
            "type_name": "Item",
            "blocks": [ { "predicates": [
                { "key": "folder", "op": "Eq", "operands": [ { "Str": "aaa" } ] }
            ] } ]
        } }
    }));
    let (items, end) = client.recv_stream();
    assert_eq!(items.len(), 2);
    assert_eq!(end["count"], json!(2));
    assert!(items[0]["item"].get("payload").is_none());
    assert!(items[0]["item"]["unique"].get("serial").is_some());

    // Sequences.
    client.send(json!({
        "id": "8", "op": "generate_unique_ids",
        "params": { "name": "blah", "count": 3 }
    }));
    assert_eq!(client.recv()["result"], json!([1, 2, 3]));

    stop.stop();
}

#[test]
fn errors_are_uniform_frames() {
    let (addr, _data, stop) = start_server();
    let mut client = Client::connect(addr);

    // Unknown type.
    client.send(json!({
        "id": "e1", "op": "get_one",
        "params": { "type_name": "Ghost", "key": "id", "value": { "Int": 1 } }
    }));
    let response = client.recv();
    assert_eq!(response["ok"], json!(false));
    assert_eq!(response["error"]["code"], json!("UnknownType"));

    // Unparseable request still gets an error frame, and the connection
    // survives for the next request.
    client.send(json!({ "this": "is not a request" }));
    let response = client.recv();
    assert_eq!(response["ok"], json!(false));
    assert_eq!(response["error"]["code"], json!("InvalidQuery"));

    client.send(json!({ "id": "e2", "op": "ping" }));
    assert_eq!(client.recv()["result"], json!("pong"));

    stop.stop();
}

#[test]
fn requests_in_one_connection_observe_issue_order() {
    let (addr, _data, stop) = start_server();
    let mut client = Client::connect(addr);

    client.send(json!({
        "id": "1", "op": "register_type",
        "params": { "description": item_description() }
    }));
    // Fire the dependent requests without waiting for responses.
    client.send(json!({
        "id": "2", "op": "put",
        "params": { "type_name": "Item", "record": item(9, 9009, "zzz") }
    }));
    client.send(json!({
        "id": "3", "op": "get_one",
        "params": { "type_name": "Item", "key": "id", "value": { "Int": 9 } }
    }));

    assert_eq!(client.recv()["ok"], json!(true));
    assert_eq!(client.recv()["ok"], json!(true));
    let response = client.recv();
    assert_eq!(response["result"]["primary"], json!({ "Int": 9 }));

    stop.stop();
}
