//! Granary server binary
//!
//! Reads the node configuration (JSON with `TcpPort` / `DataPath`),
//! applies command-line overrides, recovers the store from its
//! transaction log, and serves the wire protocol over TCP.

use clap::{Arg, Command};
use granary_engine::{Database, NodeConfig};
use granary_server::Server;
use std::process;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn build_cli() -> Command {
    Command::new("granary-server")
        .about("In-memory queryable object cache with durable persistence")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Node configuration file (JSON)"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("TCP listener port (overrides the config file)"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .value_name("DIR")
                .help("Data directory (overrides the config file)"),
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = build_cli().get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match NodeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "cannot load configuration");
                process::exit(1);
            }
        },
        None => NodeConfig::default(),
    };
    if let Some(port) = matches.get_one::<u16>("port") {
        config = config.with_tcp_port(*port);
    }
    if let Some(data) = matches.get_one::<String>("data") {
        config = config.with_data_path(data);
    }

    let db = match Database::open_with_config(&config) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, "cannot open database");
            process::exit(1);
        }
    };

    let server = match Server::bind(("0.0.0.0", config.tcp_port), db) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, port = config.tcp_port, "cannot bind listener");
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!(error = %e, "server failed");
        process::exit(1);
    }
}
