//! A small host for CGI scripts.
//!
//! Call it like this:
//!
//!     cgi-host -f config.toml
//!
//! Every request under the public prefix is mapped onto a script below the
//! CGI root, which runs as a child process under a wall-clock timeout and
//! an optional output ceiling. Its output is parsed as a CGI/1.1 document
//! and streamed back to the client as it arrives; a script that fails or
//! runs too long is killed and answered with an error page.
//!
//! The config file is in the [TOML format][toml]. Here is an example:
//!
//! ```toml
//! [listen]
//! port = 8080
//!
//! [cgi]
//! root = "./root/cgi-bin"
//! public_prefix = "/cgi-bin"
//! allow_methods = ["GET", "POST"]
//!
//! [cgi.interpreters]
//! ".py" = "/usr/bin/python3"
//! ".php" = "/usr/bin/php-cgi"
//!
//! [limits]
//! timeout_ms = 30000
//! kill_grace_ms = 2000
//! body_read_timeout_ms = 5000
//! max_body_bytes = 1048576
//! max_output_bytes = 0
//!
//! [environment]
//! expose_prefixes = ["HTTP_", "REQUEST_", "SERVER_"]
//! expose_names = ["QUERY_STRING"]
//!
//! [environment.set]
//! PATH = "/usr/local/bin:/usr/bin:/bin"
//! ```
//!
//! Any key that is not present takes its default; leaving out `allow_methods`
//! allows every method, and leaving out both `expose_*` keys exposes every
//! metavariable. If a key is of the wrong type, the server will bail, so
//! don’t do that.
//!
//! `cgi-host` speaks just enough HTTP/1.1 to run scripts: one request per
//! connection, responses streamed with chunked encoding.
//!
//! [toml]: https://github.com/toml-lang/toml

#[macro_use] extern crate log;

use cgi_host::config::Config;
use cgi_host::config::parser::{self, parse_file};
use cgi_host::server::serve;

use clap::{value_parser, Arg, Command};
use log::LevelFilter;

use std::env;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::process::exit;

const DEFAULT_CONFIG: &'static str = "/etc/cgi-host/config.toml";

fn main() {
    let mut log_builder = env_logger::Builder::new();
    log_builder.filter_level(LevelFilter::Info);

    if let Ok(var) = env::var("CGI_HOST_LOG") {
        log_builder.parse_filters(&var);
    }

    if let Err(e) = log_builder.try_init() {
        let _ = writeln!(io::stderr(),
                         "cgi-host: Error when initializing logging: {}", e);
        exit(1);
    }

    let matches = Command::new("cgi-host")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Alex Hill <alexander.d.hill.89@gmail.com>")
        .arg(Arg::new("config_file")
             .short('f')
             .value_name("FILE")
             .help("The TOML file with server configuration")
             .value_parser(value_parser!(PathBuf)))
        .get_matches();

    let given = matches.get_one::<PathBuf>("config_file");
    let config_file = given.cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = match parse_file(&config_file) {
        Ok(c) => c,
        Err(parser::Error::Io(ref e))
            if given.is_none() && e.kind() == ErrorKind::NotFound => {
            info!("No config file at {:?}, using the defaults", config_file);
            Config::default()
        },
        Err(parser::Error::Io(e)) => {
            error!("Error opening config file {:?}: {}", config_file, e);
            exit(1);
        },
        Err(parser::Error::Parse(e)) => {
            error!("Errors parsing config file {:?}", config_file);
            for error in e {
                error!("Config file error at line {} column {}: {}",
                       error.line, error.column, error.desc);
            }
            exit(1);
        },
        Err(parser::Error::Validation(message)) => {
            error!("Error in config file: {}", message);
            exit(1);
        }
    };

    info!("Starting server on port {}", config.port);
    if let Err(e) = serve(config) {
        error!("Server stopped: {}", e);
        exit(1);
    }
}
