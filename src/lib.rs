//! Supervised execution of request handlers, and a CGI host built on it
//!
//! A handler is an external program. `context` snapshots a request into
//! what the handler gets to see, `invoker` starts the handler and pumps its
//! output, and `supervisor` enforces the time and output limits and reports
//! how the run ended. `server` puts an HTTP front on all of that for CGI
//! scripts.

#[macro_use] extern crate log;

pub mod cgi;
pub mod config;
pub mod context;
pub mod errors;
pub mod filesystem;
pub mod form;
pub mod invoker;
pub mod log_util;
pub mod server;
pub mod supervisor;
