use super::*;

use toml::{Table, Value};

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn parse_file<P: AsRef<Path>>(conf: P) -> Result<Config, Error> {
    let mut toml = String::new();
    {
        let mut f = File::open(conf)?;
        f.read_to_string(&mut toml)?;
    }

    parse_str(&toml)
}

pub fn parse_str(toml: &str) -> Result<Config, Error> {
    match toml.parse::<Table>() {
        Ok(table) => config_from_table(table),
        Err(e) => Err(Error::Parse(vec![message_from_error(toml, &e)]))
    }
}

/// Looks up a dotted path like `"limits.timeout_ms"`
fn lookup<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn string_at(table: &Table, path: &str, what: &str)
             -> Result<Option<String>, Error> {
    match lookup(table, path) {
        Some(&Value::String(ref s)) => Ok(Some(s.clone())),
        Some(val) => Err(Error::Validation(
            format!("Expected the {} to be a string, got a {}",
                    what, val.type_str())
        )),
        None => Ok(None)
    }
}

fn strings_at(table: &Table, path: &str, what: &str)
              -> Result<Option<Vec<String>>, Error> {
    match lookup(table, path) {
        Some(&Value::Array(ref items)) => {
            let mut strings = Vec::with_capacity(items.len());
            for item in items {
                match *item {
                    Value::String(ref s) => strings.push(s.clone()),
                    ref other => return Err(Error::Validation(
                        format!("Expected every entry of the {} to be a string, \
                                 got a {}", what, other.type_str())
                    ))
                }
            }
            Ok(Some(strings))
        },
        Some(val) => Err(Error::Validation(
            format!("Expected the {} to be an array, got a {}",
                    what, val.type_str())
        )),
        None => Ok(None)
    }
}

/// A non-negative integer
fn count_at(table: &Table, path: &str, what: &str)
            -> Result<Option<u64>, Error> {
    match lookup(table, path) {
        Some(&Value::Integer(n)) if n >= 0 => Ok(Some(n as u64)),
        Some(&Value::Integer(n)) => Err(Error::Validation(
            format!("The {} {} is negative", what, n)
        )),
        Some(val) => Err(Error::Validation(
            format!("Expected the {} to be an integer, got a {}",
                    what, val.type_str())
        )),
        None => Ok(None)
    }
}

fn millis_at(table: &Table, path: &str, what: &str)
             -> Result<Option<Duration>, Error> {
    Ok(count_at(table, path, what)?.map(Duration::from_millis))
}

fn string_table_at(table: &Table, path: &str, what: &str)
                   -> Result<Option<Vec<(String, String)>>, Error> {
    match lookup(table, path) {
        Some(&Value::Table(ref t)) => {
            let mut pairs = Vec::with_capacity(t.len());
            for (key, value) in t {
                match *value {
                    Value::String(ref s) => pairs.push((key.clone(), s.clone())),
                    ref other => return Err(Error::Validation(
                        format!("Expected {}.{} to be a string, got a {}",
                                what, key, other.type_str())
                    ))
                }
            }
            Ok(Some(pairs))
        },
        Some(val) => Err(Error::Validation(
            format!("Expected the {} to be a table, got a {}",
                    what, val.type_str())
        )),
        None => Ok(None)
    }
}

fn config_from_table(table: Table) -> Result<Config, Error> {
    let mut config: Config = Default::default();

    match lookup(&table, "listen.port") {
        Some(&Value::Integer(p))
            if p <= u16::MAX as i64 &&
            p > 0 => config.port = p as u16,
        Some(&Value::Integer(p)) => return Err(Error::Validation(
            format!("The given port {} is out of range", p)
        )),
        Some(val) => return Err(Error::Validation(
            format!("Expected the port to be an integer, got a {}",
                    val.type_str())
        )),
        None => ()
    }

    if let Some(root) = string_at(&table, "cgi.root", "CGI root")? {
        config.cgi.root = PathBuf::from(root);
    }

    if let Some(prefix) = string_at(&table, "cgi.public_prefix",
                                    "public prefix")? {
        if !prefix.starts_with('/') {
            return Err(Error::Validation(
                format!("The public prefix {:?} must start with '/'", prefix)
            ));
        }
        config.cgi.public_prefix = PathBuf::from(prefix);
    }

    if let Some(methods) = strings_at(&table, "cgi.allow_methods",
                                      "allowed methods")? {
        config.cgi.allow_methods = methods;
    }

    if let Some(interpreters) = string_table_at(&table, "cgi.interpreters",
                                                "cgi.interpreters")? {
        config.cgi.interpreters = interpreters.into_iter()
            .map(|(ext, path)| (ext, PathBuf::from(path)))
            .collect();
    }

    if let Some(timeout) = millis_at(&table, "limits.timeout_ms", "timeout")? {
        if timeout == Duration::from_millis(0) {
            return Err(Error::Validation(
                String::from("The timeout must be at least 1 ms")
            ));
        }
        config.limits.timeout = timeout;
    }

    if let Some(grace) = millis_at(&table, "limits.kill_grace_ms",
                                   "kill grace period")? {
        config.limits.kill_grace = grace;
    }

    if let Some(read) = millis_at(&table, "limits.body_read_timeout_ms",
                                  "body read timeout")? {
        if read == Duration::from_millis(0) {
            return Err(Error::Validation(
                String::from("The body read timeout must be at least 1 ms")
            ));
        }
        config.limits.body_read_timeout = read;
    }

    if let Some(max) = count_at(&table, "limits.max_body_bytes",
                                "body size limit")? {
        config.limits.max_body_bytes = match max {
            0 => None,
            n => Some(n as usize)
        };
    }

    if let Some(max) = count_at(&table, "limits.max_output_bytes",
                                "output size limit")? {
        config.limits.max_output_bytes = match max {
            0 => None,
            n => Some(n)
        };
    }

    let prefixes = strings_at(&table, "environment.expose_prefixes",
                              "exposed prefixes")?;
    let names = strings_at(&table, "environment.expose_names",
                           "exposed names")?;
    if prefixes.is_some() || names.is_some() {
        config.env.exposure = ExposurePolicy::Filter {
            prefixes: prefixes.unwrap_or_default(),
            names: names.unwrap_or_default()
        };
    }

    if let Some(set) = string_table_at(&table, "environment.set",
                                       "environment.set")? {
        config.env.set = set;
    }

    Ok(config)
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse(Vec<ErrorMessage>),
    Validation(String)
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// An owned, rendered version of a TOML syntax error
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub desc: String,
    pub line: usize,
    pub column: usize
}

/// Convert a `toml::de::Error` into an `ErrorMessage`
fn message_from_error(source: &str, error: &toml::de::Error) -> ErrorMessage {
    let offset = error.span().map_or(0, |span| span.start);
    let (line, column) = to_linecol(source, offset);

    ErrorMessage {
        desc: String::from(error.message()),
        line: line,
        column: column
    }
}

/// Zero-based line and column of a byte offset
fn to_linecol(source: &str, offset: usize) -> (usize, usize) {
    let before = &source.as_bytes()[.. offset.min(source.len())];
    let line = before.iter().filter(|&&b| b == b'\n').count();
    let column = before.iter().rev().take_while(|&&b| b != b'\n').count();
    (line, column)
}
