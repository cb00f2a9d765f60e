pub mod parser;

use crate::context::{self, ExposurePolicy};
use crate::supervisor::Limits;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// A holder for app configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port number to listen on
    pub port: u16,
    pub cgi: CgiConfig,
    pub limits: LimitsConfig,
    pub env: EnvironmentConfig
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 8080,
            cgi: Default::default(),
            limits: Default::default(),
            env: Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CgiConfig {
    /// Where the scripts are located on disk
    pub root: PathBuf,
    /// Public URI prefix that gets mapped onto `root`
    pub public_prefix: PathBuf,
    /// Methods scripts may be called with; empty means any
    pub allow_methods: Vec<String>,
    /// File extension (with the dot) to interpreter, checked in the order
    /// the config file lists them
    pub interpreters: Vec<(String, PathBuf)>
}

impl CgiConfig {
    /// The interpreter configured for `script`, if any
    pub fn interpreter_for(&self, script: &Path) -> Option<&Path> {
        let name = script.file_name()?.to_str()?;
        self.interpreters.iter()
            .find(|&&(ref ext, _)| name.ends_with(ext.as_str()))
            .map(|&(_, ref interpreter)| interpreter.as_path())
    }
}

impl Default for CgiConfig {
    fn default() -> CgiConfig {
        CgiConfig {
            root: PathBuf::from("./root/cgi-bin"),
            public_prefix: PathBuf::from("/cgi-bin"),
            allow_methods: Vec::new(),
            interpreters: vec![
                (String::from(".py"), PathBuf::from("/usr/bin/python3")),
                (String::from(".php"), PathBuf::from("/usr/bin/php-cgi"))
            ]
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Wall-clock budget for one script run
    pub timeout: Duration,
    /// Time between `SIGTERM` and `SIGKILL` for a script being killed
    pub kill_grace: Duration,
    /// How long a client gets to send its whole body
    pub body_read_timeout: Duration,
    pub max_body_bytes: Option<usize>,
    pub max_output_bytes: Option<u64>
}

impl LimitsConfig {
    pub fn supervisor_limits(&self) -> Limits {
        Limits {
            timeout: self.timeout,
            kill_grace: self.kill_grace,
            max_output_bytes: self.max_output_bytes
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> LimitsConfig {
        LimitsConfig {
            timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(2),
            body_read_timeout: Duration::from_secs(5),
            max_body_bytes: Some(1024 * 1024),
            max_output_bytes: None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    /// Which metavariables scripts get to see
    pub exposure: ExposurePolicy,
    /// Extra variables set for every script, e.g. `PATH`
    pub set: Vec<(String, String)>
}

impl Config {
    /// A context builder honouring this configuration
    pub fn context_builder(&self) -> context::Builder {
        let mut builder = context::Builder::new(self.env.exposure.clone())
            .fixed(self.env.set.clone())
            .read_deadline(self.limits.body_read_timeout);
        if let Some(limit) = self.limits.max_body_bytes {
            builder = builder.max_body(limit);
        }
        builder
    }
}

#[test]
fn interpreter_by_extension() {
    let cgi = CgiConfig::default();
    assert_eq!(cgi.interpreter_for(Path::new("/srv/hello.py")),
               Some(Path::new("/usr/bin/python3")));
    assert_eq!(cgi.interpreter_for(Path::new("/srv/post.rb")), None);
    assert_eq!(cgi.interpreter_for(Path::new("/srv/")), None);
}
