use crate::glob::glob_match;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Reaper cycles per second; 0 turns the reaper off.
    pub hz: u64,
    pub shards: usize,
    /// Volatile keys tested per shard per reaper pass.
    pub reaper_sample: usize,
    /// Messages a subscriber may have in flight before further ones are dropped.
    pub pubsub_buffer: usize,
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            hz: 10,
            shards: crate::store::DEFAULT_SHARDS,
            reaper_sample: 20,
            pubsub_buffer: 1024,
            loglevel: "notice".to_string(),
        }
    }
}

/// Redis log level names mapped onto `tracing` directives.
pub fn tracing_directive(loglevel: &str) -> Option<&'static str> {
    match loglevel.to_ascii_lowercase().as_str() {
        "debug" => Some("debug"),
        "verbose" => Some("debug"),
        "notice" => Some("info"),
        "warning" => Some("warn"),
        "nothing" => Some("off"),
        _ => None,
    }
}

const PARAMETERS: &[&str] =
    &["bind", "port", "hz", "shards", "reaper-sample", "pubsub-buffer", "loglevel"];

impl Config {
    /// Parse `--flag value` pairs. Unknown flags and unparsable values are skipped.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Config::default();
        let mut i = 0;
        while i + 1 < args.len() {
            let Some(name) = args[i].strip_prefix("--") else {
                i += 1;
                continue;
            };
            if config.apply(name, &args[i + 1], true).is_err() {
                tracing::warn!(flag = %args[i], value = %args[i + 1], "ignoring bad startup flag");
            }
            i += 2;
        }
        config
    }

    pub fn get(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "bind" => Some(self.bind.clone()),
            "port" => Some(self.port.to_string()),
            "hz" => Some(self.hz.to_string()),
            "shards" => Some(self.shards.to_string()),
            "reaper-sample" => Some(self.reaper_sample.to_string()),
            "pubsub-buffer" => Some(self.pubsub_buffer.to_string()),
            "loglevel" => Some(self.loglevel.clone()),
            _ => None,
        }
    }

    /// `(name, value)` pairs whose name matches the glob, for CONFIG GET.
    pub fn matching(&self, pattern: &[u8]) -> Vec<(String, String)> {
        PARAMETERS
            .iter()
            .filter(|p| glob_match(pattern, p.as_bytes()))
            .filter_map(|p| self.get(p).map(|v| (p.to_string(), v)))
            .collect()
    }

    /// CONFIG SET. Only the parameters that can change under a running server
    /// are accepted here.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        self.apply(name, value, false)
    }

    fn apply(&mut self, name: &str, value: &str, startup: bool) -> Result<(), String> {
        let invalid = || format!("argument couldn't be parsed into an integer ('{value}')");
        match name.to_ascii_lowercase().as_str() {
            "hz" => self.hz = value.parse().map_err(|_| invalid())?,
            "reaper-sample" => {
                self.reaper_sample = value.parse().map_err(|_| invalid())?;
                if self.reaper_sample == 0 {
                    return Err("reaper-sample must be positive".to_string());
                }
            }
            "bind" if startup => self.bind = value.to_string(),
            "port" if startup => self.port = value.parse().map_err(|_| invalid())?,
            "shards" if startup => self.shards = value.parse().map_err(|_| invalid())?,
            "pubsub-buffer" if startup => {
                self.pubsub_buffer = value.parse().map_err(|_| invalid())?
            }
            "loglevel" if startup => {
                tracing_directive(value).ok_or_else(|| format!("invalid loglevel '{value}'"))?;
                self.loglevel = value.to_ascii_lowercase();
            }
            other if PARAMETERS.contains(&other) => {
                return Err(format!("parameter '{other}' can only be set at startup"));
            }
            other => return Err(format!("Unknown option or number of arguments for CONFIG SET - '{other}'")),
        }
        Ok(())
    }
}

/// Read with `.read()`, never held across an await.
pub type SharedConfig = Arc<RwLock<Config>>;
