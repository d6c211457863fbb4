use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9880;
pub const DEFAULT_BODY_SIZE_LIMIT: usize = 32 * 1024 * 1024;

/// Listener settings.
///
/// Read from YAML, e.g.
///
/// ```yaml
/// bind: 127.0.0.1
/// port: 9880
/// body_size_limit: 10m
/// idle_timeout: 30
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind: String,
    pub port: u16,

    #[serde(deserialize_with = "deserialize_size")]
    pub body_size_limit: usize,

    /// Seconds a connection may sit without sending anything. Unset means
    /// connections are never timed out.
    #[serde(deserialize_with = "deserialize_timeout")]
    pub idle_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            body_size_limit: DEFAULT_BODY_SIZE_LIMIT,
            idle_timeout: None,
        }
    }
}

impl Config {
    /// Loads the file named by `INTAKE_CONFIG` (defaults if unset), then
    /// applies `INTAKE_BIND`, `INTAKE_PORT` and `INTAKE_BODY_SIZE_LIMIT`.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("INTAKE_CONFIG") {
            Ok(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                Self::from_yaml(&content).with_context(|| format!("invalid config file {path}"))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(bind) = std::env::var("INTAKE_BIND") {
            cfg.bind = bind;
        }
        if let Ok(port) = std::env::var("INTAKE_PORT") {
            cfg.port = port
                .parse()
                .with_context(|| format!("invalid INTAKE_PORT {port:?}"))?;
        }
        if let Ok(limit) = std::env::var("INTAKE_BODY_SIZE_LIMIT") {
            cfg.body_size_limit = parse_size(&limit)?;
        }

        Ok(cfg)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// `bind:port`, with IPv6 literals bracketed.
    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') && !self.bind.starts_with('[') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }
}

/// Resolves a size such as `512`, `64k` or `10m` to bytes. Suffixes are
/// powers of 1024 and case-insensitive.
pub fn parse_size(value: &str) -> anyhow::Result<usize> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let multiplier: usize = match c.to_ascii_lowercase() {
                'k' => 1 << 10,
                'm' => 1 << 20,
                'g' => 1 << 30,
                't' => 1 << 40,
                _ => anyhow::bail!("unknown size suffix in {value:?}"),
            };
            (&value[..i], multiplier)
        }
        _ => (value, 1),
    };

    let count: usize = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid size {value:?}"))?;

    count
        .checked_mul(multiplier)
        .with_context(|| format!("size {value:?} is too large"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(usize),
    Text(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(n) => Ok(n),
        SizeValue::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = Option::<f64>::deserialize(deserializer)?;
    match secs {
        Some(s) if !s.is_finite() || s <= 0.0 => Err(serde::de::Error::custom(
            "idle_timeout must be a positive number of seconds",
        )),
        other => Ok(other.map(Duration::from_secs_f64)),
    }
}
