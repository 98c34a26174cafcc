//! Client configuration, loaded from a JSON file.
//!
//! Every field has a default, so an empty object (or no file at all) yields a
//! usable configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encoding::Encoding;
use crate::error::{ConfigError, ValidationError};
use crate::framer::DEFAULT_MAX_LINE_LEN;
use crate::model::Dimension;

/// Largest matrix side the device handles.
pub const DEVICE_MAX_DIM: u8 = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub limits: Limits,
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial device path or `socket://host:port`.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Read timeout of the background reader, 1..=10 ms.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of the chunk queue between reader and consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_baud() -> u32 {
    115_200
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            baud: default_baud(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl LinkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Order of the verification and confirmation steps in calculation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcFlow {
    /// Operands are echoed back before the operator confirms.
    #[default]
    EchoFirst,
    /// Unary operations go straight to confirmation after the operand is picked.
    ConfirmFirst,
}

/// Wire-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub encoding: Encoding,

    /// Accept a bare `gen`, `dis`, ... line as a mode switch, not only `mode-gen`.
    #[serde(default = "default_true")]
    pub accept_bare_mode_keys: bool,

    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    #[serde(default)]
    pub calc_flow: CalcFlow,
}

fn default_true() -> bool {
    true
}

fn default_max_line_len() -> usize {
    DEFAULT_MAX_LINE_LEN
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            accept_bare_mode_keys: true,
            max_line_len: default_max_line_len(),
            calc_flow: CalcFlow::default(),
        }
    }
}

/// Client-side bounds on operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_dim")]
    pub max_dim: u8,

    #[serde(default)]
    pub min_value: i64,

    #[serde(default = "default_max_value")]
    pub max_value: i64,

    #[serde(default = "default_max_generate_count")]
    pub max_generate_count: u32,
}

fn default_max_dim() -> u8 {
    DEVICE_MAX_DIM
}

fn default_max_value() -> i64 {
    9
}

fn default_max_generate_count() -> u32 {
    u8::MAX as u32
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dim: default_max_dim(),
            min_value: 0,
            max_value: default_max_value(),
            max_generate_count: default_max_generate_count(),
        }
    }
}

impl Limits {
    pub fn check_dims(&self, dims: Dimension) -> Result<(), ValidationError> {
        if dims.rows > self.max_dim || dims.cols > self.max_dim {
            return Err(ValidationError::DimensionOutOfRange {
                rows: dims.rows,
                cols: dims.cols,
                max: self.max_dim,
            });
        }
        Ok(())
    }

    pub fn check_values(&self, dims: Dimension, values: &[i64]) -> Result<(), ValidationError> {
        if values.len() != dims.len() {
            return Err(ValidationError::WrongValueCount {
                expected: dims.len(),
                actual: values.len(),
            });
        }
        for (index, &value) in values.iter().enumerate() {
            if value < self.min_value || value > self.max_value {
                return Err(ValidationError::ValueOutOfRange {
                    index,
                    value,
                    min: self.min_value,
                    max: self.max_value,
                });
            }
        }
        Ok(())
    }

    pub fn check_count(&self, count: u32) -> Result<(), ValidationError> {
        if count == 0 || count > self.max_generate_count {
            return Err(ValidationError::CountOutOfRange {
                count,
                max: self.max_generate_count,
            });
        }
        Ok(())
    }
}

impl Config {
    /// Reads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.link.poll_interval_ms) {
            return Err(ConfigError::Invalid(format!(
                "link.poll_interval_ms must be 1..=10, got {}",
                self.link.poll_interval_ms
            )));
        }
        if self.link.queue_capacity == 0 {
            return Err(ConfigError::Invalid("link.queue_capacity must be > 0".into()));
        }
        if self.protocol.max_line_len == 0 {
            return Err(ConfigError::Invalid("protocol.max_line_len must be > 0".into()));
        }
        if !(1..=DEVICE_MAX_DIM).contains(&self.limits.max_dim) {
            return Err(ConfigError::Invalid(format!(
                "limits.max_dim must be 1..={DEVICE_MAX_DIM}, got {}",
                self.limits.max_dim
            )));
        }
        if self.limits.min_value > self.limits.max_value {
            return Err(ConfigError::Invalid(format!(
                "limits.min_value {} exceeds limits.max_value {}",
                self.limits.min_value, self.limits.max_value
            )));
        }
        if self.limits.max_generate_count == 0 || self.limits.max_generate_count > u8::MAX as u32
        {
            return Err(ConfigError::Invalid(
                "limits.max_generate_count must be 1..=255".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.link.baud, 115_200);
        assert_eq!(config.link.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.protocol.encoding, Encoding::Raw);
        assert_eq!(config.limits.max_value, 9);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_json(
            r#"{ "protocol": { "encoding": "ascii", "calc_flow": "confirm_first" },
                 "limits": { "min_value": -5 } }"#,
        )
        .unwrap();
        assert_eq!(config.protocol.encoding, Encoding::Ascii);
        assert_eq!(config.protocol.calc_flow, CalcFlow::ConfirmFirst);
        assert!(config.protocol.accept_bare_mode_keys);
        assert_eq!(config.limits.min_value, -5);
        assert_eq!(config.limits.max_dim, 8);
    }

    #[test]
    fn rejects_slow_polling() {
        let err = Config::from_json(r#"{ "link": { "poll_interval_ms": 50 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_value_range() {
        let err = Config::from_json(r#"{ "limits": { "min_value": 5, "max_value": 1 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Config::from_json("{ nope").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "link": {{ "endpoint": "socket://localhost:7777" }} }}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.link.endpoint.as_deref(), Some("socket://localhost:7777"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/mx_client.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn limits_validate_operator_input() {
        let limits = Limits::default();
        let d = Dimension::new(2, 2).unwrap();
        assert!(limits.check_values(d, &[0, 1, 2, 9]).is_ok());
        assert_eq!(
            limits.check_values(d, &[0, 1, 2]),
            Err(ValidationError::WrongValueCount {
                expected: 4,
                actual: 3
            })
        );
        assert!(matches!(
            limits.check_values(d, &[0, 10, 2, 3]),
            Err(ValidationError::ValueOutOfRange { index: 1, .. })
        ));
        assert!(limits.check_dims(Dimension::new(9, 1).unwrap()).is_err());
        assert!(limits.check_count(0).is_err());
        assert!(limits.check_count(256).is_err());
    }
}
