//! Configuration types

use crate::error::{ConfigError, MemoResult};
use crate::timestamp::{parse_asof, Asof};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which cache backend a process should start with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheKind {
    /// Nothing is stored.
    NoOp,
    /// Byte-bounded LRU; `None` means unbounded.
    InMemory { capacity_bytes: Option<u64> },
    /// Persistent cache rooted at `path`, with an in-memory front layer.
    File {
        path: PathBuf,
        front_capacity_bytes: u64,
    },
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoizerConfig {
    pub cache: CacheKind,
    /// Asof for the first scope; `None` keeps the default context's asof.
    pub asof: Option<Asof>,
    pub render_html: bool,
    pub render_csv: bool,
}

impl Default for MemoizerConfig {
    fn default() -> Self {
        Self {
            cache: CacheKind::InMemory {
                capacity_bytes: None,
            },
            asof: None,
            render_html: false,
            render_csv: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn env_u64(name: &str) -> MemoResult<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|e| {
            ConfigError::InvalidValue {
                field: name.to_string(),
                value,
                reason: e.to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

impl MemoizerConfig {
    /// Read configuration from `MEMOIZER_*` environment variables.
    ///
    /// - `MEMOIZER_CACHE_DIR`: use a file cache rooted here
    /// - `MEMOIZER_FRONT_CAPACITY_BYTES`: front layer size of the file cache
    /// - `MEMOIZER_MEMORY_CAPACITY_BYTES`: in-memory cache size when no dir is set
    /// - `MEMOIZER_NOOP`: disable caching entirely
    /// - `MEMOIZER_ASOF`: asof of the first scope, in timestamp format
    /// - `MEMOIZER_RENDER_HTML` / `MEMOIZER_RENDER_CSV`: render flags
    pub fn from_env() -> MemoResult<Self> {
        let cache = if env_flag("MEMOIZER_NOOP") {
            CacheKind::NoOp
        } else if let Ok(dir) = std::env::var("MEMOIZER_CACHE_DIR") {
            CacheKind::File {
                path: PathBuf::from(dir),
                front_capacity_bytes: env_u64("MEMOIZER_FRONT_CAPACITY_BYTES")?.unwrap_or(0),
            }
        } else {
            CacheKind::InMemory {
                capacity_bytes: env_u64("MEMOIZER_MEMORY_CAPACITY_BYTES")?,
            }
        };
        let asof = match std::env::var("MEMOIZER_ASOF") {
            Ok(value) => Some(parse_asof(&value)?),
            Err(_) => None,
        };
        let config = Self {
            cache,
            asof,
            render_html: env_flag("MEMOIZER_RENDER_HTML"),
            render_csv: env_flag("MEMOIZER_RENDER_CSV"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - in-memory capacity, when set, is positive
    /// - file cache path is not empty
    pub fn validate(&self) -> MemoResult<()> {
        match &self.cache {
            CacheKind::InMemory {
                capacity_bytes: Some(0),
            } => Err(ConfigError::InvalidValue {
                field: "capacity_bytes".to_string(),
                value: "0".to_string(),
                reason: "must be positive; use CacheKind::NoOp to disable caching".to_string(),
            }
            .into()),
            CacheKind::File { path, .. } if path.as_os_str().is_empty() => {
                Err(ConfigError::MissingRequired {
                    field: "cache_dir".to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoError;

    #[test]
    fn test_default_is_valid() {
        assert!(MemoizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = MemoizerConfig {
            cache: CacheKind::InMemory {
                capacity_bytes: Some(0),
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MemoError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_empty_file_path_rejected() {
        let config = MemoizerConfig {
            cache: CacheKind::File {
                path: PathBuf::new(),
                front_capacity_bytes: 0,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MemoError::Config(ConfigError::MissingRequired { .. }))
        ));
    }
}
