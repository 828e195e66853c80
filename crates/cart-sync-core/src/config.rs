// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service, storage port, and the settings the cart engine reads.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Where cart settings are kept between runs, one blob per key.
pub trait ConfigStore {
    /// Raw bytes stored under `key`, or [`ConfigError::NotFound`].
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Replace whatever is stored under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Failure reading or writing cart settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing stored under the key yet.
    #[error("no saved settings")]
    NotFound,
    /// The backing store could not be read or written.
    #[error("settings storage: {0}")]
    Io(#[from] std::io::Error),
    /// Stored settings are not valid JSON for the requested type.
    #[error("settings {key:?} are not valid: {source}")]
    Serde {
        /// Key whose blob failed to (de)serialize.
        key: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Store-specific failure (e.g. no config directory on this platform).
    #[error("{0}")]
    Other(String),
}

/// JSON codec in front of a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wrap `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Give the store back.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Value stored under `key`; `Ok(None)` when nothing (or an empty blob)
    /// is stored.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        let bytes = match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => return Ok(None),
            Ok(bytes) => bytes,
            Err(ConfigError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ConfigError::Serde {
                key: key.to_string(),
                source,
            })
    }

    /// Store `value` under `key` as pretty JSON.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value).map_err(|source| ConfigError::Serde {
            key: key.to_string(),
            source,
        })?;
        self.store.save_raw(key, &data)
    }

    /// Saved [`CartPrefs`], writing the defaults on first use so users have a
    /// file to edit.
    pub fn cart_prefs(&self) -> Result<CartPrefs, ConfigError> {
        if let Some(prefs) = self.load(CartPrefs::KEY)? {
            return Ok(prefs);
        }
        let prefs = CartPrefs::default();
        self.save(CartPrefs::KEY, &prefs)?;
        Ok(prefs)
    }
}

/// Runtime knobs for [`CartEngine`](crate::engine::CartEngine).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single gateway call. `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// Reject enqueues once this many mutations are waiting. `None` is unbounded.
    pub max_pending: Option<usize>,
}

/// Persisted cart client preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartPrefs {
    /// API root, e.g. `https://shop.example/api`.
    pub base_url: String,
    /// Path of the cart resource under `base_url`.
    pub cart_path: String,
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: Option<u64>,
    /// Queue bound.
    pub max_pending: Option<usize>,
}

impl Default for CartPrefs {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".into(),
            cart_path: "/cart".into(),
            call_timeout_ms: None,
            max_pending: None,
        }
    }
}

impl CartPrefs {
    /// Config key under which prefs are stored.
    pub const KEY: &'static str = "cart_client";

    /// Engine settings derived from these prefs.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            call_timeout: self.call_timeout_ms.map(Duration::from_millis),
            max_pending: self.max_pending,
        }
    }
}
