//! Player configuration: output sinks and the media directory.
//!
//! Two on-disk formats are accepted. The plain one is a `key value` line per
//! setting, `#` comments and blank lines allowed:
//!
//! ```text
//! # main outputs
//! speakers   alsa_output.pci-0000_00_1f.3.analog-stereo
//! headphones alsa_output.usb-headset.analog-stereo
//! mp3dir     /home/dj/music
//! ```
//!
//! Files ending in `.json` are read as a serialized [`Config`] instead.

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{backend::AudioBackend, AudioError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to open the configuration file {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in configuration file on line {line}")]
    Syntax { line: usize },

    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown configuration variable: {0}")]
    UnknownVariable(String),

    #[error("{0} is not set")]
    NotSet(ConfigVar),

    #[error("invalid device name for audio output: {0}")]
    UnknownDevice(String),

    #[error("cannot open directory {}: {source}", path.display())]
    BadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Names of the settable variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigVar {
    Speakers,
    Headphones,
    Mp3Dir,
}

impl ConfigVar {
    pub const ALL: [ConfigVar; 3] = [ConfigVar::Speakers, ConfigVar::Headphones, ConfigVar::Mp3Dir];

    pub fn key(self) -> &'static str {
        match self {
            ConfigVar::Speakers => "speakers",
            ConfigVar::Headphones => "headphones",
            ConfigVar::Mp3Dir => "mp3dir",
        }
    }
}

impl fmt::Display for ConfigVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ConfigVar {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigVar::ALL
            .into_iter()
            .find(|v| v.key() == s)
            .ok_or_else(|| ConfigError::UnknownVariable(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub speakers: Option<String>,
    #[serde(default)]
    pub headphones: Option<String>,
    #[serde(default, rename = "mp3dir")]
    pub mp3_dir: Option<PathBuf>,
}

impl Config {
    pub fn get(&self, var: ConfigVar) -> Option<String> {
        match var {
            ConfigVar::Speakers => self.speakers.clone(),
            ConfigVar::Headphones => self.headphones.clone(),
            ConfigVar::Mp3Dir => self.mp3_dir.as_ref().map(|p| p.display().to_string()),
        }
    }

    pub fn set(&mut self, var: ConfigVar, value: &str) {
        let value = value.trim().to_string();
        match var {
            ConfigVar::Speakers => self.speakers = Some(value),
            ConfigVar::Headphones => self.headphones = Some(value),
            ConfigVar::Mp3Dir => self.mp3_dir = Some(PathBuf::from(value)),
        }
    }

    /// Merge settings from `path` into `self`.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            let loaded: Config = serde_json::from_str(&text)?;
            self.merge(loaded);
            log::info!("Loaded JSON configuration from {}", path.display());
            Ok(())
        } else {
            let result = self.apply_lines(&text);
            log::info!("Loaded configuration from {}", path.display());
            result
        }
    }

    /// Apply `key value` lines. Every valid line is applied; the first
    /// malformed one is reported.
    pub fn apply_lines(&mut self, text: &str) -> Result<(), ConfigError> {
        let mut first_error = None;
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) if !v.trim().is_empty() => (k, v.trim()),
                _ => {
                    log::warn!("Configuration line {}: missing value", i + 1);
                    first_error.get_or_insert(ConfigError::Syntax { line: i + 1 });
                    continue;
                }
            };
            match key.parse::<ConfigVar>() {
                Ok(var) => self.set(var, value),
                Err(_) => {
                    log::warn!("Configuration line {}: unknown key {key}", i + 1);
                    first_error.get_or_insert(ConfigError::Syntax { line: i + 1 });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn merge(&mut self, other: Config) {
        if other.speakers.is_some() {
            self.speakers = other.speakers;
        }
        if other.headphones.is_some() {
            self.headphones = other.headphones;
        }
        if other.mp3_dir.is_some() {
            self.mp3_dir = other.mp3_dir;
        }
    }

    /// Validate one setting: sinks must be known to `backend`, the media
    /// directory must be openable.
    pub fn check(&self, var: ConfigVar, backend: &dyn AudioBackend) -> Result<(), ConfigError> {
        match var {
            ConfigVar::Speakers | ConfigVar::Headphones => {
                let sink = self.get(var).ok_or(ConfigError::NotSet(var))?;
                if backend.device_exists(&sink)? {
                    Ok(())
                } else {
                    Err(ConfigError::UnknownDevice(sink))
                }
            }
            ConfigVar::Mp3Dir => {
                let dir = self.mp3_dir.as_ref().ok_or(ConfigError::NotSet(var))?;
                fs::read_dir(dir)
                    .map(|_| ())
                    .map_err(|source| ConfigError::BadDirectory {
                        path: dir.clone(),
                        source,
                    })
            }
        }
    }

    /// Resolve a media path: used as given if it exists, otherwise relative
    /// to the media directory.
    pub fn resolve_media(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        match &self.mp3_dir {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }
}
