//! Runtime configuration
//!
//! Read from environment variables (after `dotenv`). Every key is optional.

use crate::error::RagError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 150;
pub const DEFAULT_MAX_LENGTH: usize = 100;
pub const DEFAULT_HASHING_DIMS: usize = 384;

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    Gemini,
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(EmbedderKind::Gemini),
            "hashing" | "hash" | "offline" => Ok(EmbedderKind::Hashing),
            other => Err(RagError::Config(format!("unknown embedder '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub data_path: PathBuf,
    pub index_dir: PathBuf,
    pub top_k: usize,
    pub timeout: Duration,
    pub max_length: usize,
    pub embedder: EmbedderKind,
    pub hashing_dims: usize,
    pub gemini_api_key: String,
    pub port: u16,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/financials.json"),
            index_dir: PathBuf::from(".finrag"),
            top_k: DEFAULT_TOP_K,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_length: DEFAULT_MAX_LENGTH,
            embedder: EmbedderKind::Gemini,
            hashing_dims: DEFAULT_HASHING_DIMS,
            gemini_api_key: String::new(),
            port: 8080,
        }
    }
}

impl RagConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let embedder = match lookup("FINRAG_EMBEDDER") {
            Some(raw) => raw.parse()?,
            None => defaults.embedder,
        };

        let top_k: usize = parse_or(&lookup, "FINRAG_TOP_K", defaults.top_k)?;
        if top_k == 0 {
            return Err(RagError::Config("FINRAG_TOP_K must be at least 1".to_string()));
        }

        let hashing_dims: usize =
            parse_or(&lookup, "FINRAG_HASHING_DIMS", defaults.hashing_dims)?;
        if hashing_dims == 0 {
            return Err(RagError::Config(
                "FINRAG_HASHING_DIMS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            data_path: lookup("FINRAG_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            index_dir: lookup("FINRAG_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            top_k,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "FINRAG_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            max_length: parse_or(&lookup, "FINRAG_MAX_LENGTH", defaults.max_length)?,
            embedder,
            hashing_dims,
            gemini_api_key: lookup("GEMINI_API_KEY").unwrap_or_default(),
            port,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| RagError::Config(format!("invalid value for {}: '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.timeout, Duration::from_secs(150));
        assert_eq!(config.max_length, 100);
        assert_eq!(config.embedder, EmbedderKind::Gemini);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = RagConfig::from_lookup(lookup_from(&[
            ("FINRAG_TOP_K", "3"),
            ("FINRAG_TIMEOUT_SECS", "20"),
            ("FINRAG_EMBEDDER", "hashing"),
            ("API_PORT", "9000"),
            ("FINRAG_INDEX_DIR", "/tmp/idx"),
        ]))
        .unwrap();

        assert_eq!(config.top_k, 3);
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.embedder, EmbedderKind::Hashing);
        assert_eq!(config.port, 9000);
        assert_eq!(config.index_dir, PathBuf::from("/tmp/idx"));
    }

    #[test]
    fn test_invalid_values() {
        let err = RagConfig::from_lookup(lookup_from(&[("FINRAG_TOP_K", "many")])).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err = RagConfig::from_lookup(lookup_from(&[("FINRAG_TOP_K", "0")])).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err =
            RagConfig::from_lookup(lookup_from(&[("FINRAG_EMBEDDER", "word2vec")])).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
