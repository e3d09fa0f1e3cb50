use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// How source maps produced by the transformer are emitted.
///
/// - `Off`: maps are neither requested nor written.
/// - `File`: maps are written next to the output as `<output>.map` and the
///   output gets a trailing `sourceMappingURL` comment.
/// - `Inline`: the transformer is asked to embed the map in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapMode {
    #[default]
    Off,
    File,
    Inline,
}

impl SourceMapMode {
    pub fn writes_sidecar(self) -> bool {
        self == SourceMapMode::File
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceMapMode::Off => "false",
            SourceMapMode::File => "true",
            SourceMapMode::Inline => "inline",
        }
    }
}

impl fmt::Display for SourceMapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "file" => Ok(SourceMapMode::File),
            "false" | "off" => Ok(SourceMapMode::Off),
            "inline" => Ok(SourceMapMode::Inline),
            other => Err(format!(
                "invalid source map mode: {other} (expected true, false or \"inline\")"
            )),
        }
    }
}

// In TOML the value is either a boolean or the string "inline".
impl<'de> Deserialize<'de> for SourceMapMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Named(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(SourceMapMode::File),
            Repr::Flag(false) => Ok(SourceMapMode::Off),
            Repr::Named(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// What a cache record stores to decide whether a file is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintPolicy {
    /// blake3 hash of the file contents.
    #[default]
    Content,
    /// Modification timestamp of the file.
    Mtime,
}

impl FromStr for FingerprintPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "content" | "hash" => Ok(FingerprintPolicy::Content),
            "mtime" => Ok(FingerprintPolicy::Mtime),
            other => Err(format!(
                "invalid fingerprint policy: {other} (expected \"content\" or \"mtime\")"
            )),
        }
    }
}

/// Mode for storing file fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageMode {
    /// Store fingerprints in a file under the cache directory.
    #[default]
    File,
    /// Store fingerprints in memory only (lost on restart).
    Memory,
}

impl FromStr for CacheStorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CacheStorageMode::File),
            "memory" => Ok(CacheStorageMode::Memory),
            other => Err(format!(
                "invalid cache storage mode: {other} (expected \"file\" or \"memory\")"
            )),
        }
    }
}
