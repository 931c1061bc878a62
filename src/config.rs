// ── Host configuration ────────────────────────────────────────────────────────
//
// Optional overrides for the two capability decisions this layer makes on
// its own: which filesystem code path to use and which clock to trust.
// Read from `KEEL_HOST_CONFIG`, which holds either inline JSON or the path
// of a JSON file.  Pure safe Rust over serde_json.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::once::InitCell;

/// Environment variable consulted by `HostConfig::global()`.
pub const CONFIG_ENV: &str = "KEEL_HOST_CONFIG";

// ── Document types ────────────────────────────────────────────────────────────

/// Which of the two Win32 filesystem code paths to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathApiPreference {
    /// Detect the kernel class once and pick accordingly.
    #[default]
    Auto,
    /// UTF-16 `*W` calls, atomic replace-on-rename.
    Wide,
    /// Single-byte `*A` calls, delete-then-rename emulation.
    Narrow,
}

/// Which time source backs `time::now_*`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockPreference {
    /// Monotonic counter when the host has one, calendar clock otherwise.
    #[default]
    Auto,
    Monotonic,
    /// Always use the calendar clock (not monotonic across adjustments).
    Calendar,
}

/// Root of the host config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub path_api: PathApiPreference,
    #[serde(default)]
    pub clock: ClockPreference,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl HostConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Interpret a `KEEL_HOST_CONFIG` value: JSON if it looks like an
    /// object, otherwise a file path.
    pub fn from_env_value(value: &str) -> Result<Self> {
        if value.trim_start().starts_with('{') {
            Self::from_json(value)
        } else {
            Self::load_file(value)
        }
    }

    /// The process-wide config, read once on first use.
    ///
    /// Returns defaults if the variable is unset, the file is missing, or
    /// the document does not parse; the layer keeps running either way.
    pub fn global() -> &'static HostConfig {
        static GLOBAL: InitCell<HostConfig> = InitCell::new();

        GLOBAL.get_or_init(|| {
            let Some(value) = std::env::var_os(CONFIG_ENV) else {
                return HostConfig::default();
            };
            let config = value
                .to_str()
                .and_then(|v| HostConfig::from_env_value(v).ok())
                .unwrap_or_default();
            tracing::debug!(?config, "keel: host config loaded");
            config
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_parses_as_defaults() {
        let cfg = HostConfig::from_json("{}").expect("parse");
        assert_eq!(cfg, HostConfig::default());
        assert_eq!(cfg.path_api, PathApiPreference::Auto);
        assert_eq!(cfg.clock, ClockPreference::Auto);
    }

    /// A document naming only one field must leave the other at its default.
    #[test]
    fn partial_document_keeps_other_defaults() {
        let cfg = HostConfig::from_json(r#"{"clock":"calendar"}"#).expect("parse");
        assert_eq!(cfg.clock, ClockPreference::Calendar);
        assert_eq!(cfg.path_api, PathApiPreference::Auto);
    }

    #[test]
    fn unknown_variant_is_an_error() {
        assert!(HostConfig::from_json(r#"{"path_api":"utf7"}"#).is_err());
    }

    #[test]
    fn env_value_accepts_inline_json_or_file() {
        let inline = HostConfig::from_env_value(r#" {"path_api":"narrow"}"#).expect("inline");
        assert_eq!(inline.path_api, PathApiPreference::Narrow);

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("host.json");
        fs::write(&file, r#"{"path_api":"wide","clock":"monotonic"}"#).expect("write");
        let loaded =
            HostConfig::from_env_value(file.to_str().expect("utf-8 temp path")).expect("file");
        assert_eq!(loaded.path_api, PathApiPreference::Wide);
        assert_eq!(loaded.clock, ClockPreference::Monotonic);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = HostConfig::load_file("/definitely/not/here/keel.json").expect_err("missing");
        assert!(matches!(err, crate::error::KeelError::Io(_)));
    }

    #[test]
    fn roundtrip() {
        let cfg = HostConfig {
            path_api: PathApiPreference::Narrow,
            clock: ClockPreference::Calendar,
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        assert_eq!(json, r#"{"path_api":"narrow","clock":"calendar"}"#);
        assert_eq!(HostConfig::from_json(&json).expect("deserialize"), cfg);
    }
}
