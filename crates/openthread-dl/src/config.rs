//! Host configuration, loaded from JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use libc::c_int;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manager::{AdapterConfig, SedIntervalsConfig};

/// Largest setup pincode a joiner can encode.
const PINCODE_MAX: u32 = 99_999_998;
const DISCRIMINATOR_MAX: u16 = 0xfff;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Thread library version, the suffix of `libopenthread-<version>`.
    pub version: String,
    /// Radio co-processor serial port handed to the instance.
    pub com_port: String,
    pub debug: u16,
    pub device_number: u32,
    pub library_dir: PathBuf,
    pub lazy_binding: bool,
    pub global_symbols: bool,
    pub ftd: bool,
    pub sleepy: bool,
    pub synchronized_sleepy: bool,
    pub active_interval_ms: u64,
    pub idle_interval_ms: u64,
    pub active_threshold_ms: u64,
    pub discriminator: u16,
    pub pincode: u32,
}

impl Default for StackConfig {
    fn default() -> Self {
        let adapter = AdapterConfig::default();
        StackConfig {
            version: "1.3".to_string(),
            com_port: "/dev/ttyACM0".to_string(),
            debug: 0,
            device_number: 0,
            library_dir: PathBuf::from("lib"),
            lazy_binding: true,
            global_symbols: true,
            ftd: adapter.ftd,
            sleepy: adapter.sleepy,
            synchronized_sleepy: adapter.synchronized_sleepy,
            active_interval_ms: adapter.sed_intervals.active_interval.as_millis() as u64,
            idle_interval_ms: adapter.sed_intervals.idle_interval.as_millis() as u64,
            active_threshold_ms: adapter.sed_active_threshold.as_millis() as u64,
            discriminator: adapter.joiner_discriminator,
            pincode: adapter.joiner_pincode,
        }
    }
}

impl StackConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = StackConfig::from_json(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: StackConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::Config("version must not be empty".into()));
        }
        if self.discriminator > DISCRIMINATOR_MAX {
            return Err(Error::Config(format!("discriminator {} exceeds 12 bits", self.discriminator)));
        }
        if self.pincode == 0 || self.pincode > PINCODE_MAX {
            return Err(Error::Config(format!("invalid pincode {}", self.pincode)));
        }
        if self.synchronized_sleepy && !self.sleepy {
            return Err(Error::Config("synchronized_sleepy requires sleepy".into()));
        }
        if self.sleepy && (self.active_interval_ms == 0 || self.idle_interval_ms < self.active_interval_ms) {
            return Err(Error::Config("idle interval must be at least the active interval".into()));
        }
        Ok(())
    }

    pub fn library_path(&self) -> PathBuf {
        self.library_dir.join(format!("libopenthread-{}", self.version))
    }

    /// `dlopen` flags for the binding options.
    pub fn open_flags(&self) -> c_int {
        let binding = if self.lazy_binding {
            libc::RTLD_LAZY
        } else {
            libc::RTLD_NOW
        };
        let visibility = if self.global_symbols {
            libc::RTLD_GLOBAL
        } else {
            libc::RTLD_LOCAL
        };
        binding | visibility
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            ftd: self.ftd,
            sleepy: self.sleepy,
            synchronized_sleepy: self.synchronized_sleepy,
            sed_intervals: SedIntervalsConfig {
                active_interval: Duration::from_millis(self.active_interval_ms),
                idle_interval: Duration::from_millis(self.idle_interval_ms),
            },
            sed_active_threshold: Duration::from_millis(self.active_threshold_ms),
            joiner_discriminator: self.discriminator,
            joiner_pincode: self.pincode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_adapter() {
        let config = StackConfig::default();
        assert_eq!(config.adapter_config(), AdapterConfig::default());
        assert_eq!(config.open_flags(), crate::ffi::default_open_flags());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = StackConfig::from_json(r#"{"version": "1.4", "library_dir": "/opt/thread", "ftd": false}"#).unwrap();
        assert_eq!(config.library_path(), PathBuf::from("/opt/thread/libopenthread-1.4"));
        assert!(!config.adapter_config().ftd);
        assert_eq!(config.pincode, 20202021);
    }

    #[test]
    fn immediate_local_binding() {
        let config = StackConfig {
            lazy_binding: false,
            global_symbols: false,
            ..Default::default()
        };
        assert_eq!(config.open_flags(), libc::RTLD_NOW | libc::RTLD_LOCAL);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(StackConfig::from_json(r#"{"version": ""}"#), Err(Error::Config(_))));
        assert!(matches!(StackConfig::from_json(r#"{"discriminator": 4096}"#), Err(Error::Config(_))));
        assert!(matches!(StackConfig::from_json(r#"{"pincode": 0}"#), Err(Error::Config(_))));
        assert!(matches!(
            StackConfig::from_json(r#"{"sleepy": true, "active_interval_ms": 500, "idle_interval_ms": 100}"#),
            Err(Error::Config(_))
        ));
        assert!(StackConfig::from_json("not json").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"com_port": "/dev/ttyUSB1", "debug": 3}}"#).unwrap();
        let config = StackConfig::load(file.path()).unwrap();
        assert_eq!(config.com_port, "/dev/ttyUSB1");
        assert_eq!(config.debug, 3);
        assert!(matches!(StackConfig::load("/nonexistent/otdl.json"), Err(Error::Config(_))));
    }
}
