//! Optional JSON configuration file.

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use driver_core::{PlatformConfig, RunConfig};
use serde::Deserialize;

/// Top-level layout of the file. Missing sections and fields keep their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Run settings.
    pub run: RunConfig,
    /// Platform settings.
    pub platform: PlatformConfig,
}

impl ConfigFile {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid JSON for this
    /// layout.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Parses JSON text.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::ConfigFile;

    #[test]
    fn empty_object_keeps_defaults() {
        assert_eq!(ConfigFile::parse("{}").expect("valid"), ConfigFile::default());
    }

    #[test]
    fn trace_switches_can_be_set_per_category() {
        let file = ConfigFile::parse(r#"{"run": {"trace": {"mem": false}}}"#).expect("valid");
        assert!(!file.run.trace.mem);
        assert!(file.run.trace.instr);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(ConfigFile::parse(r#"{"tandem": true}"#).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ConfigFile::load(Path::new("/nonexistent/rvsim.json")).expect_err("missing");
        assert!(format!("{err:#}").contains("/nonexistent/rvsim.json"));
    }
}
