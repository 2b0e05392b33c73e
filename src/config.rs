// THEORY:
// Tunable parameters for the pipeline. `PipelineConfig` is the validated,
// in-memory form; its `Default` carries the values the engine was tuned with.
// A TOML file may override any subset of them: it is parsed into an all-`Option`
// mirror (`PipelineConfigFile`) and laid over the defaults, so a file only needs
// to mention what it changes.
//
// Example file:
//
//     [background]
//     epsilon = 24
//     cth = 4
//
//     [density]
//     kind = "horizontal"
//     wheel_size = 9
//
//     [blobs]
//     threshold = 6
//     min_area = 750

use crate::core_modules::density_scanner::{DensityKind, MAX_WHEEL_SIZE};
use crate::error::{VisionError, VisionResult};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_EPSILON: u32 = 33;
pub const DEFAULT_CTH: u32 = 4;
pub const DEFAULT_DEC_RATE: u32 = 2;
pub const DEFAULT_WHEEL_SIZE: usize = 7;
pub const DEFAULT_BTH: u32 = 20;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    background: Option<BackgroundConfigFile>,
    density: Option<DensityConfigFile>,
    blobs: Option<BlobConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BackgroundConfigFile {
    epsilon: Option<u32>,
    cth: Option<u32>,
    dec_rate: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DensityConfigFile {
    kind: Option<DensityKind>,
    wheel_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BlobConfigFile {
    threshold: Option<u32>,
    min_area: Option<usize>,
    id_map: Option<bool>,
}

/// Configuration for the `VisionPipeline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Per-channel match tolerance against a cell's mean color.
    pub epsilon: u32,
    /// Observations a cell needs before it counts as background; also the
    /// pruning threshold for decimation.
    pub cth: u32,
    /// Processed frames between decimations.
    pub dec_rate: u32,
    /// Window shape of the density scan.
    pub density: DensityKind,
    /// Window edge length of the density scan.
    pub wheel_size: usize,
    /// Minimum density for a pixel to belong to a blob.
    pub bth: u32,
    /// Blobs smaller than this are dropped from reports.
    pub min_blob_area: Option<usize>,
    /// Whether reports carry a per-pixel blob ID map.
    pub id_map: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            cth: DEFAULT_CTH,
            dec_rate: DEFAULT_DEC_RATE,
            density: DensityKind::default(),
            wheel_size: DEFAULT_WHEEL_SIZE,
            bth: DEFAULT_BTH,
            min_blob_area: None,
            id_map: false,
        }
    }
}

impl PipelineConfig {
    /// Checks every frame-independent constraint.
    pub fn validate(&self) -> VisionResult<()> {
        if self.cth == 0 {
            return Err(invalid("cth", "must be at least 1"));
        }
        if self.dec_rate == 0 {
            return Err(invalid("dec_rate", "must be at least 1"));
        }
        if self.wheel_size == 0 || self.wheel_size > MAX_WHEEL_SIZE {
            return Err(VisionError::InvalidWheelSize {
                wheel_size: self.wheel_size,
                max: MAX_WHEEL_SIZE,
            });
        }
        let max_density = self.density.max_value(self.wheel_size);
        if self.bth > max_density {
            return Err(invalid(
                "bth",
                &format!("{} exceeds the largest {:?} density {}", self.bth, self.density, max_density),
            ));
        }
        Ok(())
    }

    fn overlay(mut self, file: PipelineConfigFile) -> Self {
        if let Some(background) = file.background {
            self.epsilon = background.epsilon.unwrap_or(self.epsilon);
            self.cth = background.cth.unwrap_or(self.cth);
            self.dec_rate = background.dec_rate.unwrap_or(self.dec_rate);
        }
        if let Some(density) = file.density {
            self.density = density.kind.unwrap_or(self.density);
            self.wheel_size = density.wheel_size.unwrap_or(self.wheel_size);
        }
        if let Some(blobs) = file.blobs {
            self.bth = blobs.threshold.unwrap_or(self.bth);
            self.min_blob_area = blobs.min_area.or(self.min_blob_area);
            self.id_map = blobs.id_map.unwrap_or(self.id_map);
        }
        self
    }
}

fn invalid(name: &'static str, reason: &str) -> VisionError {
    VisionError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

/// Parses TOML text over the defaults and validates the result.
pub fn parse_config(text: &str) -> VisionResult<PipelineConfig> {
    let file: PipelineConfigFile = toml::from_str(text).map_err(|err| VisionError::Config(err.to_string()))?;
    let config = PipelineConfig::default().overlay(file);
    config.validate()?;
    Ok(config)
}

/// Reads a TOML config file over the defaults and validates the result.
pub fn load_config(path: &Path) -> VisionResult<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| VisionError::Config(format!("failed to read {}: {err}", path.display())))?;
    parse_config(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!((config.epsilon, config.cth, config.dec_rate), (33, 4, 2));
        assert_eq!((config.wheel_size, config.bth), (7, 20));
        assert_eq!(config.density, DensityKind::Area);
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[background]\nepsilon = 12\n\n[density]\nkind = \"vertical\"\nwheel_size = 9\n\n[blobs]\nthreshold = 6\nmin_area = 750\nid_map = true"
        )
        .expect("write config");

        let config = load_config(file.path()).expect("config loads");
        assert_eq!(config.epsilon, 12);
        assert_eq!(config.cth, DEFAULT_CTH);
        assert_eq!(config.density, DensityKind::Vertical);
        assert_eq!(config.wheel_size, 9);
        assert_eq!(config.bth, 6);
        assert_eq!(config.min_blob_area, Some(750));
        assert!(config.id_map);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            parse_config("[background]\ncth = 0"),
            Err(VisionError::InvalidParameter { name: "cth", .. })
        ));
        // A horizontal 7-wide window never exceeds 7.
        assert!(matches!(
            parse_config("[density]\nkind = \"horizontal\""),
            Err(VisionError::InvalidParameter { name: "bth", .. })
        ));
        assert!(matches!(
            parse_config("[density]\nwheel_size = 65"),
            Err(VisionError::InvalidWheelSize { .. })
        ));
        assert!(matches!(parse_config("[blobs]\nsize = 3"), Err(VisionError::Config(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, VisionError::Config(_)));
    }
}
