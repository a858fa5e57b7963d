use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use voxmorph_core::model::{ConversionMode, CovarianceType};
use voxmorph_core::{AnalysisConfig, SynthesisConfig};

/// Per-speaker analysis settings (`conf/speaker/<name>.json`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpeakerConfig {
    pub sample_rate: u32,
    #[serde(default = "default_fftl")]
    pub fftl: usize,
    #[serde(default = "default_shift_ms")]
    pub shift_ms: f64,
    #[serde(default = "default_min_f0")]
    pub min_f0: f64,
    #[serde(default = "default_max_f0")]
    pub max_f0: f64,
    #[serde(default = "default_mcep_dim")]
    pub mcep_dim: usize,
    #[serde(default = "default_mcep_alpha")]
    pub mcep_alpha: f64,
}

fn default_fftl() -> usize {
    1024
}

fn default_shift_ms() -> f64 {
    5.0
}

fn default_min_f0() -> f64 {
    50.0
}

fn default_max_f0() -> f64 {
    500.0
}

fn default_mcep_dim() -> usize {
    24
}

fn default_mcep_alpha() -> f64 {
    0.42
}

/// Settings of one trained source/target pair
/// (`conf/pair/<source>-<target>.json`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PairConfig {
    #[serde(default = "default_n_mix")]
    pub n_mix: usize,
    #[serde(default = "default_covariance_type")]
    pub covariance_type: CovarianceType,
    #[serde(default = "default_conversion_mode")]
    pub conversion_mode: ConversionMode,
    #[serde(default = "default_gv_morph_coeff")]
    pub gv_morph_coeff: f64,
}

fn default_n_mix() -> usize {
    32
}

fn default_covariance_type() -> CovarianceType {
    CovarianceType::Full
}

fn default_conversion_mode() -> ConversionMode {
    ConversionMode::Mlpg
}

fn default_gv_morph_coeff() -> f64 {
    1.0
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            n_mix: default_n_mix(),
            covariance_type: default_covariance_type(),
            conversion_mode: default_conversion_mode(),
            gv_morph_coeff: default_gv_morph_coeff(),
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

impl SpeakerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Analysis settings, with the warping coefficient optionally replaced.
    pub fn analysis_config(&self, alpha: Option<f64>) -> AnalysisConfig {
        AnalysisConfig {
            sample_rate: self.sample_rate,
            fftl: self.fftl,
            shift_ms: self.shift_ms,
            min_f0: self.min_f0,
            max_f0: self.max_f0,
            mcep_dim: self.mcep_dim,
            mcep_alpha: alpha.unwrap_or(self.mcep_alpha),
        }
    }

    pub fn synthesis_config(&self, alpha: Option<f64>) -> SynthesisConfig {
        SynthesisConfig {
            sample_rate: self.sample_rate,
            fftl: self.fftl,
            shift_ms: self.shift_ms,
            mcep_alpha: alpha.unwrap_or(self.mcep_alpha),
        }
    }
}

impl PairConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_speaker_defaults() {
        let file = write_temp(r#"{"sample_rate":16000}"#);
        let config = SpeakerConfig::load(file.path()).unwrap();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.fftl, 1024);
        assert_eq!(config.shift_ms, 5.0);
        assert_eq!(config.min_f0, 50.0);
        assert_eq!(config.max_f0, 500.0);
        assert_eq!(config.mcep_dim, 24);
        assert_eq!(config.mcep_alpha, 0.42);
    }

    #[test]
    fn test_speaker_requires_sample_rate() {
        let file = write_temp(r#"{"fftl":512}"#);
        let err = SpeakerConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("sample_rate"));
    }

    #[test]
    fn test_alpha_override() {
        let config: SpeakerConfig =
            serde_json::from_str(r#"{"sample_rate":22050,"mcep_alpha":0.455}"#).unwrap();
        assert_eq!(config.analysis_config(None).mcep_alpha, 0.455);
        assert_eq!(config.analysis_config(Some(0.3)).mcep_alpha, 0.3);
        assert_eq!(config.synthesis_config(Some(0.3)).mcep_alpha, 0.3);
        assert_eq!(config.synthesis_config(None).sample_rate, 22050);
    }

    #[test]
    fn test_pair_defaults_and_enums() {
        let config: PairConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PairConfig::default());
        assert_eq!(config.covariance_type, CovarianceType::Full);
        assert_eq!(config.conversion_mode, ConversionMode::Mlpg);

        let config: PairConfig = serde_json::from_str(
            r#"{"n_mix":8,"covariance_type":"diag","conversion_mode":"mmse","gv_morph_coeff":0.5}"#,
        )
        .unwrap();
        assert_eq!(config.n_mix, 8);
        assert_eq!(config.covariance_type, CovarianceType::Diag);
        assert_eq!(config.conversion_mode, ConversionMode::Mmse);
        assert_eq!(config.gv_morph_coeff, 0.5);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = PairConfig::load(Path::new("/nonexistent/voxmorph/pair.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/voxmorph/pair.json"));
    }
}
