//! Loading the trained model bundle for a speaker pair.

use crate::config::{read_json, PairConfig, SpeakerConfig};
use crate::paths::DataLayout;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use voxmorph_core::model::{F0Stats, GmmParams, GvPostfilter, GvStats, MixtureModel, PitchMapper};
use voxmorph_core::ConversionModels;

/// `stats/<speaker>.json`: log-F0 `[mean, std]` and GV `[[mean..], [var..]]`.
/// Only the target's file needs the GV section.
#[derive(Deserialize, Debug)]
struct SpeakerStats {
    #[serde(default)]
    f0stats: Option<(f64, f64)>,
    #[serde(default)]
    gv: Option<(Vec<f64>, Vec<f64>)>,
}

/// `model/cvgv.json`: GV of converted training data.
#[derive(Deserialize, Debug)]
struct ConvertedGv {
    cvgv: (Vec<f64>, Vec<f64>),
}

fn f0_stats(stats: &SpeakerStats, speaker: &str) -> Result<F0Stats> {
    let Some((mean, std)) = stats.f0stats else {
        bail!("statistics of '{speaker}' have no f0stats section");
    };
    F0Stats::new(mean, std).with_context(|| format!("bad f0 statistics for '{speaker}'"))
}

/// Reads every artifact of the `source`-`target` pair and assembles the
/// model bundle.
pub fn load_models(
    layout: &DataLayout,
    source: &str,
    target: &str,
    speaker: &SpeakerConfig,
    pair: &PairConfig,
    alpha: f64,
) -> Result<ConversionModels> {
    let params: GmmParams = read_json(&layout.gmm_model(source, target))?;
    if params.weights.len() != pair.n_mix {
        bail!(
            "GMM for {source}-{target} has {} mixtures, pair config says {}",
            params.weights.len(),
            pair.n_mix
        );
    }
    let spectral = MixtureModel::from_params(&params, pair.covariance_type)
        .with_context(|| format!("invalid GMM for {source}-{target}"))?;
    if spectral.static_dim() != speaker.mcep_dim {
        bail!(
            "GMM converts {} cepstral dimensions, speaker config has order {}",
            spectral.static_dim(),
            speaker.mcep_dim
        );
    }
    debug!(
        "GMM: {} mixtures, {:?} covariance, order {}",
        spectral.n_mix(),
        spectral.covariance_type(),
        spectral.static_dim()
    );

    let source_stats: SpeakerStats = read_json(&layout.speaker_stats(source, target, source))?;
    let target_stats: SpeakerStats = read_json(&layout.speaker_stats(source, target, target))?;
    let pitch = PitchMapper::new(
        f0_stats(&source_stats, source)?,
        f0_stats(&target_stats, target)?,
    );

    let cvgv: ConvertedGv = read_json(&layout.cvgv(source, target))?;
    let Some((target_mean, target_var)) = target_stats.gv else {
        bail!("statistics of '{target}' have no gv section");
    };
    let (cv_mean, cv_var) = cvgv.cvgv;
    let gv = GvPostfilter::new(
        GvStats::new(target_mean, target_var).context("bad target GV statistics")?,
        GvStats::new(cv_mean, cv_var).context("bad converted GV statistics")?,
        pair.gv_morph_coeff,
    )
    .context("GV statistics do not fit together")?;

    let models = ConversionModels::new(pitch, spectral, gv, pair.conversion_mode, alpha)
        .context("model artifacts do not fit together")?;
    info!(
        "loaded {source}-{target} models ({} mode, alpha {alpha})",
        pair.conversion_mode
    );
    Ok(models)
}
