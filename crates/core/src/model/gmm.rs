//! Joint-density GMM regression from source to target cepstra.
//!
//! The model is trained on stacked `[source; target]` static+delta vectors.
//! At load time each component is split into its source and target blocks and
//! the conditional mean `mu_y + A (x - mu_x)` and conditional covariance are
//! precomputed, so converting a frame is a posterior computation plus a few
//! matrix-vector products.

use super::delta::delta_terms;
use super::linalg::{cholesky, cholesky_banded, cholesky_solve, forward_substitute, log_det};
use crate::error::{ModelError, StageError};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    Full,
    Diag,
}

/// How the regression output is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Posterior-weighted conditional mean, frame by frame.
    Mmse,
    /// Most likely component per frame, then a maximum-likelihood static
    /// trajectory over all frames of the block.
    Mlpg,
}

impl FromStr for ConversionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mmse" => Ok(Self::Mmse),
            "mlpg" => Ok(Self::Mlpg),
            other => Err(format!("unknown conversion mode '{other}'")),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mmse => "mmse",
            Self::Mlpg => "mlpg",
        })
    }
}

/// Raw mixture parameters as stored in the model artifact.
///
/// `means` rows have `4D` entries (`[src static, src delta, tgt static, tgt
/// delta]`). `covariances` rows hold `4D` diagonal entries or a row-major
/// `4D × 4D` matrix, depending on the covariance type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmmParams {
    pub weights: Vec<f64>,
    pub means: Vec<Vec<f64>>,
    pub covariances: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct Component {
    log_weight: f64,
    mean_x: Array1<f64>,
    mean_y: Array1<f64>,
    chol_xx: Array2<f64>,
    log_det_xx: f64,
    /// `Σyx Σxx⁻¹`
    regression: Array2<f64>,
    /// Reciprocal diagonal of `Σyy - Σyx Σxx⁻¹ Σxy`.
    precision: Array1<f64>,
}

impl Component {
    fn log_density(&self, x: ArrayView1<f64>) -> f64 {
        let centered = &x - &self.mean_x;
        let z = forward_substitute(self.chol_xx.view(), centered.view());
        let n = x.len() as f64;
        -0.5 * (n * (2.0 * PI).ln() + self.log_det_xx + z.dot(&z))
    }

    fn conditional_mean(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let centered = &x - &self.mean_x;
        &self.mean_y + &self.regression.dot(&centered)
    }
}

#[derive(Debug, Clone)]
pub struct MixtureModel {
    components: Vec<Component>,
    covariance_type: CovarianceType,
    /// Width of the source (and target) static+delta block.
    feature_dim: usize,
}

impl MixtureModel {
    pub fn from_params(params: &GmmParams, covariance_type: CovarianceType) -> Result<Self, ModelError> {
        let n_mix = params.weights.len();
        if n_mix == 0 {
            return Err(ModelError::Empty);
        }
        for (what, found) in [
            ("mixture means", params.means.len()),
            ("mixture covariances", params.covariances.len()),
        ] {
            if found != n_mix {
                return Err(ModelError::Shape {
                    what,
                    expected: n_mix,
                    found,
                });
            }
        }
        let joint_dim = params.means[0].len();
        if joint_dim == 0 || joint_dim % 4 != 0 {
            return Err(ModelError::InvalidStatistic(format!(
                "joint mean width {joint_dim} is not a multiple of 4"
            )));
        }
        let components = (0..n_mix)
            .map(|m| build_component(params, m, joint_dim, covariance_type))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            components,
            covariance_type,
            feature_dim: joint_dim / 2,
        })
    }

    pub fn n_mix(&self) -> usize {
        self.components.len()
    }

    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    /// Number of static cepstral dimensions the model converts.
    pub fn static_dim(&self) -> usize {
        self.feature_dim / 2
    }

    /// Component posteriors for one static+delta source vector.
    pub fn posteriors(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let log_joint: Array1<f64> = self
            .components
            .iter()
            .map(|c| c.log_weight + c.log_density(x))
            .collect();
        let max = log_joint.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let unnormalized = log_joint.mapv(|v| (v - max).exp());
        let total = unnormalized.sum();
        unnormalized / total
    }

    /// Converts `T × 2D` static+delta source features to `T × D` static
    /// target features.
    pub fn convert(&self, source: ArrayView2<f64>, mode: ConversionMode) -> Result<Array2<f64>, StageError> {
        if source.ncols() != self.feature_dim {
            return Err(StageError::ShapeMismatch(format!(
                "mixture model expects {} static+delta columns, got {}",
                self.feature_dim,
                source.ncols()
            )));
        }
        Ok(match mode {
            ConversionMode::Mmse => self.convert_mmse(source),
            ConversionMode::Mlpg => self.convert_mlpg(source),
        })
    }

    fn convert_mmse(&self, source: ArrayView2<f64>) -> Array2<f64> {
        let dim = self.static_dim();
        let mut out = Array2::<f64>::zeros((source.nrows(), dim));
        for (t, x) in source.outer_iter().enumerate() {
            let gamma = self.posteriors(x);
            let mut row = out.row_mut(t);
            for (component, &weight) in self.components.iter().zip(gamma.iter()) {
                let mean = component.conditional_mean(x);
                row.scaled_add(weight, &mean.slice(s![..dim]));
            }
        }
        out
    }

    fn convert_mlpg(&self, source: ArrayView2<f64>) -> Array2<f64> {
        let len = source.nrows();
        let dim = self.static_dim();
        let mut means = Array2::<f64>::zeros((len, self.feature_dim));
        let mut precisions = Array2::<f64>::zeros((len, self.feature_dim));
        for (t, x) in source.outer_iter().enumerate() {
            let best = argmax(self.posteriors(x).view());
            let component = &self.components[best];
            means.row_mut(t).assign(&component.conditional_mean(x));
            precisions.row_mut(t).assign(&component.precision);
        }

        let mut out = Array2::<f64>::zeros((len, dim));
        for d in 0..dim {
            let trajectory = solve_trajectory(
                means.column(d),
                precisions.column(d),
                means.column(dim + d),
                precisions.column(dim + d),
            );
            out.column_mut(d).assign(&trajectory);
        }
        out
    }
}

fn build_component(
    params: &GmmParams,
    m: usize,
    joint_dim: usize,
    covariance_type: CovarianceType,
) -> Result<Component, ModelError> {
    let weight = params.weights[m];
    if !(weight > 0.0 && weight.is_finite()) {
        return Err(ModelError::InvalidStatistic(format!(
            "mixture weight {m} is {weight}"
        )));
    }
    let mean = &params.means[m];
    if mean.len() != joint_dim {
        return Err(ModelError::Shape {
            what: "mixture mean",
            expected: joint_dim,
            found: mean.len(),
        });
    }
    let covariance = joint_covariance(&params.covariances[m], joint_dim, covariance_type)?;

    let half = joint_dim / 2;
    let mean = Array1::from(mean.clone());
    let sigma_xx = covariance.slice(s![..half, ..half]);
    let sigma_xy = covariance.slice(s![..half, half..]);
    let sigma_yy = covariance.slice(s![half.., half..]);

    let chol_xx = cholesky(sigma_xx).ok_or(ModelError::NotPositiveDefinite(m))?;
    // Column j of `solved` is Σxx⁻¹ Σxy[:, j], so `solved` = Σxx⁻¹ Σxy and
    // its transpose is Σyx Σxx⁻¹.
    let mut solved = Array2::<f64>::zeros((half, half));
    for j in 0..half {
        let column = cholesky_solve(chol_xx.view(), sigma_xy.column(j));
        solved.column_mut(j).assign(&column);
    }
    let regression = solved.t().to_owned();
    let conditional = &sigma_yy - &regression.dot(&sigma_xy);
    let precision = conditional
        .diag()
        .iter()
        .map(|&v| {
            if v > 0.0 && v.is_finite() {
                Ok(1.0 / v)
            } else {
                Err(ModelError::NotPositiveDefinite(m))
            }
        })
        .collect::<Result<Array1<f64>, _>>()?;

    Ok(Component {
        log_weight: weight.ln(),
        mean_x: mean.slice(s![..half]).to_owned(),
        mean_y: mean.slice(s![half..]).to_owned(),
        log_det_xx: log_det(chol_xx.view()),
        chol_xx,
        regression,
        precision,
    })
}

fn joint_covariance(
    raw: &[f64],
    joint_dim: usize,
    covariance_type: CovarianceType,
) -> Result<Array2<f64>, ModelError> {
    match covariance_type {
        CovarianceType::Diag => {
            if raw.len() != joint_dim {
                return Err(ModelError::Shape {
                    what: "diagonal covariance",
                    expected: joint_dim,
                    found: raw.len(),
                });
            }
            Ok(Array2::from_diag(&Array1::from(raw.to_vec())))
        }
        CovarianceType::Full => {
            Array2::from_shape_vec((joint_dim, joint_dim), raw.to_vec()).map_err(|_| {
                ModelError::Shape {
                    what: "full covariance",
                    expected: joint_dim * joint_dim,
                    found: raw.len(),
                }
            })
        }
    }
}

fn argmax(values: ArrayView1<f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value {
                (i, v)
            } else {
                (best, best_value)
            }
        })
        .0
}

/// Maximum-likelihood static trajectory for one dimension: solves
/// `(Wᵀ P W) c = Wᵀ P μ` where `W` stacks the identity and the delta window.
/// The system is banded (width 1), so a dense Cholesky stays cheap.
fn solve_trajectory(
    static_mean: ArrayView1<f64>,
    static_precision: ArrayView1<f64>,
    delta_mean: ArrayView1<f64>,
    delta_precision: ArrayView1<f64>,
) -> Array1<f64> {
    let len = static_mean.len();
    let mut lhs = Array2::<f64>::zeros((len, len));
    let mut rhs = Array1::<f64>::zeros(len);
    for t in 0..len {
        lhs[[t, t]] += static_precision[t];
        rhs[t] += static_precision[t] * static_mean[t];
        let terms = delta_terms(t, len);
        for &(i, wi) in &terms {
            rhs[i] += delta_precision[t] * delta_mean[t] * wi;
            for &(j, wj) in &terms {
                lhs[[i, j]] += delta_precision[t] * wi * wj;
            }
        }
    }
    match cholesky_banded(lhs.view(), 1) {
        Some(l) => cholesky_solve(l.view(), rhs.view()),
        // Static precisions are positive, so this only happens on NaN input.
        None => static_mean.to_owned(),
    }
}
