//! Dynamic (delta) features.
//!
//! The delta of frame `t` is `-x[t-1] + x[t]`. At the first frame the pair
//! `(x[0], x[1])` is used instead. The same weights build the MLPG window
//! matrix, so the forward features and the trajectory solve agree.

use ndarray::{s, Array2, ArrayView2};

/// Weights applied to the previous and current frame.
const DELTA_WINDOW: [f64; 2] = [-1.0, 1.0];

/// `(frame index, weight)` pairs that make up the delta of frame `t` in a
/// sequence of `len` frames. Empty when `len < 2`.
pub(crate) fn delta_terms(t: usize, len: usize) -> Vec<(usize, f64)> {
    if len < 2 {
        return Vec::new();
    }
    let first = if t == 0 { 0 } else { t - 1 };
    vec![(first, DELTA_WINDOW[0]), (first + 1, DELTA_WINDOW[1])]
}

pub fn delta(data: ArrayView2<f64>) -> Array2<f64> {
    let (len, dim) = data.dim();
    let mut out = Array2::<f64>::zeros((len, dim));
    for t in 0..len {
        for (index, weight) in delta_terms(t, len) {
            let row = data.row(index);
            out.row_mut(t).scaled_add(weight, &row);
        }
    }
    out
}

/// Static features followed by their deltas: `T × 2D`.
pub fn static_delta(data: ArrayView2<f64>) -> Array2<f64> {
    let (len, dim) = data.dim();
    let mut out = Array2::<f64>::zeros((len, 2 * dim));
    out.slice_mut(s![.., ..dim]).assign(&data);
    out.slice_mut(s![.., dim..]).assign(&delta(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_delta_values() {
        let x = array![[1.0], [3.0], [6.0], [10.0]];
        let d = delta(x.view());
        assert_eq!(d, array![[2.0], [2.0], [3.0], [4.0]]);
    }

    #[test]
    fn test_static_delta_layout() {
        let x = array![[1.0, 10.0], [2.0, 30.0]];
        let sd = static_delta(x.view());
        assert_eq!(sd, array![[1.0, 10.0, 1.0, 20.0], [2.0, 30.0, 1.0, 20.0]]);
    }

    #[test]
    fn test_single_frame_has_zero_delta() {
        let x = array![[5.0, -1.0]];
        assert_eq!(static_delta(x.view()), array![[5.0, -1.0, 0.0, 0.0]]);
    }
}
