//! Small dense Cholesky helpers for the mixture model and MLPG solve.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Lower-triangular factor `L` with `a = L Lᵀ`, or `None` if `a` is not
/// symmetric positive definite.
pub(crate) fn cholesky(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    cholesky_banded(a, n.saturating_sub(1))
}

/// Cholesky factor of a matrix whose entries vanish more than `bandwidth`
/// places off the diagonal. Work is confined to the band.
pub(crate) fn cholesky_banded(a: ArrayView2<f64>, bandwidth: usize) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let lo = j.saturating_sub(bandwidth);
        let diag = a[[j, j]] - (lo..j).map(|k| l[[j, k]] * l[[j, k]]).sum::<f64>();
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let ljj = diag.sqrt();
        l[[j, j]] = ljj;
        for i in (j + 1)..n.min(j + bandwidth + 1) {
            let lo = i.saturating_sub(bandwidth);
            let sum: f64 = (lo..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            l[[i, j]] = (a[[i, j]] - sum) / ljj;
        }
    }
    Some(l)
}

/// Solves `L y = b`.
pub(crate) fn forward_substitute(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|k| l[[i, k]] * y[k]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    y
}

/// Solves `Lᵀ x = y`.
pub(crate) fn backward_substitute(l: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
    let n = y.len();
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|k| l[[k, i]] * x[k]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solves `a x = b` given the Cholesky factor of `a`.
pub(crate) fn cholesky_solve(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let y = forward_substitute(l, b);
    backward_substitute(l, y.view())
}

/// `log |a|` from its Cholesky factor.
pub(crate) fn log_det(l: ArrayView2<f64>) -> f64 {
    2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_reconstructs() {
        let a = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let l = cholesky(a.view()).unwrap();
        let back = l.dot(&l.t());
        for (x, y) in a.iter().zip(back.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky(a.view()).is_none());
    }

    #[test]
    fn test_solve_and_log_det() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let l = cholesky(a.view()).unwrap();
        let x = cholesky_solve(l.view(), array![1.0, 2.0].view());
        let check = a.dot(&x);
        assert!((check[0] - 1.0).abs() < 1e-12);
        assert!((check[1] - 2.0).abs() < 1e-12);
        assert!((log_det(l.view()) - 11.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_banded_matches_dense() {
        let n = 6;
        let mut a = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            a[[i, i]] = 4.0;
            if i + 1 < n {
                a[[i, i + 1]] = -1.0;
                a[[i + 1, i]] = -1.0;
            }
            if i + 2 < n {
                a[[i, i + 2]] = 0.5;
                a[[i + 2, i]] = 0.5;
            }
        }
        let dense = cholesky(a.view()).unwrap();
        let banded = cholesky_banded(a.view(), 2).unwrap();
        for (x, y) in dense.iter().zip(banded.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }
}
