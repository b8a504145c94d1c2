//! Implicit-feedback alternating least squares.
//!
//! Every cell of the item x user matrix is an observation with confidence
//! `c = 1 + alpha * w` and preference `p = [w > 0]`. Each half-step fixes one
//! side and solves, per row, the ridge system
//!
//! ```text
//! (YtY + sum_u (c_iu - 1) y_u y_u^T + lambda I) x_i = sum_u c_iu y_u
//! ```
//!
//! where the sums only run over stored (non-zero) cells; the `YtY` term
//! accounts for the baseline confidence of every unobserved cell.

use crate::matrix::CsrMatrix;
use flrec_core::config::ModelConfig;
use flrec_core::error::{RecError, RecResult};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

/// Factorization hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlsParams {
    pub factors: usize,
    pub regularization: f32,
    pub alpha: f32,
    pub iterations: usize,
    /// Relative loss improvement below which iteration stops. 0 disables.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for AlsParams {
    fn default() -> Self {
        Self {
            factors: 50,
            regularization: 0.01,
            alpha: 1.0,
            iterations: 15,
            tolerance: 0.0,
            seed: 42,
        }
    }
}

impl From<&ModelConfig> for AlsParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            factors: config.factors,
            regularization: config.regularization,
            alpha: config.alpha,
            iterations: config.iterations,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }
}

/// Trained latent factors.
#[derive(Debug, Clone)]
pub struct AlsFactors {
    /// items x F
    pub item_factors: Array2<f32>,
    /// users x F
    pub user_factors: Array2<f32>,
    /// Loss after the last completed iteration.
    pub loss: f64,
    pub iterations_run: usize,
}

/// Factorize an item x user weight matrix.
///
/// Pure function of `(weights, params)`: the same inputs and seed always
/// produce bit-identical factors.
pub fn factorize(weights: &CsrMatrix, params: &AlsParams) -> RecResult<AlsFactors> {
    if weights.rows() == 0 || weights.cols() == 0 {
        return Err(RecError::DegenerateInput(format!(
            "cannot factorize a {}x{} matrix",
            weights.rows(),
            weights.cols()
        )));
    }
    if params.factors == 0 {
        return Err(RecError::InvalidArgument("factors must be positive".into()));
    }
    if !(params.regularization > 0.0) {
        return Err(RecError::InvalidArgument(
            "regularization must be positive".into(),
        ));
    }

    let start = std::time::Instant::now();
    let user_items = weights.transpose();

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut item_factors = random_factors(&mut rng, weights.rows(), params.factors);
    let mut user_factors = random_factors(&mut rng, weights.cols(), params.factors);

    let mut loss = f64::NAN;
    let mut iterations_run = 0;
    for iteration in 0..params.iterations {
        item_factors = solve_side(weights, &user_factors, params)?;
        user_factors = solve_side(&user_items, &item_factors, params)?;
        iterations_run = iteration + 1;

        let current = reconstruction_loss(weights, &item_factors, &user_factors, params);
        debug!(iteration = iteration, loss = current, "ALS iteration complete");

        if params.tolerance > 0.0 && loss.is_finite() && loss > 0.0 {
            let improvement = (loss - current) / loss;
            if improvement < params.tolerance {
                loss = current;
                debug!(
                    iteration = iteration,
                    improvement = improvement,
                    "ALS converged below tolerance"
                );
                break;
            }
        }
        loss = current;
    }

    info!(
        items = weights.rows(),
        users = weights.cols(),
        nnz = weights.nnz(),
        factors = params.factors,
        iterations = iterations_run,
        loss = loss,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "ALS factorization finished"
    );

    Ok(AlsFactors {
        item_factors,
        user_factors,
        loss,
        iterations_run,
    })
}

fn random_factors(rng: &mut StdRng, rows: usize, factors: usize) -> Array2<f32> {
    let mut m = Array2::<f32>::zeros((rows, factors));
    for v in m.iter_mut() {
        *v = rng.gen_range(0.0..0.01);
    }
    m
}

/// Recompute every row of one side with the other side held fixed.
/// `m` has one row per factor row being solved, columns index `fixed`.
fn solve_side(m: &CsrMatrix, fixed: &Array2<f32>, params: &AlsParams) -> RecResult<Array2<f32>> {
    let k = fixed.ncols();
    let fixed64 = fixed.mapv(f64::from);
    let gram = fixed64.t().dot(&fixed64);
    let lambda = params.regularization as f64;
    let alpha = params.alpha as f64;

    let rows: Vec<Array1<f64>> = (0..m.rows())
        .into_par_iter()
        .map(|r| {
            let mut a = gram.clone();
            let mut b = Array1::<f64>::zeros(k);

            for (c, w) in m.row_iter(r) {
                let confidence = 1.0 + alpha * w as f64;
                let y = fixed64.row(c);
                // A += (c - 1) * y y^T
                let extra = confidence - 1.0;
                if extra != 0.0 {
                    for i in 0..k {
                        let yi = extra * y[i];
                        for j in 0..k {
                            a[[i, j]] += yi * y[j];
                        }
                    }
                }
                // b += c * p * y, with p = 1 for every stored cell
                b.scaled_add(confidence, &y);
            }

            for i in 0..k {
                a[[i, i]] += lambda;
            }

            cholesky_solve(&a, b.view())
        })
        .collect::<RecResult<Vec<_>>>()?;

    let mut out = Array2::<f32>::zeros((m.rows(), k));
    for (r, x) in rows.iter().enumerate() {
        for (j, &v) in x.iter().enumerate() {
            out[[r, j]] = v as f32;
        }
    }
    Ok(out)
}

/// Solve `A x = b` for symmetric positive definite `A` via `A = L L^T`.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: ArrayView1<f64>) -> RecResult<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if !(diag > 0.0) {
                    return Err(RecError::Numerical(format!(
                        "normal matrix is not positive definite (pivot {i} = {diag})"
                    )));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

/// Weighted reconstruction error over all cells plus the ridge penalty,
/// averaged over the number of cells.
///
/// Unobserved cells contribute `s^2` each, which summed over a user is
/// `y_u^T (X^T X) y_u`; stored cells then swap their `s^2` for `c (1 - s)^2`.
pub fn reconstruction_loss(
    weights: &CsrMatrix,
    item_factors: &Array2<f32>,
    user_factors: &Array2<f32>,
    params: &AlsParams,
) -> f64 {
    let x = item_factors.mapv(f64::from);
    let y = user_factors.mapv(f64::from);
    let alpha = params.alpha as f64;

    let gram = x.t().dot(&x);
    let mut loss = (y.dot(&gram) * &y).sum();

    for i in 0..weights.rows() {
        let xi = x.row(i);
        for (u, w) in weights.row_iter(i) {
            let s = xi.dot(&y.row(u));
            let confidence = 1.0 + alpha * w as f64;
            loss += confidence * (1.0 - s).powi(2) - s * s;
        }
    }

    let penalty = (x.iter().map(|v| v * v).sum::<f64>() + y.iter().map(|v| v * v).sum::<f64>())
        * params.regularization as f64;

    (loss + penalty) / (weights.rows() * weights.cols()) as f64
}
