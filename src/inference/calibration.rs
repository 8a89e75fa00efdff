//! Temperature scaling of classifier scores.

use crate::constants::calibration::{
    IDENTITY_TEMPERATURE, MAX_EVALUATIONS, MAX_TEMPERATURE, MIN_TEMPERATURE, PROB_EPSILON,
    X_TOLERANCE,
};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A positive score divisor, never below [`MIN_TEMPERATURE`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Temperature(f64);

impl Temperature {
    /// The neutral temperature; scores pass through unchanged.
    pub const IDENTITY: Self = Self(IDENTITY_TEMPERATURE);

    /// Wrap a value, applying the floor. Non-finite values become identity.
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(value.max(MIN_TEMPERATURE))
        } else {
            Self::IDENTITY
        }
    }

    /// The temperature value.
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this is the identity temperature.
    pub fn is_identity(self) -> bool {
        (self.0 - IDENTITY_TEMPERATURE).abs() < f64::EPSILON
    }

    /// Fit a temperature on raw scores with known true class indices.
    ///
    /// Minimizes mean negative log-likelihood of the true label under
    /// `softmax(scores / T)` over `[MIN_TEMPERATURE, MAX_TEMPERATURE]`.
    /// Never fails: unusable input or a non-converging search yields
    /// [`Temperature::IDENTITY`] with a warning.
    pub fn fit(scores: ArrayView2<'_, f32>, labels: &[usize]) -> Self {
        if scores.nrows() == 0 || scores.ncols() == 0 {
            warn!("Calibration set is empty; using T = {}", IDENTITY_TEMPERATURE);
            return Self::IDENTITY;
        }
        if scores.nrows() != labels.len() {
            warn!(
                "Calibration set has {} score rows but {} labels; using T = {}",
                scores.nrows(),
                labels.len(),
                IDENTITY_TEMPERATURE
            );
            return Self::IDENTITY;
        }
        if let Some(bad) = labels.iter().find(|&&label| label >= scores.ncols()) {
            warn!(
                "Calibration label {} is outside 0..{}; using T = {}",
                bad,
                scores.ncols(),
                IDENTITY_TEMPERATURE
            );
            return Self::IDENTITY;
        }

        let objective = |t: f64| mean_nll(scores, labels, Self(t)).unwrap_or(f64::NAN);

        match minimize_bounded(
            objective,
            MIN_TEMPERATURE,
            MAX_TEMPERATURE,
            X_TOLERANCE,
            MAX_EVALUATIONS,
        ) {
            Some((t, nll)) => {
                info!("Fitted temperature T = {:.4} (mean NLL {:.6})", t, nll);
                Self::new(t)
            }
            None => {
                warn!("Temperature search did not converge; using T = {}", IDENTITY_TEMPERATURE);
                Self::IDENTITY
            }
        }
    }

    /// Divide raw scores by this temperature.
    pub fn apply_to_scores(self, scores: ArrayView2<'_, f32>) -> Array2<f32> {
        #[allow(clippy::cast_possible_truncation)]
        let t = self.0.max(MIN_TEMPERATURE) as f32;
        scores.mapv(|s| s / t)
    }

    /// Rescale already normalized probabilities.
    ///
    /// Approximation: takes `ln(max(p, eps))`, divides by `T` and applies
    /// softmax again. Only calibration of raw scores is exact, so prefer
    /// [`Temperature::apply_to_scores`] whenever scores are available.
    pub fn apply_to_probs(self, probs: ArrayView2<'_, f32>) -> Array2<f32> {
        #[allow(clippy::cast_possible_truncation)]
        let eps = PROB_EPSILON as f32;
        let logs = probs.mapv(|p| p.max(eps).ln());
        softmax_rows(self.apply_to_scores(logs.view()).view())
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<f64> for Temperature {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Temperature> for f64 {
    fn from(t: Temperature) -> Self {
        t.0
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Index of the first row holding a NaN or infinite score.
pub(crate) fn first_non_finite_row(scores: ArrayView2<'_, f32>) -> Option<usize> {
    scores
        .axis_iter(Axis(0))
        .position(|row| row.iter().any(|v| !v.is_finite()))
}

/// Row-wise softmax, shifted by the row maximum for stability.
///
/// Expects finite scores; callers reject NaN and infinities first.
pub fn softmax_rows(scores: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = scores.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Mean negative log-likelihood of `labels` under `softmax(scores / t)`.
///
/// Computed in `f64`; the true-class probability is floored at
/// [`PROB_EPSILON`]. Returns `None` for mismatched or out-of-range labels
/// and for non-finite results.
pub fn mean_nll(scores: ArrayView2<'_, f32>, labels: &[usize], t: Temperature) -> Option<f64> {
    if scores.nrows() == 0 || scores.nrows() != labels.len() {
        return None;
    }

    let t = t.value().max(MIN_TEMPERATURE);
    let mut total = 0.0_f64;

    for (row, &label) in scores.axis_iter(Axis(0)).zip(labels) {
        let scaled: Vec<f64> = row.iter().map(|&s| f64::from(s) / t).collect();
        let true_score = *scaled.get(label)?;
        let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let log_sum = max + scaled.iter().map(|z| (z - max).exp()).sum::<f64>().ln();
        if !true_score.is_finite() || !log_sum.is_finite() {
            return None;
        }
        let p_true = (true_score - log_sum).exp().max(PROB_EPSILON);
        total -= p_true.ln();
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = total / labels.len() as f64;
    mean.is_finite().then_some(mean)
}

/// Bounded scalar minimization: golden-section search with parabolic
/// interpolation (Brent).
///
/// Returns `(x, f(x))`, or `None` if `f` turns non-finite or the evaluation
/// budget runs out before the bracket shrinks below `xatol`.
#[allow(clippy::float_cmp)]
fn minimize_bounded<F>(f: F, lower: f64, upper: f64, xatol: f64, max_evaluations: usize) -> Option<(f64, f64)>
where
    F: Fn(f64) -> f64,
{
    let golden = 0.5 * (3.0 - 5.0_f64.sqrt());
    let sqrt_eps = f64::EPSILON.sqrt();

    let (mut a, mut b) = (lower, upper);
    let mut fulc = a + golden * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat = 0.0_f64;
    let mut e = 0.0_f64;

    let mut fx = f(xf);
    let mut evaluations = 1;
    if !fx.is_finite() {
        return None;
    }
    let mut ffulc = fx;
    let mut fnfc = fx;

    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
    let mut tol2 = 2.0 * tol1;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        let mut golden_step = true;

        if e.abs() > tol1 {
            golden_step = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = if xm >= xf { tol1 } else { -tol1 };
                }
            } else {
                golden_step = true;
            }
        }

        if golden_step {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden * e;
        }

        let step = if rat >= 0.0 { 1.0 } else { -1.0 };
        let x = xf + step * rat.abs().max(tol1);
        let fu = f(x);
        evaluations += 1;
        if !fu.is_finite() {
            return None;
        }

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
        tol2 = 2.0 * tol1;

        if evaluations >= max_evaluations {
            debug!("Bounded search hit {} evaluations at x = {}", evaluations, xf);
            return None;
        }
    }

    Some((xf, fx))
}
