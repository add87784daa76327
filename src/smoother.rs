//! Per-pixel temporal smoothing.
//!
//! Each pixel's stack of class-probability vectors is treated as the
//! emissions of a hidden class chain. Forward/backward message passing
//! (Murphy, *Machine Learning: A Probabilistic Perspective*, §17.4.2)
//! yields the smoothed marginal belief for every time step.

use crate::error::{HmmError, Result};
use crate::transition::TransitionModel;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::fmt;

/// Smoothing strategy applied to every pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SmoothingMethod {
    /// Marginal beliefs from forward/backward message passing
    #[default]
    #[value(name = "forward-backward")]
    ForwardBackward,
    /// Most likely class path (not implemented)
    #[value(name = "viterbi")]
    Viterbi,
}

impl SmoothingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SmoothingMethod::ForwardBackward => "forward-backward",
            SmoothingMethod::Viterbi => "viterbi",
        }
    }

    /// Smooths one pixel's `n_steps x n_labels` series.
    pub fn smooth(
        &self,
        series: ArrayView2<'_, f32>,
        model: &TransitionModel,
    ) -> Result<Array2<f32>> {
        match self {
            SmoothingMethod::ForwardBackward => forward_backward(series, model),
            SmoothingMethod::Viterbi => Err(HmmError::MethodNotImplemented(self.name())),
        }
    }
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Divides `v` by its sum. Vectors summing to `<= 0` are returned unchanged.
pub fn normalize(v: Array1<f32>) -> Array1<f32> {
    let z = v.sum();
    if z > 0.0 {
        v / z
    } else {
        v
    }
}

/// Forward/backward smoothing of a single pixel.
///
/// Rows of `series` are time steps, columns are class labels. An all-zero
/// series is a no-data pixel and is returned unchanged.
pub fn forward_backward(
    series: ArrayView2<'_, f32>,
    model: &TransitionModel,
) -> Result<Array2<f32>> {
    let (n_steps, n_labels) = series.dim();
    if n_steps == 0 || n_labels != model.n_labels() {
        return Err(HmmError::TimeSeriesShape {
            expected_labels: model.n_labels(),
            steps: n_steps,
            labels: n_labels,
        });
    }

    let max = series.iter().fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    if max == 0.0 {
        return Ok(series.to_owned());
    }

    let mut forward = Array2::<f32>::zeros((n_steps, n_labels));
    forward.row_mut(0).assign(&series.row(0));
    for t in 1..n_steps {
        let predicted = model.matrix_t().dot(&forward.row(t - 1));
        let v = &series.row(t) * &predicted;
        forward.row_mut(t).assign(&normalize(v));
    }

    let mut backward = Array2::<f32>::zeros((n_steps, n_labels));
    backward.row_mut(n_steps - 1).fill(1.0);
    for t in (1..n_steps).rev() {
        let weighted = &series.row(t) * &backward.row(t);
        let v = model.matrix().dot(&weighted);
        backward.row_mut(t - 1).assign(&normalize(v));
    }

    let mut belief = forward * backward;
    for mut row in belief.axis_iter_mut(Axis(0)) {
        let z = row.sum();
        // all-zero rows stay zero
        let z = if z == 0.0 { 1.0 } else { z };
        row /= z;
    }

    Ok(belief)
}
