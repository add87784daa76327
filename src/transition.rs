//! Class-to-class transition model shared by every pixel.

use crate::error::{HmmError, Result};
use log::debug;
use ndarray::Array2;
use std::fs;
use std::path::Path;

/// How the transition matrix is specified.
#[derive(Debug, Clone)]
pub enum TransitionSpec {
    /// Uniform prior `p`: `M[i][j] = p` off the diagonal, `1 - p` on it.
    Prior(f64),
    /// A caller-built `L x L` matrix, used as-is.
    Matrix(Array2<f32>),
}

impl Default for TransitionSpec {
    fn default() -> Self {
        TransitionSpec::Prior(0.1)
    }
}

impl TransitionSpec {
    /// Reads a matrix from a text file, one row per line, values separated
    /// by commas or whitespace. Blank lines and `#` comments are ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut rows: Vec<Vec<f32>> = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    tok.parse::<f32>().map_err(|e| {
                        HmmError::TransitionParse(format!(
                            "line {}: '{}': {}",
                            line_no + 1,
                            tok,
                            e
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            rows.push(row);
        }

        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if n_rows == 0 || rows.iter().any(|r| r.len() != n_cols) {
            return Err(HmmError::TransitionParse(format!(
                "{}: rows must be non-empty and of equal length",
                path.display()
            )));
        }

        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Ok(TransitionSpec::Matrix(Array2::from_shape_vec(
            (n_rows, n_cols),
            flat,
        )?))
    }
}

/// The transition matrix `M` and its transpose, built once per run and
/// lent read-only to every worker.
#[derive(Debug, Clone)]
pub struct TransitionModel {
    matrix: Array2<f32>,
    matrix_t: Array2<f32>,
}

impl TransitionModel {
    pub fn build(n_labels: usize, spec: &TransitionSpec) -> Result<Self> {
        let matrix = match spec {
            TransitionSpec::Matrix(m) => {
                let (rows, cols) = m.dim();
                if rows != n_labels || cols != n_labels {
                    return Err(HmmError::TransitionShape {
                        expected: n_labels,
                        rows,
                        cols,
                    });
                }
                m.clone()
            }
            TransitionSpec::Prior(p) => {
                if !(*p > 0.0 && *p < 1.0) {
                    return Err(HmmError::InvalidTransitionPrior(*p));
                }
                let p = *p as f32;
                let mut m = Array2::from_elem((n_labels, n_labels), p);
                m.diag_mut().fill(1.0 - p);
                m
            }
        };

        debug!("Transition matrix ({}x{}):\n{}", n_labels, n_labels, matrix);

        let matrix_t = matrix.t().to_owned();
        Ok(Self { matrix, matrix_t })
    }

    pub fn n_labels(&self) -> usize {
        self.matrix.nrows()
    }

    /// `M`, applied to backward messages.
    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    /// `Mᵗ`, applied to forward messages.
    pub fn matrix_t(&self) -> &Array2<f32> {
        &self.matrix_t
    }
}
