//! Conversion of smoothed tile beliefs into output bands.

use crate::error::{HmmError, Result};
use crate::io::{OutputKind, RasterWrite};
use crate::tiling::Tile;
use log::debug;
use ndarray::{Array2, Array4, ArrayView3, Axis};

/// Writes either per-class probabilities or a single hard class band.
#[derive(Debug, Clone, Default)]
pub struct OutputPolicy {
    assign_class: bool,
    class_list: Option<Vec<u8>>,
}

impl OutputPolicy {
    pub fn probabilities() -> Self {
        Self {
            assign_class: false,
            class_list: None,
        }
    }

    /// Hard class assignment; `class_list[i]` is the code written for label `i`,
    /// otherwise the label index itself is written.
    pub fn classes(class_list: Option<Vec<u8>>) -> Self {
        Self {
            assign_class: true,
            class_list,
        }
    }

    pub fn assign_class(&self) -> bool {
        self.assign_class
    }

    pub fn class_list(&self) -> Option<&[u8]> {
        self.class_list.as_deref()
    }

    /// Checks the class list against the stack's label count.
    pub fn validate(&self, n_labels: usize) -> Result<()> {
        match &self.class_list {
            Some(list) if self.assign_class && list.len() != n_labels => {
                Err(HmmError::ClassListLength {
                    expected: n_labels,
                    got: list.len(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn output_kind(&self, n_labels: usize) -> OutputKind {
        if self.assign_class {
            OutputKind::ClassCodes
        } else {
            OutputKind::Probabilities { n_labels }
        }
    }

    /// Class code per pixel for one time step's `labels x rows x cols` belief.
    ///
    /// Ties resolve to the lowest label index.
    pub fn assign_classes(&self, belief: ArrayView3<'_, f32>) -> Array2<u8> {
        let (_, n_rows, n_cols) = belief.dim();
        Array2::from_shape_fn((n_rows, n_cols), |(r, c)| {
            let pixel = belief.slice(ndarray::s![.., r, c]);
            let mut best = 0;
            for (idx, &v) in pixel.iter().enumerate() {
                if v > pixel[best] {
                    best = idx;
                }
            }
            match &self.class_list {
                Some(list) => list.get(best).copied().unwrap_or(0),
                None => u8::try_from(best).unwrap_or(u8::MAX),
            }
        })
    }

    /// Writes a `steps x labels x rows x cols` tile result, one output per step.
    pub fn write<W: RasterWrite>(
        &self,
        result: &Array4<f32>,
        outputs: &mut [W],
        tile: &Tile,
    ) -> Result<()> {
        let n_steps = result.len_of(Axis(0));
        if outputs.len() != n_steps {
            return Err(HmmError::OutputCount {
                expected: n_steps,
                got: outputs.len(),
            });
        }

        for (step_belief, out_rst) in result.axis_iter(Axis(0)).zip(outputs.iter_mut()) {
            if self.assign_class {
                let predictions = self.assign_classes(step_belief);
                out_rst.write_classes(tile, 1, &predictions)?;
            } else {
                for (layer, plane) in step_belief.axis_iter(Axis(0)).enumerate() {
                    out_rst.write_probabilities(tile, layer + 1, &plane.to_owned())?;
                }
            }
            debug!(
                "Wrote tile ({}, {}) to {}",
                tile.row_offset,
                tile.col_offset,
                out_rst.file_name()
            );
        }

        Ok(())
    }
}
