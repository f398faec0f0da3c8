//! Column layout shared by the built-in strategies.

use nalgebra::DMatrix;

use crate::converter::{ArrayConverter, ArraySpecType};

/// A run of columns produced by one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Block {
    /// One column in `[0, 1]`.
    Continuous { column: usize },
    /// `len` columns of which exactly one is 1.
    OneHot { start: usize, len: usize },
}

/// Maps array columns to parameter blocks. Columns past the last block are
/// padding and always hold 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ColumnLayout {
    blocks: Vec<Block>,
    num_features: usize,
}

impl ColumnLayout {
    pub(crate) fn from_converter(converter: &dyn ArrayConverter) -> Self {
        let mut blocks = Vec::with_capacity(converter.output_specs().len());
        let mut column = 0;
        for spec in converter.output_specs() {
            match spec.spec_type {
                ArraySpecType::Continuous => {
                    for _ in 0..spec.num_dimensions {
                        blocks.push(Block::Continuous { column });
                        column += 1;
                    }
                }
                ArraySpecType::OneHotEmbedding => {
                    blocks.push(Block::OneHot {
                        start: column,
                        len: spec.num_dimensions,
                    });
                    column += spec.num_dimensions;
                }
            }
        }
        Self {
            blocks,
            num_features: converter.num_features(),
        }
    }

    pub(crate) fn num_features(&self) -> usize {
        self.num_features
    }

    /// Draws `num_rows` uniform rows.
    pub(crate) fn sample(&self, rng: &mut fastrand::Rng, num_rows: usize) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(num_rows, self.num_features);
        for i in 0..num_rows {
            for block in &self.blocks {
                match *block {
                    Block::Continuous { column } => out[(i, column)] = rng.f64(),
                    Block::OneHot { start, len } if len > 0 => {
                        out[(i, start + rng.usize(0..len))] = 1.0;
                    }
                    Block::OneHot { .. } => {}
                }
            }
        }
        out
    }

    /// Moves row `i` back onto the feasible set: continuous columns clamped
    /// to `[0, 1]`, one-hot blocks snapped to their argmax and padding zeroed.
    pub(crate) fn project_row(&self, features: &mut DMatrix<f64>, i: usize) {
        let mut covered = 0;
        for block in &self.blocks {
            match *block {
                Block::Continuous { column } => {
                    let v = features[(i, column)];
                    features[(i, column)] = if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) };
                    covered = covered.max(column + 1);
                }
                Block::OneHot { start, len } => {
                    let mut best = start;
                    for j in start..start + len {
                        if features[(i, j)] > features[(i, best)] {
                            best = j;
                        }
                    }
                    for j in start..start + len {
                        features[(i, j)] = if j == best { 1.0 } else { 0.0 };
                    }
                    covered = covered.max(start + len);
                }
            }
        }
        for j in covered..self.num_features {
            features[(i, j)] = 0.0;
        }
    }
}
