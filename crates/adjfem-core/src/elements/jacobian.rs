//! Sparsity patterns of the weak-form Jacobian

use nalgebra::DMatrix;
use nalgebra_sparse::CooMatrix;

use crate::error::{ModelError, Result};

/// Layout of the values written by [`super::ElementModel::eval_weak_jacobian`].
///
/// `Dense` means `size²` values in row-major order. `Sparse` lists the
/// `(row, col)` of each value; the list belongs to the model and stays valid
/// as long as the model is borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacobianPattern<'a> {
    Dense,
    Sparse(&'a [(usize, usize)]),
}

impl JacobianPattern<'_> {
    pub fn is_dense(&self) -> bool {
        matches!(self, JacobianPattern::Dense)
    }

    /// Number of values for a `size × size` Jacobian
    pub fn nnz(&self, size: usize) -> usize {
        match self {
            JacobianPattern::Dense => size * size,
            JacobianPattern::Sparse(pairs) => pairs.len(),
        }
    }

    /// Row and column of the `k`-th value
    pub fn entry(&self, k: usize, size: usize) -> (usize, usize) {
        match self {
            JacobianPattern::Dense => (k / size, k % size),
            JacobianPattern::Sparse(pairs) => pairs[k],
        }
    }

    /// Fails if any pair lies outside a `size × size` block
    pub fn validate(&self, size: usize) -> Result<()> {
        if let JacobianPattern::Sparse(pairs) = self
            && let Some(&(row, col)) = pairs.iter().find(|(r, c)| *r >= size || *c >= size)
        {
            return Err(ModelError::JacobianIndexOutOfRange { row, col, size });
        }
        Ok(())
    }
}

/// A weak-form Jacobian paired with its values
#[derive(Debug, Clone, Copy)]
pub struct JacobianView<'a> {
    size: usize,
    pattern: JacobianPattern<'a>,
    values: &'a [f64],
}

impl<'a> JacobianView<'a> {
    /// Wraps the first `pattern.nnz(size)` entries of `values`
    pub fn new(size: usize, pattern: JacobianPattern<'a>, values: &'a [f64]) -> Result<Self> {
        pattern.validate(size)?;
        let nnz = pattern.nnz(size);
        if values.len() < nnz {
            return Err(ModelError::JacobianMismatch {
                pairs: nnz,
                values: values.len(),
            });
        }
        Ok(Self {
            size,
            pattern,
            values: &values[..nnz],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pattern(&self) -> JacobianPattern<'a> {
        self.pattern
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `(row, col, value)` in the order the model wrote them
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(k, &v)| {
                let (row, col) = self.pattern.entry(k, self.size);
                (row, col, v)
            })
    }

    /// Entry value; duplicated pairs are summed, missing pairs are zero
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.pattern {
            JacobianPattern::Dense => self.values[row * self.size + col],
            JacobianPattern::Sparse(_) => self
                .iter()
                .filter(|(r, c, _)| *r == row && *c == col)
                .map(|(_, _, v)| v)
                .sum(),
        }
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.size, self.size);
        for (row, col, v) in self.iter() {
            m[(row, col)] += v;
        }
        m
    }

    /// Coordinate-format copy for assembly into a global sparse matrix
    pub fn to_coo(&self) -> CooMatrix<f64> {
        let mut coo = CooMatrix::new(self.size, self.size);
        for (row, col, v) in self.iter() {
            coo.push(row, col, v);
        }
        coo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_pattern_is_row_major() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let view = JacobianView::new(2, JacobianPattern::Dense, &values).unwrap();
        assert_eq!(view.get(0, 1), 2.0);
        assert_eq!(view.get(1, 0), 3.0);
        assert_eq!(view.to_dense()[(1, 1)], 4.0);
        assert_eq!(JacobianPattern::Dense.nnz(3), 9);
    }

    #[test]
    fn sparse_pattern_sums_duplicates() {
        let pairs = [(0, 0), (2, 1), (0, 0)];
        let values = [1.0, 5.0, 0.5, 99.0];
        let view = JacobianView::new(3, JacobianPattern::Sparse(&pairs), &values).unwrap();
        assert_eq!(view.nnz(), 3);
        assert_eq!(view.get(0, 0), 1.5);
        assert_eq!(view.get(2, 1), 5.0);
        assert_eq!(view.get(1, 2), 0.0);

        let dense = view.to_dense();
        assert_eq!(dense[(0, 0)], 1.5);
        assert_eq!(view.to_coo().nnz(), 3);
    }

    #[test]
    fn out_of_range_pairs_are_rejected() {
        let pairs = [(0, 3)];
        let err = JacobianView::new(3, JacobianPattern::Sparse(&pairs), &[1.0]).unwrap_err();
        assert_eq!(
            err,
            ModelError::JacobianIndexOutOfRange {
                row: 0,
                col: 3,
                size: 3
            }
        );
    }

    #[test]
    fn short_value_buffer_is_rejected() {
        let pairs = [(0, 0), (1, 1)];
        assert!(matches!(
            JacobianView::new(2, JacobianPattern::Sparse(&pairs), &[1.0]),
            Err(ModelError::JacobianMismatch { pairs: 2, values: 1 })
        ));
    }
}
