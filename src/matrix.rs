//! Labeled matrix store for technology and monetary matrices.
//!
//! A [`LabeledMatrix`] is a dense `f64` matrix whose rows are material/product
//! identifiers and whose columns are process identifiers. All access goes
//! through labels, never positions, so a matrix assembled from one reference
//! table can be combined with data addressed by another without index
//! bookkeeping.
//!
//! Sign convention: negative = consumed by the process, positive = produced
//! by the process. Scaling operations preserve signs.
//!
//! Mutation is in place. Callers that need an unmodified baseline must
//! `clone()` before handing the matrix to a pipeline stage.
//!
//! # Example
//!
//! ```
//! use battecon::matrix::LabeledMatrix;
//!
//! let mut a = LabeledMatrix::zeros(
//!     ["cathode binder", "battery cell"],
//!     ["electrode production", "cell assembly"],
//! );
//! a.set("cathode binder", "electrode production", -0.8).unwrap();
//! a.set("battery cell", "cell assembly", 1.0).unwrap();
//!
//! a.scale_rows(&["cathode binder"], 2.0).unwrap();
//! assert_eq!(a.get("cathode binder", "electrode production").unwrap(), -1.6);
//! ```

use nalgebra::DMatrix;
use std::collections::HashMap;

/// Result type for labeled matrix operations.
pub type MatrixResult<T> = Result<T, MatrixError>;

/// Errors raised by label-addressed matrix operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatrixError {
    /// A row label was not found in the matrix
    #[error("unknown material row: '{0}'")]
    UnknownRow(String),
    /// A column label was not found in the matrix
    #[error("unknown process column: '{0}'")]
    UnknownColumn(String),
    /// A supplied value slice does not match the matrix dimension
    #[error("shape mismatch: expected {expected} values, got {found}")]
    ShapeMismatch { expected: usize, found: usize },
    /// A label appears more than once in a label set
    #[error("duplicate label: '{0}'")]
    DuplicateLabel(String),
}

/// Dense matrix indexed by material rows and process columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    rows: Vec<String>,
    cols: Vec<String>,
    row_index: HashMap<String, usize>,
    col_index: HashMap<String, usize>,
    data: DMatrix<f64>,
}

impl LabeledMatrix {
    /// Creates a zero-filled matrix with the given row and column labels.
    ///
    /// # Panics
    ///
    /// Panics on duplicate labels; label sets come from reference tables and
    /// duplicates there are a configuration defect. Use [`LabeledMatrix::try_new`]
    /// for fallible construction.
    pub fn zeros<R, C>(rows: R, cols: C) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows: Vec<String> = rows.into_iter().map(Into::into).collect();
        let cols: Vec<String> = cols.into_iter().map(Into::into).collect();
        match Self::try_new(rows, cols) {
            Ok(m) => m,
            Err(e) => panic!("invalid label set: {}", e),
        }
    }

    /// Fallible constructor; rejects duplicate labels.
    pub fn try_new(rows: Vec<String>, cols: Vec<String>) -> MatrixResult<Self> {
        let mut row_index = HashMap::with_capacity(rows.len());
        for (i, r) in rows.iter().enumerate() {
            if row_index.insert(r.clone(), i).is_some() {
                return Err(MatrixError::DuplicateLabel(r.clone()));
            }
        }
        let mut col_index = HashMap::with_capacity(cols.len());
        for (j, c) in cols.iter().enumerate() {
            if col_index.insert(c.clone(), j).is_some() {
                return Err(MatrixError::DuplicateLabel(c.clone()));
            }
        }
        let data = DMatrix::zeros(rows.len(), cols.len());
        Ok(LabeledMatrix { rows, cols, row_index, col_index, data })
    }

    /// Builds a matrix from row labels, column labels and row-major values.
    pub fn from_rows(
        rows: Vec<String>,
        cols: Vec<String>,
        values: &[f64],
    ) -> MatrixResult<Self> {
        let mut m = Self::try_new(rows, cols)?;
        let expected = m.nrows() * m.ncols();
        if values.len() != expected {
            return Err(MatrixError::ShapeMismatch { expected, found: values.len() });
        }
        m.data = DMatrix::from_row_slice(m.nrows(), m.ncols(), values);
        Ok(m)
    }

    /// Number of material rows.
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Number of process columns.
    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    /// Row labels in storage order.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Column labels in storage order.
    pub fn columns(&self) -> &[String] {
        &self.cols
    }

    /// True if the row label exists.
    pub fn has_row(&self, row: &str) -> bool {
        self.row_index.contains_key(row)
    }

    /// True if the column label exists.
    pub fn has_column(&self, col: &str) -> bool {
        self.col_index.contains_key(col)
    }

    fn row_idx(&self, row: &str) -> MatrixResult<usize> {
        self.row_index.get(row).copied().ok_or_else(|| MatrixError::UnknownRow(row.to_string()))
    }

    fn col_idx(&self, col: &str) -> MatrixResult<usize> {
        self.col_index.get(col).copied().ok_or_else(|| MatrixError::UnknownColumn(col.to_string()))
    }

    /// Returns the value at (`row`, `col`).
    pub fn get(&self, row: &str, col: &str) -> MatrixResult<f64> {
        Ok(self.data[(self.row_idx(row)?, self.col_idx(col)?)])
    }

    /// Sets the value at (`row`, `col`).
    pub fn set(&mut self, row: &str, col: &str, value: f64) -> MatrixResult<()> {
        let (i, j) = (self.row_idx(row)?, self.col_idx(col)?);
        self.data[(i, j)] = value;
        Ok(())
    }

    /// Overwrites an entire row with `values` (one per column, storage order).
    pub fn set_row(&mut self, row: &str, values: &[f64]) -> MatrixResult<()> {
        let i = self.row_idx(row)?;
        if values.len() != self.ncols() {
            return Err(MatrixError::ShapeMismatch { expected: self.ncols(), found: values.len() });
        }
        for (j, v) in values.iter().enumerate() {
            self.data[(i, j)] = *v;
        }
        Ok(())
    }

    /// Returns a copy of a row in column storage order.
    pub fn row(&self, row: &str) -> MatrixResult<Vec<f64>> {
        let i = self.row_idx(row)?;
        Ok((0..self.ncols()).map(|j| self.data[(i, j)]).collect())
    }

    /// Multiplies every cell of the named rows by `factor`, across all columns.
    pub fn scale_rows(&mut self, rows: &[&str], factor: f64) -> MatrixResult<()> {
        for row in rows {
            let i = self.row_idx(row)?;
            for j in 0..self.ncols() {
                self.data[(i, j)] *= factor;
            }
        }
        Ok(())
    }

    /// Multiplies the named rows by `factor`, restricted to the named columns.
    ///
    /// Cells outside the column selection are untouched.
    pub fn scale_rows_in_cols(
        &mut self,
        rows: &[&str],
        cols: &[&str],
        factor: f64,
    ) -> MatrixResult<()> {
        let col_ids: Vec<usize> = cols.iter().map(|c| self.col_idx(c)).collect::<Result<_, _>>()?;
        for row in rows {
            let i = self.row_idx(row)?;
            for &j in &col_ids {
                self.data[(i, j)] *= factor;
            }
        }
        Ok(())
    }

    /// Multiplies an entire column by `factor`.
    pub fn scale_column(&mut self, col: &str, factor: f64) -> MatrixResult<()> {
        let j = self.col_idx(col)?;
        for i in 0..self.nrows() {
            self.data[(i, j)] *= factor;
        }
        Ok(())
    }

    /// Sets every cell of the named column to zero.
    pub fn zero_column(&mut self, col: &str) -> MatrixResult<()> {
        let j = self.col_idx(col)?;
        for i in 0..self.nrows() {
            self.data[(i, j)] = 0.0;
        }
        Ok(())
    }

    /// Sum of the cells at (`rows` x `col`).
    pub fn column_sum_over_rows(&self, rows: &[&str], col: &str) -> MatrixResult<f64> {
        let j = self.col_idx(col)?;
        let mut total = 0.0;
        for row in rows {
            total += self.data[(self.row_idx(row)?, j)];
        }
        Ok(total)
    }

    /// Labels of rows with a negative entry in `col` (inputs consumed there).
    pub fn inputs_of(&self, col: &str) -> MatrixResult<Vec<String>> {
        let j = self.col_idx(col)?;
        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| self.data[(*i, j)] < 0.0)
            .map(|(_, r)| r.clone())
            .collect())
    }

    /// Label of the first column with a positive entry in `row` (the process
    /// producing that material), if any.
    pub fn producer_of(&self, row: &str) -> MatrixResult<Option<String>> {
        let i = self.row_idx(row)?;
        Ok((0..self.ncols()).find(|&j| self.data[(i, j)] > 0.0).map(|j| self.cols[j].clone()))
    }

    /// Label of the first column consuming `row` (negative entry), if any.
    pub fn consumer_of(&self, row: &str) -> MatrixResult<Option<String>> {
        let i = self.row_idx(row)?;
        Ok((0..self.ncols()).find(|&j| self.data[(i, j)] < 0.0).map(|j| self.cols[j].clone()))
    }

    /// Borrow of the underlying dense matrix for the solver boundary.
    pub fn as_dmatrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Consumes the labels and returns the underlying dense matrix.
    pub fn into_dmatrix(self) -> DMatrix<f64> {
        self.data
    }

    /// Sum of all cells.
    pub fn total(&self) -> f64 {
        self.data.sum()
    }
}
