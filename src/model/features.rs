//! Feature matrix and label encoding

use crate::table::{column_text, Table};
use arrow::array::{Array, Float64Array};
use arrow::datatypes::DataType;
use ndarray::{Array2, ArrayView1};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Dense row-major matrix of `f64` features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Build from row-major values
    ///
    /// # Errors
    ///
    /// Returns a message if `values.len() != n_rows * n_cols`
    pub fn new(values: Vec<f64>, n_rows: usize, n_cols: usize) -> Result<Self, String> {
        let len = values.len();
        let values = Array2::from_shape_vec((n_rows, n_cols), values).map_err(|e| {
            format!(
                "Expected {n_rows}x{n_cols} = {} values, got {len}: {e}",
                n_rows * n_cols
            )
        })?;
        Ok(Self { values })
    }

    /// Build from equal-length rows
    ///
    /// # Errors
    ///
    /// Returns a message if rows differ in length
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, String> {
        let n_cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|row| row.len() != n_cols) {
            return Err(format!(
                "Row {bad} has {} values, expected {n_cols}",
                rows[bad].len()
            ));
        }
        Self::new(rows.concat(), rows.len(), n_cols)
    }

    /// Extract the named columns of `table`, in the order given
    ///
    /// Numeric and boolean columns are cast to `f64`. Text columns, nulls and
    /// non-finite values are rejected.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending column
    pub fn from_table(table: &Table, columns: &[String]) -> Result<Self, String> {
        let mut values = Array2::zeros((table.num_rows(), columns.len()));

        for (col, name) in columns.iter().enumerate() {
            let column = numeric_column(table, name)?;
            values
                .column_mut(col)
                .assign(&ArrayView1::from(column.as_slice()));
        }

        Ok(Self { values })
    }

    /// Number of rows
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// One row as a view
    #[must_use]
    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }

    /// One cell
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[[row, col]]
    }

    /// One column as a view
    #[must_use]
    pub fn column(&self, col: usize) -> ArrayView1<'_, f64> {
        self.values.column(col)
    }
}

fn numeric_column(table: &Table, name: &str) -> Result<Vec<f64>, String> {
    let array = table
        .column(name)
        .ok_or_else(|| format!("Missing column '{name}'"))?;

    let data_type = array.data_type();
    if !(data_type.is_numeric() || matches!(data_type, DataType::Boolean)) {
        return Err(format!(
            "Column '{name}' has type {data_type}, expected a numeric or boolean column"
        ));
    }
    if array.null_count() > 0 {
        return Err(format!(
            "Column '{name}' contains {} null value(s)",
            array.null_count()
        ));
    }

    let cast = arrow::compute::cast(array.as_ref(), &DataType::Float64)
        .map_err(|e| format!("Column '{name}' cannot be read as f64: {e}"))?;
    let floats = cast
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| format!("Column '{name}' cannot be read as f64"))?;

    let values = floats.values().to_vec();
    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
        return Err(format!("Column '{name}' has a non-finite value at row {row}"));
    }
    Ok(values)
}

/// Label column encoded as class indices into a sorted class list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLabels {
    /// Distinct labels, sorted
    pub classes: Vec<String>,
    /// Class index per row
    pub indices: Vec<usize>,
}

impl EncodedLabels {
    /// Encode the label column of `table` via its display text
    ///
    /// # Errors
    ///
    /// Returns a message if the column is missing or contains nulls
    pub fn from_table(table: &Table, label_column: &str) -> Result<Self, String> {
        let array = table
            .column(label_column)
            .ok_or_else(|| format!("Missing label column '{label_column}'"))?;
        let cells = column_text(array).map_err(|e| e.to_string())?;

        let mut labels = Vec::with_capacity(cells.len());
        for (row, cell) in cells.into_iter().enumerate() {
            labels.push(cell.ok_or_else(|| {
                format!("Label column '{label_column}' is null at row {row}")
            })?);
        }

        let classes: Vec<String> = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let lookup: FxHashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(idx, class)| (class.as_str(), idx))
            .collect();
        let indices = labels.iter().map(|label| lookup[label.as_str()]).collect();

        Ok(Self { classes, indices })
    }
}
