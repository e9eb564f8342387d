//! Tabular view (Arrow `RecordBatch`)
//!
//! The interchange format between the document store and the model:
//! - Export: documents (minus `_id`) → one `RecordBatch`, columns in first-seen order
//! - Training: label column + numeric feature columns
//! - Inference: single-row projection without the label column
//!
//! An empty collection materializes as the empty table: zero rows, zero
//! columns. Callers must not assume a schema in that case.

mod snapshot;

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

/// One observation: field name → scalar value, in insertion order.
pub type Record = serde_json::Map<String, Value>;

/// Sentinel rendering of an empty table
pub const EMPTY_TABLE: &str = "None";

/// Arrow type chosen for a column while materializing records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ColumnKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() => Self::Int64,
            Value::Number(_) => Self::Float64,
            Value::String(_) | Value::Array(_) | Value::Object(_) => Self::Utf8,
        }
    }

    /// Widen two observed kinds to one column type
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Null, kind) | (kind, Self::Null) => kind,
            (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Self::Float64,
            _ => Self::Utf8,
        }
    }

    const fn data_type(self) -> DataType {
        match self {
            Self::Boolean => DataType::Boolean,
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
            Self::Null | Self::Utf8 => DataType::Utf8,
        }
    }

    fn build(self, name: &str, records: &[Record]) -> ArrayRef {
        let cells = records
            .iter()
            .map(|record| record.get(name).filter(|value| !value.is_null()));

        match self {
            Self::Boolean => Arc::new(
                cells
                    .map(|cell| cell.and_then(Value::as_bool))
                    .collect::<BooleanArray>(),
            ),
            Self::Int64 => Arc::new(
                cells
                    .map(|cell| cell.and_then(Value::as_i64))
                    .collect::<Int64Array>(),
            ),
            Self::Float64 => Arc::new(
                cells
                    .map(|cell| cell.and_then(Value::as_f64))
                    .collect::<Float64Array>(),
            ),
            Self::Null | Self::Utf8 => Arc::new(
                cells
                    .map(|cell| cell.map(render_value))
                    .collect::<StringArray>(),
            ),
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// An ordered, schema-consistent sequence of records
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Default for Table {
    fn default() -> Self {
        Self::empty()
    }
}

impl Table {
    /// The empty table (zero rows, unknown schema)
    #[must_use]
    pub fn empty() -> Self {
        Self {
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
        }
    }

    /// Wrap an existing record batch
    #[must_use]
    pub const fn from_batch(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Materialize records into a table
    ///
    /// Columns appear in first-seen order across all records. A field missing
    /// from some records becomes a null cell. Integer and float values in the
    /// same column widen to `Float64`; any other mix falls back to `Utf8`.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the assembled batch
    pub fn from_records(records: &[Record]) -> Result<Self> {
        if records.is_empty() {
            return Ok(Self::empty());
        }

        let mut names: Vec<&str> = Vec::new();
        let mut kinds: Vec<ColumnKind> = Vec::new();
        let mut positions: FxHashMap<&str, usize> = FxHashMap::default();

        for record in records {
            for (name, value) in record {
                let idx = *positions.entry(name.as_str()).or_insert_with(|| {
                    names.push(name.as_str());
                    kinds.push(ColumnKind::Null);
                    names.len() - 1
                });
                kinds[idx] = kinds[idx].merge(ColumnKind::of(value));
            }
        }

        let fields: Vec<Field> = names
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| Field::new(*name, kind.data_type(), true))
            .collect();
        let columns: Vec<ArrayRef> = names
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| kind.build(name, records))
            .collect();

        let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
        let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;

        Ok(Self { batch })
    }

    /// Get the underlying record batch
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the table, returning the record batch
    #[must_use]
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// True when the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Column names in order
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    /// Check whether a column exists
    #[must_use]
    pub fn contains_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    /// Get a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Project the named columns, in the order given
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a column does not exist
    pub fn select(&self, columns: &[&str]) -> Result<Self> {
        let schema = self.batch.schema();
        let indices = columns
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .map_err(|_| Error::InvalidInput(format!("Unknown column '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            batch: self.batch.project(&indices)?,
        })
    }

    /// Remove the named columns, keeping the remaining order
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a column does not exist
    pub fn drop_columns(&self, columns: &[&str]) -> Result<Self> {
        if let Some(missing) = columns.iter().find(|name| !self.contains_column(name)) {
            return Err(Error::InvalidInput(format!("Unknown column '{missing}'")));
        }

        let indices: Vec<usize> = self
            .batch
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| !columns.contains(&field.name().as_str()))
            .map(|(idx, _)| idx)
            .collect();

        Ok(Self {
            batch: self.batch.project(&indices)?,
        })
    }

    /// Single-row view at `index`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `index` is out of bounds
    pub fn row(&self, index: usize) -> Result<Self> {
        if index >= self.num_rows() {
            return Err(Error::InvalidInput(format!(
                "Row {index} out of bounds ({} rows)",
                self.num_rows()
            )));
        }
        Ok(Self {
            batch: self.batch.slice(index, 1),
        })
    }

    /// Render as a text grid, or [`EMPTY_TABLE`] when there are no rows
    ///
    /// # Errors
    ///
    /// Returns error if a column cannot be formatted
    pub fn render(&self) -> Result<String> {
        if self.is_empty() {
            return Ok(EMPTY_TABLE.to_string());
        }
        let grid = arrow::util::pretty::pretty_format_batches(std::slice::from_ref(&self.batch))?;
        Ok(grid.to_string())
    }

    /// Render as an HTML table (header row, no index column), or
    /// [`EMPTY_TABLE`] when there are no rows
    ///
    /// # Errors
    ///
    /// Returns error if a column cannot be formatted
    pub fn to_html(&self) -> Result<String> {
        if self.is_empty() {
            return Ok(EMPTY_TABLE.to_string());
        }

        let columns = self
            .batch
            .columns()
            .iter()
            .map(column_text)
            .collect::<Result<Vec<_>>>()?;

        let mut html = String::from("<table border=\"1\" class=\"dataframe\">\n  <thead>\n");
        html.push_str("    <tr style=\"text-align: right;\">\n");
        for name in self.column_names() {
            let _ = writeln!(html, "      <th>{}</th>", escape_html(&name));
        }
        html.push_str("    </tr>\n  </thead>\n  <tbody>\n");
        for row in 0..self.num_rows() {
            html.push_str("    <tr>\n");
            for column in &columns {
                let cell = column[row].as_deref().unwrap_or("");
                let _ = writeln!(html, "      <td>{}</td>", escape_html(cell));
            }
            html.push_str("    </tr>\n");
        }
        html.push_str("  </tbody>\n</table>");

        Ok(html)
    }
}

/// Display text for every cell of a column (`None` for nulls)
pub(crate) fn column_text(array: &ArrayRef) -> Result<Vec<Option<String>>> {
    let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
    Ok((0..array.len())
        .map(|idx| (!array.is_null(idx)).then(|| formatter.value(idx).to_string()))
        .collect())
}

fn escape_html(text: &str) -> String {
    // `&` first so the entities added below are not escaped again
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record(json!({"Name": "Goblin", "Level": 3, "Health": 12.5, "Rarity": "Rank 0"})),
            record(json!({"Name": "Wyrm", "Level": 14, "Health": 80.0, "Rarity": "Rank 4"})),
            record(json!({"Name": "Imp", "Level": 1, "Health": 4, "Rarity": "Rank 0"})),
        ]
    }

    #[test]
    fn test_empty_records_give_empty_table() {
        let table = Table::from_records(&[]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.num_columns(), 0);
        assert_eq!(table.render().unwrap(), EMPTY_TABLE);
        assert_eq!(table.to_html().unwrap(), EMPTY_TABLE);
    }

    #[test]
    fn test_column_order_and_types() {
        let table = Table::from_records(&sample_records()).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), vec!["Name", "Level", "Health", "Rarity"]);

        let schema = table.batch().schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        // 12.5 / 80.0 / 4 widen to float
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_missing_fields_become_nulls() {
        let records = vec![
            record(json!({"a": 1, "b": true})),
            record(json!({"a": 2, "c": "late"})),
        ];
        let table = Table::from_records(&records).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b", "c"]);
        assert_eq!(table.column("b").unwrap().null_count(), 1);
        assert_eq!(table.column("c").unwrap().null_count(), 1);
    }

    #[test]
    fn test_mixed_kinds_fall_back_to_text() {
        let records = vec![record(json!({"x": 1})), record(json!({"x": "two"}))];
        let table = Table::from_records(&records).unwrap();
        let texts = column_text(table.column("x").unwrap()).unwrap();
        assert_eq!(texts, vec![Some("1".to_string()), Some("two".to_string())]);
    }

    #[test]
    fn test_fieldless_records_keep_row_count() {
        let records = vec![Record::new(), Record::new()];
        let table = Table::from_records(&records).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 0);
    }

    #[test]
    fn test_select_and_drop() {
        let table = Table::from_records(&sample_records()).unwrap();

        let selected = table.select(&["Rarity", "Level"]).unwrap();
        assert_eq!(selected.column_names(), vec!["Rarity", "Level"]);

        let dropped = table.drop_columns(&["Name"]).unwrap();
        assert_eq!(dropped.column_names(), vec!["Level", "Health", "Rarity"]);

        assert!(table.select(&["Nope"]).is_err());
        assert!(table.drop_columns(&["Nope"]).is_err());
    }

    #[test]
    fn test_row_slice() {
        let table = Table::from_records(&sample_records()).unwrap();
        let row = table.row(1).unwrap();
        assert_eq!(row.num_rows(), 1);
        let names = column_text(row.column("Name").unwrap()).unwrap();
        assert_eq!(names, vec![Some("Wyrm".to_string())]);
        assert!(table.row(3).is_err());
    }

    #[test]
    fn test_render_grid_contains_values() {
        let table = Table::from_records(&sample_records()).unwrap();
        let grid = table.render().unwrap();
        assert!(grid.contains("Goblin"));
        assert!(grid.contains("Rarity"));
    }

    #[test]
    fn test_html_escapes_cells() {
        let records = vec![record(json!({"Name": "<b>Ogre & Co</b>"}))];
        let html = Table::from_records(&records).unwrap().to_html().unwrap();
        assert!(html.starts_with("<table"));
        assert!(html.contains("<th>Name</th>"));
        assert!(html.contains("&lt;b&gt;Ogre &amp; Co&lt;/b&gt;"));
        assert!(!html.contains("<td><b>"));
    }

    #[test]
    fn test_escape_html_quotes_and_existing_entities() {
        assert_eq!(escape_html(r#"say "boo""#), "say &quot;boo&quot;");
        assert_eq!(escape_html("&lt;"), "&amp;lt;");
        assert_eq!(escape_html("Imp's <Lair>"), "Imp's &lt;Lair&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
