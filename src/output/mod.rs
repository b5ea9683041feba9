//! Serialises the finalized table to disk.

pub mod csv;
pub mod parquet;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};
use clap::ValueEnum;

use crate::table::FinalTable;

pub use self::csv::save_csv;
pub use self::parquet::save_parquet;

pub const TIMESTAMP_COLUMN: &str = "datetime";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// `datetime` as text, then one nullable float column per variable.
pub fn to_record_batch(table: &FinalTable) -> Result<RecordBatch> {
    let mut fields = vec![Field::new(TIMESTAMP_COLUMN, DataType::Utf8, false)];
    fields.extend(
        table
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let timestamps: Vec<String> = table
        .rows
        .iter()
        .map(|row| row.timestamp.format(TIMESTAMP_FORMAT).to_string())
        .collect();

    let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(timestamps))];
    for index in 0..table.columns.len() {
        let values: Vec<Option<f64>> = table
            .rows
            .iter()
            .map(|row| row.values.get(index).copied().flatten())
            .collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

pub fn save(table: &FinalTable, format: OutputFormat, file_path: &Path, missing_marker: &str) -> Result<()> {
    match format {
        OutputFormat::Csv => save_csv(table, file_path, missing_marker),
        OutputFormat::Parquet => save_parquet(table, file_path),
    }
}
