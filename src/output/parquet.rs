//! Parquet output.

use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};

use crate::table::FinalTable;

use super::to_record_batch;

pub fn save_parquet(table: &FinalTable, file_path: &Path) -> Result<()> {
    let batch = to_record_batch(table)?;

    let file = File::create(file_path)
        .with_context(|| format!("Failed to create {}", file_path.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Float64Type;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    use crate::output::tests::table_fixture;

    use super::*;

    #[test]
    fn should_read_back_written_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.parquet");

        save_parquet(&table_fixture(), &path).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
        let batch = &batches[0];

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(1).name(), "swh");
        let mwd = batch.column(2).as_primitive::<Float64Type>();
        assert!(mwd.is_null(0));
        assert_eq!(mwd.value(1), 270.5);
    }
}
