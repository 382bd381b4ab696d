use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use parquet::{
    basic::{self, Encoding},
    data_type::DoubleType,
    file::{
        properties::{EnabledStatistics, WriterProperties},
        writer::SerializedFileWriter,
    },
    schema::{parser::parse_message_type, types},
};
use tracing::instrument;

/// Name of the single dataset stored in every generated file.
pub(crate) const DATASET_NAME: &str = "random_data";

fn dataset_schema() -> types::Type {
    parse_message_type(
        "
    message Dataset {
        required double random_data;
    }
    ",
    )
    .expect("schema should compile")
}

/// Writes one dataset of `f64` values into a parquet container, one row group per chunk.
#[derive(Debug)]
pub(crate) struct DatasetWriter<W: Write + Send> {
    writer: SerializedFileWriter<W>,
    rows_per_group: usize,
}

impl<W: Write + Send> DatasetWriter<W> {
    pub(crate) fn with_compression(writer: W, compression: Compression, rows_per_group: usize) -> Result<Self> {
        anyhow::ensure!(rows_per_group > 0, "rows per group must be positive");
        let schema = Arc::new(dataset_schema());
        // random doubles neither compress into a dictionary nor benefit from statistics
        let properties = Arc::new(
            WriterProperties::builder()
                .set_compression(compression)
                .set_dictionary_enabled(false)
                .set_encoding(Encoding::PLAIN)
                .set_statistics_enabled(EnabledStatistics::None)
                .set_max_row_group_size(rows_per_group)
                .build(),
        );
        let writer = SerializedFileWriter::new(writer, schema, properties)?;
        Ok(Self { writer, rows_per_group })
    }

    #[instrument(skip_all, fields(values = values.len()))]
    pub(crate) fn write(&mut self, values: &[f64]) -> Result<()> {
        for chunk in values.chunks(self.rows_per_group) {
            let mut rows = self.writer.next_row_group()?;
            let mut column = rows.next_column()?.expect("random_data column");
            column
                .typed::<DoubleType>()
                .write_batch(chunk, None, None)
                .context(DATASET_NAME)?;
            column.close().context("close random_data")?;
            rows.close().context("close rows")?;
        }
        Ok(())
    }

    /// Writes the footer. The container is not readable until this succeeds.
    pub(crate) fn close(self) -> Result<()> {
        self.writer.close()?;
        Ok(())
    }
}

pub type Compression = basic::Compression;
