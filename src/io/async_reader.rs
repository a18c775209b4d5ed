//! Asynchronous CSV reader with batch interface
//!
//! Provides batched reading of accounts or transfer requests from a CSV
//! source, for the concurrent processing strategy.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - tokio files wrapped with tokio-util's compat layer as the byte source
//! - Batch reading, so that one batch can be processed while memory stays bounded
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader<R, T> → Batches of T::Output
//!                  ↓
//!           csv_format module
//!           (CsvRow, TransferCsvRecord, AccountCsvRecord)
//! ```

use crate::io::csv_format::{CsvRow, TransferCsvRecord};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use std::marker::PhantomData;
use tracing::warn;

/// Asynchronous CSV reader over rows of type `T`
///
/// Defaults to reading transfer requests. Malformed rows are logged with their
/// line number and skipped.
pub struct AsyncReader<R: AsyncRead + Unpin, T = TransferCsvRecord> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    line_num: u64,
    _row: PhantomData<fn() -> T>,
}

impl<R, T> AsyncReader<R, T>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: CsvRow + 'static,
{
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            line_num: 0,
            _row: PhantomData,
        }
    }

    /// Read a batch of converted rows
    ///
    /// Reads until `batch_size` rows converted successfully or the input
    /// ends. Invalid rows are logged and skipped.
    ///
    /// # Returns
    ///
    /// Up to `batch_size` values. An empty vector means end of file.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<T::Output> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<T>();

        while batch.len() < batch_size {
            let next = match records.next().await {
                Some(next) => next,
                None => break,
            };

            // Line 1 is the header
            self.line_num += 1;
            let line = self.line_num + 1;

            match next {
                Ok(row) => match row.into_domain() {
                    Ok(value) => batch.push(value),
                    Err(error) => warn!(line, %error, "Skipping invalid row"),
                },
                Err(error) => warn!(line, %error, "Skipping malformed row"),
            }
        }

        batch
    }

    /// Read every remaining row
    pub async fn read_all(&mut self) -> Vec<T::Output> {
        let mut values = Vec::new();
        loop {
            let batch = self.read_batch(1024).await;
            if batch.is_empty() {
                break;
            }
            values.extend(batch);
        }
        values
    }
}
