//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over the rows of an accounts or transfers
//! file. Delegates CSV format concerns to the csv_format module.
//!
//! # Design
//!
//! `SyncReader<T>` uses csv::Reader to deserialize one row at a time into the
//! record type `T` and converts it with [`CsvRow::into_domain`]. It never loads
//! the whole file into memory.
//!
//! # Iterator Interface
//!
//! SyncReader implements the Iterator trait, yielding
//! `Result<T::Output, LedgerError>` for each CSV row:
//!
//! ```no_run
//! use bank_transfer_engine::io::{SyncReader, TransferCsvRecord};
//! use std::path::Path;
//!
//! let reader = SyncReader::<TransferCsvRecord>::open(Path::new("transfers.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(request) => println!("Transfer: {:?}", request),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `open()`
//! - Individual row errors are yielded as `LedgerError::Parse` with the line number

use crate::io::csv_format::CsvRow;
use crate::types::LedgerError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

/// Synchronous CSV reader over rows of type `T`
#[derive(Debug)]
pub struct SyncReader<T, R = File> {
    reader: csv::Reader<R>,
    line_num: u64,
    _row: PhantomData<fn() -> T>,
}

impl<T: CsvRow> SyncReader<T, File> {
    /// Open a CSV file for streaming iteration
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if the file opened successfully
    /// * `Err(LedgerError::Io)` if the file could not be opened
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| LedgerError::Io {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        Ok(Self::from_reader(file))
    }
}

impl<T: CsvRow, R: Read> SyncReader<T, R> {
    /// Wrap any byte source
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Reject rows with a wrong number of fields
    /// - Use an 8KB buffer
    pub fn from_reader(reader: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .buffer_capacity(8 * 1024)
            .from_reader(reader);

        Self {
            reader,
            line_num: 0,
            _row: PhantomData,
        }
    }
}

impl<T: CsvRow, R: Read> Iterator for SyncReader<T, R> {
    type Item = Result<T::Output, LedgerError>;

    /// Get the next converted row
    ///
    /// # Returns
    ///
    /// * `Some(Ok(T::Output))` - Successfully parsed row
    /// * `Some(Err(LedgerError::Parse))` - Parse or conversion error with line number
    /// * `None` - End of file reached
    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<T>();
        let next = deserializer.next()?;

        // Line 1 is the header
        self.line_num += 1;
        let line = self.line_num + 1;

        Some(match next {
            Ok(row) => row.into_domain().map_err(|e| LedgerError::Parse {
                line: Some(line),
                message: e.to_string(),
            }),
            Err(e) => Err(LedgerError::Parse {
                line: Some(line),
                message: e.to_string(),
            }),
        })
    }
}
