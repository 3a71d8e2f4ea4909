//! Output formatters for scan results.
//!
//! - [`text`] for people
//! - [`json`] for automation and scripting
//! - [`csv`] for spreadsheet import
//!
//! # Example
//!
//! ```no_run
//! use chunkdupe::duplicates::DuplicateFinder;
//! use chunkdupe::error::ExitCode;
//! use chunkdupe::output::json::JsonOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let report = finder
//!     .find_duplicates_in_paths(&[PathBuf::from("/mnt/media")], None)
//!     .unwrap();
//!
//! let output = JsonOutput::new(&report, ExitCode::for_report(&report));
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod csv;
pub mod json;
pub mod text;

pub use csv::CsvOutput;
pub use json::JsonOutput;
pub use text::TextOutput;
