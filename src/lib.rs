pub mod affinity;
pub mod error;
pub mod extract;
pub mod report;
pub mod sweep;

pub use error::SweepError;
pub use extract::{extract_field, Field, FieldRecord};
pub use report::{CsvWriter, SweepRow, CSV_HEADER};
pub use sweep::{run_sweep, SweepConfig, SweepPoint};
