pub mod config;
pub mod layout;
pub mod progress_store;
pub mod record_sink;
mod row;

pub use config::OutputConfig;
pub use layout::OutputLayout;
pub use progress_store::JsonProgressStore;
pub use record_sink::CsvRecordSink;
pub use row::COLUMNS;
