mod csv_table;
mod json_records;

pub use csv_table::CsvTableParser;
pub use json_records::JsonRecordsParser;
