pub mod input;
pub mod report;
pub mod report_type;
pub mod usage;
