pub mod indicators;
pub mod metric;
pub mod readings;
pub mod snapshot;
