pub mod holidays;
pub mod schedule;
pub mod status;
