pub mod cached;
pub mod monitored;
