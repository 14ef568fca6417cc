pub mod dialect;
pub mod enrich;
pub mod error;
pub mod template;
