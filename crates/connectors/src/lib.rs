pub mod adapter;
pub mod sql;
