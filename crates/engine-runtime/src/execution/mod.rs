pub mod builder;
pub mod parallel;
