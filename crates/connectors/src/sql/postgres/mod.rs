pub mod adapter;
mod utils;
