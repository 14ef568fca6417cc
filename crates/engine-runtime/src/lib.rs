pub mod cursor;
pub mod execution;
pub mod layers;
pub mod retry;
pub mod source;

#[cfg(test)]
mod tests;
