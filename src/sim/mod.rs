//! Lifecycle management for the external simulation engine process.

pub mod supervisor;
#[cfg(test)]
mod tests;
