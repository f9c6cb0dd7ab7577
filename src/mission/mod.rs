//! Mission plans and the end-to-end mission runner.

pub mod plan;
pub mod runner;
#[cfg(test)]
mod tests;
