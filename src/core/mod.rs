//! Core logic — recipe loading, binary location, script generation, cluster initialization.

pub mod cmdline;
pub mod codegen;
pub mod configure;
pub mod error;
pub mod installer;
pub mod locator;
pub mod parser;
pub mod runner;
pub mod state;
pub mod types;

#[cfg(test)]
pub mod testutil;
