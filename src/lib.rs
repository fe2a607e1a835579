//! pgrecipe — provision a local PostgreSQL cluster from a buildout-style recipe.
//!
//! Locates the PostgreSQL executables, writes wrapper and control scripts,
//! and initializes the data directory with a fixed list of bootstrap commands.

pub mod cli;
pub mod core;
pub mod scripts;
pub mod transport;
pub mod tripwire;
