//! Tripwire — script hashing, install event log, drift detection.

pub mod drift;
pub mod eventlog;
pub mod hasher;
