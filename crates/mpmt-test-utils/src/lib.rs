//! Test helpers shared by the unit tests, integration tests and benchmarks of `mpmt`.
pub mod counting;
pub mod stats;
