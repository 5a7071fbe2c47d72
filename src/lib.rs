//! FungiHub: mushroom cultivation batch tracking.
//!
//! Batches move through a linear lifecycle (incubating, ready, then sold,
//! contaminated or archived) with human-readable date-scoped ids, a
//! parent/child lineage between grain spawn and the substrate/bulk batches
//! derived from it, an append-only event log, and a daily automation sweep
//! that promotes fully colonized grain. Auxiliary tracking covers strains
//! and liquid cultures; label printing is delegated to an external HTTP
//! service.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod print;
pub mod sweep;
