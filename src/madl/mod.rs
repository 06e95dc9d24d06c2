//! Method-reuse engine (MADL): embedding + similarity-index collaborators,
//! per-step search with identity-key dedup, and best-effort storage of
//! methods learned from successful runs.

pub mod embedding;
pub mod engine;
pub mod extract;
pub mod index;
pub mod method;
