//! Flat vector index over embedded chunks with LanceDB persistence.
mod index;
pub mod metric;
pub mod schema;
pub mod store;

pub use index::VectorIndex;
pub use store::IndexManifest;
