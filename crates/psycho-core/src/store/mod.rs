pub mod relational;
pub mod vector;

pub use relational::{RelationalCounts, RelationalStore};
pub use vector::{LocalVectorStore, VectorHit, VectorStore, VectorStoreStats};
