pub mod chunking;
mod index;
mod model;
mod store;

pub use index::{IndexStatus, IndexStore};
pub use model::{ImportResult, StoredChunk};
pub use store::ChunkStore;
