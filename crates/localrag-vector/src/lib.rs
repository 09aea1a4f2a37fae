//! LanceDB storage for child embeddings and parent context chunks.
//!
//! `LanceChunkWriter` fills the tables; `LanceSemanticChannel` and
//! `LanceParentStore` are the read sides used by the hybrid engine.

pub mod schema;
pub mod search;
pub mod store;
pub mod table;
pub mod writer;

pub use search::{LanceParentStore, LanceSemanticChannel};
pub use store::LanceStore;
pub use writer::{LanceChunkWriter, WriteMode};
