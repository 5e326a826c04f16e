pub mod hybrid;
pub mod keyword;
pub mod vector;

pub use keyword::{KeywordHandle, KeywordIndex};
pub use vector::{content_hash, BuildStats, EmbeddingIndex, IndexEntry, IndexSnapshot};
