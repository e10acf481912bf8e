//! Typed persistence facades over the document-store plugin.
//!
//! Every repository follows the same pattern: `save` maps the entity to a
//! document and inserts it, `load_batch` goes through a bounded LRU cache
//! and fetches only the misses. Writes go straight to the backend and never
//! populate the cache.

pub mod document;
pub mod engram;
pub mod history;
pub mod meta;
pub mod observation;
pub mod process;

pub use document::DocumentRepository;
pub use engram::EngramRepository;
pub use history::HistoryRepository;
pub use meta::MetaRepository;
pub use observation::ObservationRepository;
pub use process::ProcessRepository;

pub(crate) const CACHE_SIZE: usize = 1000;
