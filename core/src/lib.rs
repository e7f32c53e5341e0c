//! Shared model of the Alva host: wire messages, projects, pattern
//! libraries and their on-disk stores.

pub mod connections;
pub mod library;
pub mod message;
pub mod persistence;
pub mod project;

pub use connections::{Connection, ConnectionStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use library::{LibraryAnalysis, LibraryAnalyzer, PatternLibrary, TypeScriptAnalyzer};
pub use message::{Envelope, Message, MessageId};
pub use persistence::PersistenceResult;
pub use project::Project;
