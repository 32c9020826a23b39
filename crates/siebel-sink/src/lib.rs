//! Siebel record matching and loading for crm-sync.
//!
//! This crate defines the [`TargetConnector`] trait that abstracts the
//! target CRM, the field mapping from source records to Siebel field names,
//! and the [`TargetLoader`] that turns a source record into an idempotent
//! create-or-update.
//!
//! The loader is generic over the connector, so the batch job is compiled
//! against a single interface regardless of where records end up:
//!
//! ```ignore
//! let loader = TargetLoader::new(Arc::new(JsonFileTarget::new("siebel.json")));
//! let upserted = loader.upsert(&record).await?;
//! ```

mod json_file;
mod loader;
pub mod mapping;
pub mod testing;
mod traits;

pub use json_file::JsonFileTarget;
pub use loader::{TargetLoader, UpsertAction, Upserted};
pub use traits::{NaturalKeyFilter, TargetConnector, TargetFields};
