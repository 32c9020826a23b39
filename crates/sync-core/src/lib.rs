//! Core types for the crm-sync framework.
//!
//! This crate provides the foundational types shared by every other crate in
//! the workspace:
//!
//! - [`SourceRecord`] - Tagged Account/Contact records captured from the source CRM
//! - [`TargetRecord`] - Records as they exist in the target system
//! - [`NaturalKey`] - Business keys used to match records across systems
//! - [`SyncError`] - The error taxonomy of the sync engine
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── watermark                    (watermark persistence)
//!    ├─── crm-sync-salesforce-source   (source connector + change poller)
//!    ├─── crm-sync-siebel-sink         (target connector + matcher/loader)
//!    └─── crm-sync                     (batch jobs, engine, scheduler, CLI)
//! ```
//!
//! # Example
//!
//! ```rust
//! use sync_core::{Account, NaturalKey, SourceRecord};
//!
//! let record = SourceRecord::Account(Account::new("Acme Corp"));
//! assert_eq!(
//!     record.natural_key().unwrap(),
//!     NaturalKey::AccountName("Acme Corp".to_string())
//! );
//! ```

pub mod duration;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use duration::parse_duration;
pub use error::{Result, SyncError};
pub use types::{
    Account, Contact, ExtraFields, NaturalKey, ObjectType, SourceId, SourceRecord, TargetId,
    TargetRecord,
};
