//! Salesforce change detection for crm-sync
//!
//! This crate finds the Accounts and Contacts that changed in the source CRM
//! since the last successful sync and hands them to the batch dispatcher.
//!
//! ## Components
//!
//! - [`SourceConnector`] - the operations the engine needs from the source
//! - [`ChangePoller`] - watermark-driven query producing a [`CandidateBatch`]
//! - [`JsonlSource`] - file-backed connector used by the CLI
//! - [`testing::InMemorySource`] - in-process connector for tests
//!
//! ## Polling contract
//!
//! A poll selects records whose `last_modified` is strictly greater than the
//! current watermark. The watermark itself is never touched here; it only
//! moves after the batch job built from the poll succeeds.

mod connector;
mod jsonl;
mod poller;
pub mod testing;

pub use connector::{CreatedRecord, SourceConnector};
pub use jsonl::JsonlSource;
pub use poller::{CandidateBatch, ChangePoller};
