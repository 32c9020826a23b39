//! Fixtures shared by unit and integration tests.
//!
//! The sample records mirror what a contact broadcast carries in practice:
//! an account with a unique name and a contact with a unique email plus the
//! usual mailing and phone details.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Account, Contact, SourceId};
use watermark::{MemoryStore, Watermark, WatermarkStore};

use crate::config::SyncConfig;

pub use crm_sync_salesforce_source::testing::InMemorySource;
pub use crm_sync_siebel_sink::testing::{InMemoryTarget, TargetOperation};

pub const BROADCAST_ACCOUNT_NAME: &str = "Contact Broadcast Test Name";
pub const TEST_FLOW: &str = "triggerFlow";

/// How long a test waits for a job, and how often it checks.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(240);
pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

// Generate unique test identifiers for parallel execution
static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique test identifier for parallel test execution
pub fn generate_test_id() -> u64 {
    let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    timestamp.wrapping_add(counter)
}

/// Initialize logging for a test. Safe to call from every test.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("crm_sync=debug,watermark=debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore if already initialized
}

pub fn broadcast_account(test_id: u64) -> Account {
    Account::new(format!("{BROADCAST_ACCOUNT_NAME}{test_id}"))
        .with_number_of_employees(1231)
        .with_account_number("123123")
}

pub fn broadcast_contact(test_id: u64, account: Option<SourceId>) -> Contact {
    let mut contact = Contact::new(format!("LastName_{test_id}"))
        .with_first_name("Petr")
        .with_email(format!("some.email.{test_id}@mail.com"))
        .with_extra("Description", "Some fake description")
        .with_extra("MailingCity", "Denver")
        .with_extra("MailingCountry", "US")
        .with_extra("MobilePhone", "123456789")
        .with_extra("Department", format!("department_{test_id}"))
        .with_extra("Phone", "123456789")
        .with_extra("Title", "Dr");
    if let Some(account) = account {
        contact = contact.with_account(account);
    }
    contact
}

/// Watermark store in memory, starting at `default`.
pub fn memory_watermarks(default: Watermark) -> Arc<WatermarkStore> {
    Arc::new(WatermarkStore::with_default(
        Arc::new(MemoryStore::new()),
        TEST_FLOW,
        default,
    ))
}

/// Config with short timers for tests.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 1_000,
        poll_start_delay_ms: 2_000,
        step_timeout_ms: 5_000,
        ..Default::default()
    }
}
