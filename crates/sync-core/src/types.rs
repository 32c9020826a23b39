//! Record model shared by the change poller, the target loader and the batch job.
//!
//! Source records are a tagged variant over the object types the engine
//! understands. Fields the engine interprets (natural keys, parent links,
//! modification time) are typed; everything else travels in an open
//! [`ExtraFields`] map and is passed through to the target untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SyncError};

/// Uninterpreted business fields, keyed by source field name.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

/// Object types replicated by the engine.
///
/// The declaration order is the dispatch order: Accounts are loaded before
/// the Contacts that depend on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Account,
    Contact,
}

impl ObjectType {
    /// All object types in dispatch order.
    pub const ALL: [ObjectType; 2] = [ObjectType::Account, ObjectType::Contact];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Account => "Account",
            ObjectType::Contact => "Contact",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "account" => Ok(ObjectType::Account),
            "contact" => Ok(ObjectType::Contact),
            _ => Err(SyncError::config(format!(
                "Unknown object type: '{s}'. Expected 'Account' or 'Contact'"
            ))),
        }
    }
}

/// Identifier assigned by the source system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Drafts carry an empty id until the source system assigns one.
    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier assigned by the target system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Business key used to find the counterpart of a source record in the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NaturalKey {
    /// Exact account name.
    AccountName(String),
    /// Contact email address.
    Email(String),
}

impl NaturalKey {
    pub fn object_type(&self) -> ObjectType {
        match self {
            NaturalKey::AccountName(_) => ObjectType::Account,
            NaturalKey::Email(_) => ObjectType::Contact,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            NaturalKey::AccountName(v) | NaturalKey::Email(v) => v,
        }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NaturalKey::AccountName(name) => write!(f, "account name '{name}'"),
            NaturalKey::Email(email) => write!(f, "email '{email}'"),
        }
    }
}

/// Salesforce Account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: SourceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_employees: Option<i64>,
    #[serde(default = "unassigned_timestamp")]
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: ExtraFields,
}

impl Account {
    /// Create a draft account. The source system assigns `id` and
    /// `last_modified` when the draft is created there.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SourceId::default(),
            name: name.into(),
            account_number: None,
            number_of_employees: None,
            last_modified: unassigned_timestamp(),
            extra: ExtraFields::new(),
        }
    }

    pub fn with_account_number(mut self, number: impl Into<String>) -> Self {
        self.account_number = Some(number.into());
        self
    }

    pub fn with_number_of_employees(mut self, count: i64) -> Self {
        self.number_of_employees = Some(count);
        self
    }

    pub fn with_extra(
        mut self,
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(field.into(), value.into());
        self
    }
}

/// Salesforce Contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub id: SourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Parent account in the source system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<SourceId>,
    #[serde(default = "unassigned_timestamp")]
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: ExtraFields,
}

impl Contact {
    /// Create a draft contact. See [`Account::new`].
    pub fn new(last_name: impl Into<String>) -> Self {
        Self {
            id: SourceId::default(),
            first_name: None,
            last_name: last_name.into(),
            email: None,
            account_id: None,
            last_modified: unassigned_timestamp(),
            extra: ExtraFields::new(),
        }
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_account(mut self, account_id: SourceId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_extra(
        mut self,
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(field.into(), value.into());
        self
    }
}

fn unassigned_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// A record captured from the source system.
///
/// # JSON Format
///
/// ```json
/// {"type": "Account", "id": "001A", "name": "Acme", "last_modified": "2024-01-01T00:00:00Z"}
/// {"type": "Contact", "id": "003B", "last_name": "Doe", "email": "jd@acme.test", "account_id": "001A", "last_modified": "2024-01-01T00:00:01Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceRecord {
    Account(Account),
    Contact(Contact),
}

impl SourceRecord {
    pub fn id(&self) -> &SourceId {
        match self {
            SourceRecord::Account(a) => &a.id,
            SourceRecord::Contact(c) => &c.id,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            SourceRecord::Account(_) => ObjectType::Account,
            SourceRecord::Contact(_) => ObjectType::Contact,
        }
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        match self {
            SourceRecord::Account(a) => a.last_modified,
            SourceRecord::Contact(c) => c.last_modified,
        }
    }

    /// Parent account of a contact, if any.
    pub fn parent_account_id(&self) -> Option<&SourceId> {
        match self {
            SourceRecord::Account(_) => None,
            SourceRecord::Contact(c) => c.account_id.as_ref(),
        }
    }

    /// Natural key used to match this record in the target system.
    ///
    /// Accounts match on exact name, contacts on email. Blank values are
    /// treated as missing.
    pub fn natural_key(&self) -> Result<NaturalKey> {
        let key = match self {
            SourceRecord::Account(a) => Some(a.name.trim())
                .filter(|n| !n.is_empty())
                .map(|n| NaturalKey::AccountName(n.to_string())),
            SourceRecord::Contact(c) => c
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(|e| NaturalKey::Email(e.to_string())),
        };
        key.ok_or_else(|| SyncError::MissingNaturalKey {
            object_type: self.object_type(),
            source_id: self.id().clone(),
        })
    }

    /// Copy of this record carrying the identity assigned by the source system.
    pub fn with_identity(mut self, id: SourceId, last_modified: DateTime<Utc>) -> Self {
        match &mut self {
            SourceRecord::Account(a) => {
                a.id = id;
                a.last_modified = last_modified;
            }
            SourceRecord::Contact(c) => {
                c.id = id;
                c.last_modified = last_modified;
            }
        }
        self
    }
}

impl From<Account> for SourceRecord {
    fn from(a: Account) -> Self {
        SourceRecord::Account(a)
    }
}

impl From<Contact> for SourceRecord {
    fn from(c: Contact) -> Self {
        SourceRecord::Contact(c)
    }
}

/// A record as stored in the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: TargetId,
    pub object_type: ObjectType,
    /// Fields keyed by target field name (e.g. `Email Address`).
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Cross-reference to the source record this was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
}

impl TargetRecord {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}
