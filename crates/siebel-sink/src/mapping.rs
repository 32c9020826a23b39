//! Source to Siebel field mapping.
//!
//! Typed fields map to fixed Siebel field names. Extra source fields are
//! renamed when a Siebel counterpart is known and passed through under their
//! source name otherwise. Null extras are dropped.

use serde_json::Value;
use sync_core::{Account, Contact, ObjectType, SourceRecord, TargetId};

use crate::TargetFields;

pub const ACCOUNT_NAME: &str = "Name";
pub const ACCOUNT_NUMBER: &str = "Account Number";
pub const ACCOUNT_EMPLOYEES: &str = "Number of Employees";

pub const CONTACT_FIRST_NAME: &str = "First Name";
pub const CONTACT_LAST_NAME: &str = "Last Name";
pub const CONTACT_EMAIL: &str = "Email Address";
pub const CONTACT_ACCOUNT_ID: &str = "Account Id";

const ACCOUNT_EXTRAS: &[(&str, &str)] = &[
    ("Description", "Description"),
    ("Industry", "Industry"),
    ("Phone", "Main Phone Number"),
    ("Website", "Home Page"),
];

const CONTACT_EXTRAS: &[(&str, &str)] = &[
    ("Department", "Department"),
    ("Description", "Comment"),
    ("MailingCity", "City"),
    ("MailingCountry", "Country"),
    ("MobilePhone", "Cellular Phone #"),
    ("Phone", "Work Phone #"),
    ("Title", "Job Title"),
];

/// Target field holding the natural key of `object_type`.
pub fn natural_key_field(object_type: ObjectType) -> &'static str {
    match object_type {
        ObjectType::Account => ACCOUNT_NAME,
        ObjectType::Contact => CONTACT_EMAIL,
    }
}

/// Map a source record to Siebel fields.
///
/// `account` is the target id of a contact's parent account; it is ignored
/// for accounts. Natural key values are trimmed so they match the keys the
/// loader searches with.
pub fn transform(record: &SourceRecord, account: Option<&TargetId>) -> TargetFields {
    match record {
        SourceRecord::Account(a) => transform_account(a),
        SourceRecord::Contact(c) => transform_contact(c, account),
    }
}

fn transform_account(account: &Account) -> TargetFields {
    let mut fields = TargetFields::new();
    fields.insert(ACCOUNT_NAME.into(), account.name.trim().into());
    if let Some(number) = &account.account_number {
        fields.insert(ACCOUNT_NUMBER.into(), number.clone().into());
    }
    if let Some(count) = account.number_of_employees {
        fields.insert(ACCOUNT_EMPLOYEES.into(), count.into());
    }
    insert_extras(&mut fields, &account.extra, ACCOUNT_EXTRAS);
    fields
}

fn transform_contact(contact: &Contact, account: Option<&TargetId>) -> TargetFields {
    let mut fields = TargetFields::new();
    if let Some(first_name) = &contact.first_name {
        fields.insert(CONTACT_FIRST_NAME.into(), first_name.clone().into());
    }
    fields.insert(CONTACT_LAST_NAME.into(), contact.last_name.clone().into());
    if let Some(email) = &contact.email {
        fields.insert(CONTACT_EMAIL.into(), email.trim().into());
    }
    if let Some(account) = account {
        fields.insert(CONTACT_ACCOUNT_ID.into(), account.as_str().into());
    }
    insert_extras(&mut fields, &contact.extra, CONTACT_EXTRAS);
    fields
}

fn insert_extras(
    fields: &mut TargetFields,
    extra: &sync_core::ExtraFields,
    renames: &[(&str, &str)],
) {
    for (name, value) in extra {
        if value.is_null() {
            continue;
        }
        let target = renames
            .iter()
            .find(|(source, _)| *source == name.as_str())
            .map(|(_, target)| (*target).to_string())
            .unwrap_or_else(|| name.clone());
        // Typed fields always win over an extra of the same name.
        fields.entry(target).or_insert_with(|| value.clone());
    }
}

/// Value of a field as a string, if it is one.
pub fn field_as_str<'a>(fields: &'a TargetFields, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(Value::as_str)
}
