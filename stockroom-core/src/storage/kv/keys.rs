//! Key layout - every key in a partition is tagged with its shape.
//!
//! The users partition holds both data records and email index pointers.
//! A scan over `RECORD_PREFIX` never sees an index pointer, so listings
//! never have to guess a value's shape from its bytes.
//!
//! ```text
//! users     r:<id>     → UserRecord
//!           e:<email>  → <id>
//! products  r:<id>     → ProductRecord
//! sales     r:<id>     → SaleRecord
//! ```

/// Prefix of data records, in every partition.
pub const RECORD_PREFIX: &[u8] = b"r:";

/// Prefix of email index pointers in the users partition.
pub const EMAIL_PREFIX: &[u8] = b"e:";

/// Key of the data record for `id`.
#[must_use]
pub fn record_key(id: &str) -> Vec<u8> {
    debug_assert!(!id.is_empty(), "record id cannot be empty");
    tagged(RECORD_PREFIX, id)
}

/// Key of the index pointer for a normalised `email`.
#[must_use]
pub fn email_key(email: &str) -> Vec<u8> {
    debug_assert!(!email.is_empty(), "email cannot be empty");
    tagged(EMAIL_PREFIX, email)
}

fn tagged(prefix: &[u8], suffix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix.as_bytes());
    key
}
