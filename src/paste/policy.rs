//! Lifecycle policy: expiry and password checks
//!
//! Pure predicates over a record, the caller's credentials and the current
//! time. Access and edit passwords are deliberately asymmetric: an empty
//! access password lets everyone read, an empty edit password lets nobody
//! edit or delete.

use subtle::ConstantTimeEq;

use super::record::Paste;

/// True iff the paste has an expiry and `now` is past it.
pub fn is_expired(paste: &Paste, now: i64) -> bool {
    paste.expires_after != 0 && now > paste.created_at.saturating_add(paste.expires_after)
}

/// True iff the paste expired more than `grace` nanoseconds before `now`.
pub fn is_reapable(paste: &Paste, now: i64, grace: i64) -> bool {
    paste.expires_after != 0
        && now
            > paste
                .created_at
                .saturating_add(paste.expires_after)
                .saturating_add(grace)
}

/// True iff no access password is set or `supplied` matches it.
pub fn allows_access(paste: &Paste, supplied: &str) -> bool {
    paste.access_password.is_empty() || secret_eq(supplied, &paste.access_password)
}

/// True iff an edit password is set and `supplied` matches it.
pub fn allows_edit(paste: &Paste, supplied: &str) -> bool {
    !paste.edit_password.is_empty() && secret_eq(supplied, &paste.edit_password)
}

fn secret_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
