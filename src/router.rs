//! Recipient-to-mailbox resolution.

use crate::config::Mailbox;

/// Find the mailbox configured for `address`.
///
/// Linear scan in configuration order; the comparison is ASCII
/// case-insensitive. The first match wins, so a duplicated address only ever
/// resolves to the earliest configured mailbox. Absence of a match is a
/// normal outcome; a catch-all entry is a configuration convention, not
/// something enforced here.
pub fn match_mailbox<'a>(mailboxes: &'a [Mailbox], address: &str) -> Option<&'a Mailbox> {
    mailboxes
        .iter()
        .find(|mailbox| mailbox.address.eq_ignore_ascii_case(address))
}
