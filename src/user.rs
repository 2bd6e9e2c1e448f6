//! The identity shared by [`crate::client::Client`] and [`crate::bot::LocalBot`]:
//! nickname/username/realname, and the set of channels joined. Index
//! bookkeeping (nickname and channel-membership) is the server's job;
//! `UserCore` only tracks what this one user believes is true about itself.

use std::collections::BTreeSet;

/// A handle into the server's client or bot arena. Cheap to copy, orderable
/// so it can live in a `BTreeSet` (channel member sets, dedup scratch
/// space) with a deterministic iteration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum UserId {
    Client(usize),
    Bot(usize),
}

/// Placeholder identity string before NICK/USER registration completes.
pub const UNSET: &str = "*";

#[derive(Default)]
pub struct UserCore {
    nickname: Option<String>,
    username: Option<String>,
    realname: Option<String>,
    channels: BTreeSet<String>,
}

impl UserCore {
    pub fn nickname(&self) -> &str {
        self.nickname.as_deref().unwrap_or(UNSET)
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(UNSET)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(UNSET)
    }

    pub fn has_nickname(&self) -> bool {
        self.nickname.is_some()
    }

    /// I1: `username` is set iff `realname` is set, so either one tells
    /// you whether USER has landed.
    pub fn is_registered(&self) -> bool {
        self.nickname.is_some() && self.username.is_some()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn is_in_channel(&self, name: &str) -> bool {
        self.channels.contains(name)
    }

    /// Replaces the nickname, returning the previous one (if any) so the
    /// caller (the server) can update its index: insert the new key before
    /// removing the old one.
    pub(crate) fn set_nick(&mut self, nick: String) -> Option<String> {
        self.nickname.replace(nick)
    }

    pub(crate) fn set_user(&mut self, username: String, realname: String) {
        self.username = Some(username);
        self.realname = Some(realname);
    }

    pub(crate) fn join_channel(&mut self, name: &str) {
        self.channels.insert(name.to_owned());
    }

    pub(crate) fn leave_channel(&mut self, name: &str) {
        self.channels.remove(name);
    }

    pub(crate) fn take_channels(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_fields_default_to_placeholder() {
        let u = UserCore::default();
        assert_eq!(u.nickname(), "*");
        assert_eq!(u.username(), "*");
        assert_eq!(u.realname(), "*");
        assert!(!u.has_nickname());
        assert!(!u.is_registered());
    }

    #[test]
    fn registration_requires_both_nick_and_user() {
        let mut u = UserCore::default();
        u.set_nick("alice".to_owned());
        assert!(!u.is_registered());
        u.set_user("alice".to_owned(), "Alice A".to_owned());
        assert!(u.is_registered());
    }

    #[test]
    fn set_nick_returns_previous() {
        let mut u = UserCore::default();
        assert_eq!(u.set_nick("alice".to_owned()), None);
        assert_eq!(u.set_nick("alice2".to_owned()), Some("alice".to_owned()));
    }
}
