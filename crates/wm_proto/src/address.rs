//! `user@domain` mail addresses.
//!
//! Usernames are lowercase by construction and domains are lowercased on
//! the way in, so `to_string()` is the one canonical key for sessions,
//! pinned identities and routing.

use std::fmt;
use std::str::FromStr;

use crate::{error::ProtoError, validate};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub username: String,
    pub domain: String,
}

impl Address {
    pub fn new(username: impl Into<String>, domain: impl Into<String>) -> Self {
        Self { username: username.into(), domain: domain.into().to_ascii_lowercase() }
    }

    pub fn is_local_to(&self, domain: &str) -> bool {
        self.domain.eq_ignore_ascii_case(domain)
    }
}

impl FromStr for Address {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (username, domain) = s
            .split_once('@')
            .ok_or_else(|| ProtoError::validation(format!("{s:?} is not a user@domain address")))?;
        validate::username(username)?;
        if domain.is_empty() || domain.contains('@') || domain.contains('/') {
            return Err(ProtoError::validation(format!("invalid domain in {s:?}")));
        }
        Ok(Self::new(username, domain))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.domain)
    }
}
