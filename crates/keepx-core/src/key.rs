//! Master key material.

use std::fmt;
use zeroize::Zeroizing;

/// The master key used to open and save a database.
///
/// The password is wiped from memory when the key is dropped.
#[derive(Clone)]
pub struct CompositeKey {
    password: Zeroizing<String>,
}

impl CompositeKey {
    pub fn from_password(password: impl Into<String>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Build the `keepass` crate's key.
    pub(crate) fn to_database_key(&self) -> keepass::DatabaseKey {
        keepass::DatabaseKey::new().with_password(&self.password)
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.password.as_bytes(), other.password.as_bytes());
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl Eq for CompositeKey {}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_and_redacts() {
        let a = CompositeKey::from_password("12345");
        assert_eq!(a, CompositeKey::from_password("12345"));
        assert_ne!(a, CompositeKey::from_password("54321"));
        assert!(!format!("{a:?}").contains("12345"));
    }
}
