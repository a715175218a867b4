pub mod db_utils;
pub mod identity_cache;
pub mod identity_filter;

use strum_macros::Display;

/// Unique login identifiers tracked by the availability filter and cache.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum IdentityKind {
    Username,
    Email,
}

impl IdentityKind {
    pub fn column(self) -> &'static str {
        match self {
            IdentityKind::Username => "username",
            IdentityKind::Email => "email",
        }
    }
}

/// Key shared by the filter and the cache, case-insensitive.
#[inline]
pub fn identity_key(kind: IdentityKind, value: &str) -> String {
    format!("{}:{}", kind, value.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_and_normalized() {
        assert_eq!(identity_key(IdentityKind::Username, " Alice "), "username:alice");
        assert_eq!(identity_key(IdentityKind::Email, "A@B.com"), "email:a@b.com");
        assert_ne!(
            identity_key(IdentityKind::Username, "x"),
            identity_key(IdentityKind::Email, "x")
        );
    }

    #[test]
    fn column_matches_key_prefix() {
        for kind in [IdentityKind::Username, IdentityKind::Email] {
            assert_eq!(kind.column(), kind.to_string());
        }
        assert_eq!(IdentityKind::Username.column(), "username");
        assert_eq!(IdentityKind::Email.column(), "email");
    }
}
