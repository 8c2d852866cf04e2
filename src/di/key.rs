use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a Rust type used as a lookup key.
///
/// Equality and hashing only look at the `TypeId`; the name is kept for
/// diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Container lookup key: either a type identity or an opaque string token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Type(TypeKey),
    Token(Cow<'static, str>),
}

impl Key {
    /// Key for the type `T`. Works for trait objects too (`Key::of::<dyn Router>()`).
    pub fn of<T: ?Sized + 'static>() -> Self {
        Key::Type(TypeKey::of::<T>())
    }

    pub fn token(token: impl Into<Cow<'static, str>>) -> Self {
        Key::Token(token.into())
    }

    pub fn is_token(&self) -> bool {
        matches!(self, Key::Token(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(key) => f.write_str(key.name()),
            Key::Token(token) => write!(f, "\"{token}\""),
        }
    }
}

impl From<&'static str> for Key {
    fn from(token: &'static str) -> Self {
        Key::token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Database;
    trait Repository {}

    #[test]
    fn type_keys_compare_by_identity() {
        assert_eq!(Key::of::<Database>(), Key::of::<Database>());
        assert_ne!(Key::of::<Database>(), Key::of::<dyn Repository>());
    }

    #[test]
    fn token_and_type_never_collide() {
        let mut keys = HashSet::new();
        keys.insert(Key::of::<Database>());
        keys.insert(Key::token("Database"));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn display_uses_type_name_or_quoted_token() {
        assert!(Key::of::<Database>().to_string().ends_with("Database"));
        assert_eq!(Key::token("request").to_string(), "\"request\"");
    }
}
