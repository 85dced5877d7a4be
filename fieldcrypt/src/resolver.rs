//! Key name resolution.

/// Default content key name.
pub const DEFAULT_ENCRYPTION_KEY_NAME: &str = "encryption-key";

/// Default blind index key name.
pub const DEFAULT_BLIND_ID_KEY_NAME: &str = "blind-id-key";

/// Chooses key names for entities.
///
/// Implement this to give tenants or entity types their own keys.
pub trait KeyNameResolver: Send + Sync {
    /// Returns the content key name for an entity type.
    fn resolve_encryption_key_name(&self, entity: &str) -> String;

    /// Returns the key name used for blind indexes.
    fn resolve_blind_id_key_name(&self) -> String;
}

/// Resolver returning the same names for every entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticKeyNameResolver {
    encryption_key_name: String,
    blind_id_key_name: String,
}

impl StaticKeyNameResolver {
    /// Creates a resolver with fixed key names.
    #[must_use]
    pub fn new(
        encryption_key_name: impl Into<String>,
        blind_id_key_name: impl Into<String>,
    ) -> Self {
        Self {
            encryption_key_name: encryption_key_name.into(),
            blind_id_key_name: blind_id_key_name.into(),
        }
    }
}

impl Default for StaticKeyNameResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ENCRYPTION_KEY_NAME, DEFAULT_BLIND_ID_KEY_NAME)
    }
}

impl KeyNameResolver for StaticKeyNameResolver {
    fn resolve_encryption_key_name(&self, _entity: &str) -> String {
        self.encryption_key_name.clone()
    }

    fn resolve_blind_id_key_name(&self) -> String {
        self.blind_id_key_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let resolver = StaticKeyNameResolver::default();
        assert_eq!(resolver.resolve_encryption_key_name("Person"), "encryption-key");
        assert_eq!(resolver.resolve_blind_id_key_name(), "blind-id-key");
    }

    #[test]
    fn test_custom_names_ignore_entity() {
        let resolver = StaticKeyNameResolver::new("tenant-a", "tenant-a-index");
        assert_eq!(resolver.resolve_encryption_key_name("Person"), "tenant-a");
        assert_eq!(resolver.resolve_encryption_key_name("Order"), "tenant-a");
        assert_eq!(resolver.resolve_blind_id_key_name(), "tenant-a-index");
    }
}
