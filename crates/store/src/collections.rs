//! Logical collection names for the document schema.

/// The collection names the adapter writes to. Deployments that index
/// several chains into one store disambiguate them with a chain prefix,
/// e.g. `Ethereum__Mainnet__Block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSet {
    /// Block collection name.
    pub block: String,
    /// Transaction collection name.
    pub transaction: String,
    /// Log collection name.
    pub log: String,
    /// Access-list entry collection name.
    pub access_list_entry: String,
}

impl Default for CollectionSet {
    fn default() -> Self {
        Self {
            block: "Block".to_string(),
            transaction: "Transaction".to_string(),
            log: "Log".to_string(),
            access_list_entry: "AccessListEntry".to_string(),
        }
    }
}

impl CollectionSet {
    /// Returns the default collection names under a chain prefix.
    pub fn prefixed(prefix: &str) -> Self {
        Self {
            block: format!("{prefix}__Block"),
            transaction: format!("{prefix}__Transaction"),
            log: format!("{prefix}__Log"),
            access_list_entry: format!("{prefix}__AccessListEntry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let set = CollectionSet::default();
        assert_eq!(set.block, "Block");
        assert_eq!(set.access_list_entry, "AccessListEntry");
    }

    #[test]
    fn test_prefixed_names() {
        let set = CollectionSet::prefixed("Ethereum__Mainnet");
        assert_eq!(set.block, "Ethereum__Mainnet__Block");
        assert_eq!(set.log, "Ethereum__Mainnet__Log");
    }
}
