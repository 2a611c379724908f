use std::collections::HashMap;

/// Display information for a resource type the tree knows how to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedType {
    /// Lower-cased type tag, e.g. `microsoft.web/sites`.
    pub key: String,
    pub display_name: String,
    pub icon: String,
}

/// Registry of resource types shown by default. Types outside the registry
/// are hidden unless hidden types are turned on, and every registered type
/// gets a (possibly empty) group when grouping by type.
#[derive(Debug, Clone)]
pub struct SupportedTypeRegistry {
    types: Vec<SupportedType>,
    index: HashMap<String, usize>,
}

impl Default for SupportedTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SupportedTypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Compute
        registry.insert("Microsoft.Compute/virtualMachines", "Virtual machines", "virtualMachine");
        registry.insert("Microsoft.ContainerService/managedClusters", "Kubernetes services", "kubernetes");
        registry.insert("Microsoft.App/containerApps", "Container Apps", "containerApp");
        registry.insert("Microsoft.ContainerRegistry/registries", "Container registries", "containerRegistry");

        // Web
        registry.insert("Microsoft.Web/sites", "App Services", "appService");
        registry.insert("Microsoft.Web/staticSites", "Static Web Apps", "staticWebApp");
        registry.insert("Microsoft.Logic/workflows", "Logic apps", "logicApp");

        // Data
        registry.insert("Microsoft.Storage/storageAccounts", "Storage accounts", "storageAccount");
        registry.insert("Microsoft.DocumentDB/databaseAccounts", "Azure Cosmos DB", "cosmosDb");
        registry.insert("Microsoft.Sql/servers", "SQL servers", "sqlServer");
        registry.insert("Microsoft.DBforPostgreSQL/flexibleServers", "PostgreSQL servers", "postgres");

        // Security
        registry.insert("Microsoft.KeyVault/vaults", "Key vaults", "keyVault");

        registry
    }

    pub fn empty() -> Self {
        Self {
            types: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a registry from `(type, display name, icon)` triples.
    pub fn from_types<'a, I>(types: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut registry = Self::empty();
        for (resource_type, display_name, icon) in types {
            registry.insert(resource_type, display_name, icon);
        }
        registry
    }

    pub fn insert(&mut self, resource_type: &str, display_name: &str, icon: &str) {
        let key = resource_type.to_ascii_lowercase();
        let entry = SupportedType {
            key: key.clone(),
            display_name: display_name.to_string(),
            icon: icon.to_string(),
        };
        match self.index.get(&key) {
            Some(&i) => self.types[i] = entry,
            None => {
                self.index.insert(key, self.types.len());
                self.types.push(entry);
            }
        }
    }

    pub fn is_supported(&self, resource_type: &str) -> bool {
        self.index.contains_key(&resource_type.to_ascii_lowercase())
    }

    pub fn get(&self, resource_type: &str) -> Option<&SupportedType> {
        self.index
            .get(&resource_type.to_ascii_lowercase())
            .map(|&i| &self.types[i])
    }

    pub fn types(&self) -> &[SupportedType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn display_name_for(&self, resource_type: &str) -> String {
        self.get(resource_type)
            .map(|t| t.display_name.clone())
            .unwrap_or_else(|| resource_type.to_string())
    }

    pub fn icon_for(&self, resource_type: &str) -> String {
        self.get(resource_type)
            .map(|t| t.icon.clone())
            .unwrap_or_else(|| "resource".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = SupportedTypeRegistry::new();
        assert!(registry.is_supported("microsoft.storage/storageaccounts"));
        assert!(registry.is_supported("Microsoft.Storage/storageAccounts"));
        assert!(!registry.is_supported("Microsoft.Unknown/things"));
    }

    #[test]
    fn test_fallback_display_and_icon() {
        let registry = SupportedTypeRegistry::new();
        assert_eq!(registry.display_name_for("Microsoft.Web/sites"), "App Services");
        assert_eq!(registry.display_name_for("X/y"), "X/y");
        assert_eq!(registry.icon_for("X/y"), "resource");
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut registry = SupportedTypeRegistry::from_types([("A/b", "B", "b")]);
        registry.insert("a/B", "Renamed", "r");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.display_name_for("A/b"), "Renamed");
    }
}
