//! Name-based lookup of registered estimator adapters.

use std::collections::BTreeMap;

use px_types::IrtVariant;

use crate::irt::IrtRegressor;

/// Maps `(family, name)` pairs to estimator constructors. The default
/// registry carries the IRT family under its conventional member names.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    entries: BTreeMap<(String, String), IrtVariant>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
        };
        registry.register("irt", "rasch", IrtVariant::Rasch);
        registry.register("irt", "1pl", IrtVariant::Rasch);
        registry.register("irt", "2pl", IrtVariant::TwoParameter);
        registry.register("irt", "3pl", IrtVariant::ThreeParameter);
        registry.register("irt", "4pl", IrtVariant::FourParameter);
        registry
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) one adapter name. Names are matched
    /// case-insensitively.
    pub fn register(
        &mut self,
        family: impl Into<String>,
        name: impl Into<String>,
        variant: IrtVariant,
    ) {
        self.entries.insert(
            (
                family.into().to_lowercase(),
                name.into().to_lowercase(),
            ),
            variant,
        );
    }

    pub fn contains(&self, family: &str, name: &str) -> bool {
        self.entries
            .contains_key(&(family.to_lowercase(), name.to_lowercase()))
    }

    /// Fresh estimator for a registered name, `None` for unknown names.
    pub fn create(&self, family: &str, name: &str) -> Option<IrtRegressor> {
        self.entries
            .get(&(family.to_lowercase(), name.to_lowercase()))
            .map(|&variant| IrtRegressor::new(variant))
    }

    /// Registered `(family, name)` pairs in lexical order.
    pub fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .keys()
            .map(|(family, name)| (family.as_str(), name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_the_irt_family() {
        let registry = AdapterRegistry::new();
        for name in ["rasch", "1pl", "2pl", "3pl", "4pl"] {
            assert!(registry.contains("irt", name), "missing irt/{name}");
        }
        assert!(!registry.contains("irt", "5pl"));
        assert!(!registry.contains("svm", "rasch"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = AdapterRegistry::new();
        let estimator = registry.create("IRT", "Rasch").unwrap();
        assert_eq!(estimator.declared(), IrtVariant::Rasch);
    }

    #[test]
    fn created_estimators_carry_their_variant() {
        let registry = AdapterRegistry::new();
        assert_eq!(
            registry.create("irt", "3pl").unwrap().declared(),
            IrtVariant::ThreeParameter
        );
        assert_eq!(
            registry.create("irt", "1pl").unwrap().declared(),
            IrtVariant::Rasch
        );
        assert!(registry.create("irt", "unknown").is_none());
    }

    #[test]
    fn custom_registrations_extend_the_table() {
        let mut registry = AdapterRegistry::new();
        registry.register("irt", "two_parameter", IrtVariant::TwoParameter);
        assert_eq!(
            registry.create("irt", "TWO_PARAMETER").unwrap().declared(),
            IrtVariant::TwoParameter
        );
        assert_eq!(registry.names().count(), 6);
    }
}
