//! Catalog of loadable profiles.

use crate::error::{Result, SetupError};
use crate::profile::Profile;
use std::collections::BTreeMap;

type ProfileFactory = Box<dyn Fn() -> Result<Profile> + Send + Sync>;

/// Registry of profiles by name. Profiles are built on demand.
pub struct ProfileCatalog {
    factories: BTreeMap<String, ProfileFactory>,
}

impl ProfileCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a profile factory under `name`, replacing an earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Profile> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Unregister a profile.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    /// Build the profile registered as `name` and verify its dependencies.
    pub fn load(&self, name: &str) -> Result<Profile> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SetupError::UnknownProfile(name.to_string()))?;
        let profile = factory()?;
        profile.test_dependencies()?;
        Ok(profile)
    }

    /// Registered profile names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::Check;

    #[test]
    fn test_register_and_load() {
        let mut catalog = ProfileCatalog::new();
        catalog.register("universal", || {
            let mut profile = Profile::new("universal");
            profile.register_check(
                "Universal",
                Check::builder("noop").body_fn(|_, _| Ok(())).build()?,
            )?;
            Ok(profile)
        });

        assert_eq!(catalog.list(), vec!["universal"]);
        assert_eq!(catalog.load("universal").unwrap().check_ids(), vec!["noop"]);
        assert_eq!(
            catalog.load("nope").unwrap_err(),
            SetupError::UnknownProfile("nope".into())
        );
        assert!(catalog.unregister("universal"));
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_load_validates_dependencies() {
        let mut catalog = ProfileCatalog::default();
        catalog.register("broken", || {
            let mut profile = Profile::new("broken");
            profile.register_check(
                "S",
                Check::builder("needs").params(["missing"]).body_fn(|_, _| Ok(())).build()?,
            )?;
            Ok(profile)
        });
        assert!(matches!(
            catalog.load("broken"),
            Err(SetupError::UndeclaredNames(names)) if names == vec!["missing".to_string()]
        ));
    }
}
