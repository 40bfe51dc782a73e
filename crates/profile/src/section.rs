//! Sections: named, ordered groups of checks.

use crate::callable::Check;
use crate::error::{Result, SetupError};

/// An ordered group of checks reported together.
#[derive(Debug, Clone)]
pub struct Section {
    /// Section name
    pub name: String,

    /// Short description
    pub description: Option<String>,

    checks: Vec<Check>,
}

impl Section {
    /// Create an empty section.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            checks: Vec::new(),
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Builder form of [`Section::add_check`].
    pub fn with_check(mut self, check: Check) -> Result<Self> {
        self.add_check(check)?;
        Ok(self)
    }

    /// Append a check. Adding the very same declaration twice is a no-op.
    pub fn add_check(&mut self, check: Check) -> Result<()> {
        if let Some(existing) = self.get_check(check.id()) {
            if existing.is_same(&check) {
                return Ok(());
            }
            return Err(SetupError::DuplicateCheck(check.id().to_string()));
        }
        self.checks.push(check);
        Ok(())
    }

    /// Remove a check by id.
    pub fn remove_check(&mut self, id: &str) -> Option<Check> {
        let index = self.checks.iter().position(|c| c.id() == id)?;
        Some(self.checks.remove(index))
    }

    /// Replace a check in place, keeping its position.
    pub fn replace_check(&mut self, id: &str, check: Check) -> Result<()> {
        let slot = self
            .checks
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| SetupError::UnknownCheck(id.to_string()))?;
        *slot = check;
        Ok(())
    }

    /// Look up a check.
    pub fn get_check(&self, id: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.id() == id)
    }

    /// Checks in declared order.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether the section holds no checks.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// A copy holding only the checks accepted by `keep`.
    pub fn clone_filtered(&self, mut keep: impl FnMut(&Check) -> bool) -> Section {
        Section {
            name: self.name.clone(),
            description: self.description.clone(),
            checks: self.checks.iter().filter(|c| keep(c)).cloned().collect(),
        }
    }

    /// Merge the checks of `other` into this section, keeping order.
    pub fn merge(&mut self, other: &Section) -> Result<()> {
        for check in other.checks() {
            self.add_check(check.clone())?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Section: {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(id: &str) -> Check {
        Check::builder(id).body_fn(|_, _| Ok(())).build().unwrap()
    }

    #[test]
    fn test_add_and_order() {
        let mut section = Section::new("Universal");
        section.add_check(check("b")).unwrap();
        section.add_check(check("a")).unwrap();
        let ids: Vec<_> = section.checks().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_ids() {
        let same = check("dup");
        let mut section = Section::new("S");
        section.add_check(same.clone()).unwrap();
        section.add_check(same).unwrap();
        assert_eq!(section.len(), 1);

        let err = section.add_check(check("dup")).unwrap_err();
        assert_eq!(err, SetupError::DuplicateCheck("dup".into()));
    }

    #[test]
    fn test_remove_replace_filter() {
        let mut section = Section::new("S")
            .with_check(check("a"))
            .unwrap()
            .with_check(check("b"))
            .unwrap()
            .with_check(check("c"))
            .unwrap();

        assert!(section.remove_check("b").is_some());
        assert!(section.remove_check("b").is_none());

        section.replace_check("a", check("a2")).unwrap();
        assert_eq!(section.checks()[0].id(), "a2");
        assert!(section.replace_check("zz", check("zz")).is_err());

        let filtered = section.clone_filtered(|c| c.id() == "c");
        assert_eq!(filtered.len(), 1);
        assert_eq!(section.len(), 2);
    }
}
