//! Profiles: the sections of checks plus the namespace of conditions,
//! expected values, iterargs, derived iterables and aliases they draw on.

use crate::callable::{Check, Condition, DerivedIterable, ExpectedValue, Iterarg, Testable, CONFIG_PARAM};
use crate::config::{Configuration, OverrideRule, Overrides};
use crate::error::{Result, SetupError};
use crate::section::Section;
use bakery_core::{Bindings, Status};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// What a name in the profile namespace refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    /// A condition (possibly one per testable scope)
    Condition,
    /// A caller-supplied input
    ExpectedValue,
    /// The singular name of an iterarg
    Iterarg,
    /// A derived iterable
    DerivedIterable,
    /// An alias for another name
    Alias,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NameKind::Condition => "condition",
            NameKind::ExpectedValue => "expected value",
            NameKind::Iterarg => "iterarg",
            NameKind::DerivedIterable => "derived iterable",
            NameKind::Alias => "alias",
        };
        f.write_str(name)
    }
}

/// Profile-level predicate deciding whether an identity runs.
///
/// Returning `Err(reason)` turns the identity into a SKIP.
pub type SkipFilter =
    Arc<dyn Fn(&str, &Bindings) -> std::result::Result<(), Option<String>> + Send + Sync>;

/// A named collection of sections and the declarations they depend on.
///
/// Built once, read-only while a run is in progress.
#[derive(Clone)]
pub struct Profile {
    name: String,
    description: Option<String>,
    sections: Vec<Section>,
    namespace: BTreeMap<String, NameKind>,
    conditions: BTreeMap<String, Vec<Condition>>,
    expected_values: BTreeMap<String, ExpectedValue>,
    iterargs: BTreeMap<String, Iterarg>,
    derived_iterables: BTreeMap<String, DerivedIterable>,
    aliases: BTreeMap<String, String>,
    overrides: Overrides,
    configuration_defaults: Configuration,
    skip_filter: Option<SkipFilter>,
    values_can_override_profile_names: bool,
}

/// Build a profile from sections.
pub fn new_profile(name: impl Into<String>, sections: impl IntoIterator<Item = Section>) -> Result<Profile> {
    let mut profile = Profile::new(name);
    for section in sections {
        profile.add_section(section)?;
    }
    Ok(profile)
}

impl Profile {
    /// Create an empty profile.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            sections: Vec::new(),
            namespace: BTreeMap::new(),
            conditions: BTreeMap::new(),
            expected_values: BTreeMap::new(),
            iterargs: BTreeMap::new(),
            derived_iterables: BTreeMap::new(),
            aliases: BTreeMap::new(),
            overrides: Overrides::new(),
            configuration_defaults: Configuration::default(),
            skip_filter: None,
            values_can_override_profile_names: true,
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Profile description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    // ---- sections and checks ----

    /// Sections in declared order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a section.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Every check with its section, in declared order.
    pub fn checks(&self) -> impl Iterator<Item = (&Section, &Check)> + '_ {
        self.sections
            .iter()
            .flat_map(|section| section.checks().iter().map(move |check| (section, check)))
    }

    /// Ids of all checks, in declared order.
    pub fn check_ids(&self) -> Vec<&str> {
        self.checks().map(|(_, check)| check.id()).collect()
    }

    /// Look up a check and its section.
    pub fn get_check(&self, id: &str) -> Option<(&Section, &Check)> {
        self.checks().find(|(_, check)| check.id() == id)
    }

    /// `Ok(true)` when the very same check is already registered.
    fn check_is_registered(&self, check: &Check) -> Result<bool> {
        match self.get_check(check.id()) {
            Some((_, existing)) if existing.is_same(check) => Ok(true),
            Some(_) => Err(SetupError::DuplicateCheck(check.id().to_string())),
            None => Ok(false),
        }
    }

    /// Add a section. Its check ids must be unique across the profile.
    pub fn add_section(&mut self, section: Section) -> Result<()> {
        if self.section(&section.name).is_some() {
            return Err(SetupError::DuplicateSection(section.name));
        }
        let mut seen = HashSet::new();
        for check in section.checks() {
            if self.check_is_registered(check)? || !seen.insert(check.id()) {
                return Err(SetupError::DuplicateCheck(check.id().to_string()));
            }
        }
        self.sections.push(section);
        Ok(())
    }

    /// Register a check into `section`, creating the section when missing.
    pub fn register_check(&mut self, section: &str, check: Check) -> Result<()> {
        if self.check_is_registered(&check)? {
            return Ok(());
        }
        match self.sections.iter_mut().find(|s| s.name == section) {
            Some(existing) => existing.add_check(check),
            None => {
                let mut created = Section::new(section);
                created.add_check(check)?;
                self.sections.push(created);
                Ok(())
            }
        }
    }

    /// Remove checks by id from every section.
    pub fn exclude<I, S>(&mut self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            let id = id.as_ref();
            let removed = self
                .sections
                .iter_mut()
                .filter_map(|section| section.remove_check(id))
                .count();
            if removed == 0 {
                return Err(SetupError::UnknownCheck(id.to_string()));
            }
            debug!(profile = %self.name, check = id, "Excluded check");
        }
        Ok(())
    }

    /// Merge `other` into this profile.
    ///
    /// Sections with the same name are merged; identical declarations are
    /// accepted, conflicting ones are rejected.
    pub fn include(&mut self, other: &Profile) -> Result<()> {
        for section in &other.sections {
            if self.section(&section.name).is_none() {
                let mut empty = Section::new(section.name.clone());
                empty.description = section.description.clone();
                self.sections.push(empty);
            }
            for check in section.checks() {
                self.register_check(&section.name, check.clone())?;
            }
        }
        for conditions in other.conditions.values() {
            for condition in conditions {
                self.register_condition(condition.clone())?;
            }
        }
        for expected in other.expected_values.values() {
            self.register_expected_value(expected.clone())?;
        }
        for iterarg in other.iterargs.values() {
            self.register_iterarg(iterarg.clone())?;
        }
        for derived in other.derived_iterables.values() {
            self.register_derived_iterable(derived.clone())?;
        }
        for (alias, target) in &other.aliases {
            self.register_alias(alias.clone(), target.clone())?;
        }
        for (check_id, rules) in &other.overrides {
            for rule in rules {
                self.add_override(check_id.clone(), rule.clone());
            }
        }
        self.configuration_defaults.overlay(&other.configuration_defaults);
        if self.skip_filter.is_none() {
            self.skip_filter = other.skip_filter.clone();
        }
        debug!(profile = %self.name, included = %other.name, "Included profile");
        Ok(())
    }

    // ---- namespace ----

    fn claim(&mut self, name: &str, kind: NameKind) -> Result<()> {
        match self.namespace.get(name) {
            Some(existing) if *existing != kind => Err(SetupError::NamespaceClash {
                name: name.to_string(),
                existing: existing.to_string(),
                requested: kind.to_string(),
            }),
            _ => {
                self.namespace.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    fn reject_reserved(name: &str) -> Result<()> {
        if Testable::is_reserved(name) {
            return Err(SetupError::ReservedName(name.to_string()));
        }
        Ok(())
    }

    /// Register a condition.
    ///
    /// One condition per name and testable scope; a `forced` declaration
    /// replaces an earlier one.
    pub fn register_condition(&mut self, condition: Condition) -> Result<()> {
        Self::reject_reserved(&condition.name)?;
        self.claim(&condition.name, NameKind::Condition)?;
        let scoped = self.conditions.entry(condition.name.clone()).or_default();
        match scoped.iter_mut().find(|c| c.testable == condition.testable) {
            Some(existing) if existing.is_same(&condition) => Ok(()),
            Some(existing) if condition.force => {
                *existing = condition;
                Ok(())
            }
            Some(existing) => Err(SetupError::NamespaceClash {
                name: condition.name.clone(),
                existing: format!("condition for {}", existing.testable),
                requested: format!("condition for {}", condition.testable),
            }),
            None => {
                scoped.push(condition);
                Ok(())
            }
        }
    }

    /// Register an expected value.
    pub fn register_expected_value(&mut self, expected: ExpectedValue) -> Result<()> {
        Self::reject_reserved(&expected.name)?;
        self.claim(&expected.name, NameKind::ExpectedValue)?;
        match self.expected_values.get(&expected.name) {
            Some(existing) if existing.is_same(&expected) => Ok(()),
            Some(_) => Err(SetupError::NamespaceClash {
                name: expected.name.clone(),
                existing: NameKind::ExpectedValue.to_string(),
                requested: NameKind::ExpectedValue.to_string(),
            }),
            None => {
                self.expected_values.insert(expected.name.clone(), expected);
                Ok(())
            }
        }
    }

    /// Register an iterarg. The singular may be a context name such as `font`.
    pub fn register_iterarg(&mut self, iterarg: Iterarg) -> Result<()> {
        if iterarg.singular == CONFIG_PARAM {
            return Err(SetupError::ReservedName(iterarg.singular));
        }
        self.claim(&iterarg.singular, NameKind::Iterarg)?;
        match self.iterargs.get(&iterarg.singular) {
            Some(existing) if *existing == iterarg => Ok(()),
            Some(_) => Err(SetupError::NamespaceClash {
                name: iterarg.singular.clone(),
                existing: NameKind::Iterarg.to_string(),
                requested: NameKind::Iterarg.to_string(),
            }),
            None => {
                self.iterargs.insert(iterarg.singular.clone(), iterarg);
                Ok(())
            }
        }
    }

    /// Register a derived iterable.
    pub fn register_derived_iterable(&mut self, derived: DerivedIterable) -> Result<()> {
        Self::reject_reserved(&derived.name)?;
        self.claim(&derived.name, NameKind::DerivedIterable)?;
        match self.derived_iterables.get(&derived.name) {
            Some(existing) if *existing == derived => Ok(()),
            Some(_) => Err(SetupError::NamespaceClash {
                name: derived.name.clone(),
                existing: NameKind::DerivedIterable.to_string(),
                requested: NameKind::DerivedIterable.to_string(),
            }),
            None => {
                self.derived_iterables.insert(derived.name.clone(), derived);
                Ok(())
            }
        }
    }

    /// Register `alias` as another name for `target`.
    pub fn register_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) -> Result<()> {
        let (alias, target) = (alias.into(), target.into());
        Self::reject_reserved(&alias)?;
        self.claim(&alias, NameKind::Alias)?;
        match self.aliases.get(&alias) {
            Some(existing) if *existing == target => Ok(()),
            Some(_) => Err(SetupError::NamespaceClash {
                name: alias,
                existing: NameKind::Alias.to_string(),
                requested: NameKind::Alias.to_string(),
            }),
            None => {
                self.aliases.insert(alias, target);
                Ok(())
            }
        }
    }

    /// Follow aliases until a non-alias name is reached.
    pub fn resolve_alias(&self, name: &str) -> Result<String> {
        let mut path = vec![name.to_string()];
        let mut current = name;
        while let Some(target) = self.aliases.get(current) {
            if path.iter().any(|seen| seen == target) {
                path.push(target.clone());
                return Err(SetupError::CircularAlias {
                    name: name.to_string(),
                    path,
                });
            }
            path.push(target.clone());
            current = target.as_str();
        }
        Ok(current.to_string())
    }

    /// What `name` refers to, without following aliases.
    pub fn kind_of(&self, name: &str) -> Option<NameKind> {
        self.namespace.get(name).copied()
    }

    /// Condition `name` as seen from `scope`: the exact scope, then the
    /// run scope, then the only declaration with that name.
    pub fn condition(&self, name: &str, scope: Testable) -> Option<&Condition> {
        let scoped = self.conditions.get(name)?;
        scoped
            .iter()
            .find(|c| c.testable == scope)
            .or_else(|| scoped.iter().find(|c| c.testable == Testable::Run))
            .or_else(|| if scoped.len() == 1 { scoped.first() } else { None })
    }

    /// Look up an expected value.
    pub fn expected_value(&self, name: &str) -> Option<&ExpectedValue> {
        self.expected_values.get(name)
    }

    /// All expected values.
    pub fn expected_values(&self) -> impl Iterator<Item = &ExpectedValue> + '_ {
        self.expected_values.values()
    }

    /// Look up an iterarg by its singular name.
    pub fn iterarg(&self, singular: &str) -> Option<&Iterarg> {
        self.iterargs.get(singular)
    }

    /// The iterarg whose plural is `plural`, if any.
    pub fn iterarg_for_plural(&self, plural: &str) -> Option<&Iterarg> {
        self.iterargs.values().find(|i| i.plural == plural)
    }

    /// Look up a derived iterable.
    pub fn derived_iterable(&self, name: &str) -> Option<&DerivedIterable> {
        self.derived_iterables.get(name)
    }

    // ---- iterarg analysis ----

    /// Iterargs a check expands over: those reachable from its mandatory
    /// parameters and its gating conditions. Sorted by name.
    pub fn iterargs_of_check(&self, check: &Check) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut visiting = HashSet::new();
        let names = check
            .params
            .iter()
            .filter(|p| !p.optional)
            .map(|p| p.name.as_str())
            .chain(check.conditions.iter().map(|c| c.name.as_str()));
        for name in names {
            self.collect_iterargs(name, check.testable, &mut found, &mut visiting);
        }
        found
    }

    /// Iterargs `name` transitively depends on through mandatory parameters.
    pub fn iterargs_of(&self, name: &str, scope: Testable) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        self.collect_iterargs(name, scope, &mut found, &mut HashSet::new());
        found
    }

    fn collect_iterargs(
        &self,
        name: &str,
        scope: Testable,
        found: &mut BTreeSet<String>,
        visiting: &mut HashSet<String>,
    ) {
        let Ok(name) = self.resolve_alias(name) else {
            return;
        };
        if !visiting.insert(name.clone()) {
            return;
        }
        match self.kind_of(&name) {
            Some(NameKind::Iterarg) => {
                found.insert(name.clone());
            }
            Some(NameKind::Condition) => {
                if let Some(condition) = self.condition(&name, scope) {
                    for param in condition.params.iter().filter(|p| !p.optional) {
                        self.collect_iterargs(&param.name, condition.testable, found, visiting);
                    }
                }
            }
            // A derived iterable collapses the dimension it maps over.
            _ => {}
        }
        visiting.remove(&name);
    }

    /// The single iterarg a derived iterable maps its source over.
    pub fn derived_iterable_dimension(&self, derived: &DerivedIterable) -> Result<String> {
        let scope = self
            .condition(&derived.source, Testable::Run)
            .map(|c| c.testable)
            .unwrap_or_default();
        let iterargs = self.iterargs_of(&derived.source, scope);
        let mut iter = iterargs.into_iter();
        match (iter.next(), iter.next()) {
            (Some(dimension), None) => Ok(dimension),
            _ => Err(SetupError::NotIterable {
                name: derived.name.clone(),
                condition: derived.source.clone(),
            }),
        }
    }

    // ---- validation ----

    fn undeclared(&self, name: &str) -> Result<Option<String>> {
        if name == CONFIG_PARAM {
            return Ok(None);
        }
        let resolved = self.resolve_alias(name)?;
        Ok(self.kind_of(&resolved).is_none().then_some(resolved))
    }

    /// Verify every referenced name is declared and conditions don't depend
    /// on each other in a loop.
    pub fn test_dependencies(&self) -> Result<()> {
        let mut referenced: Vec<&str> = Vec::new();
        for (_, check) in self.checks() {
            referenced.extend(check.params.iter().filter(|p| !p.optional).map(|p| p.name.as_str()));
            referenced.extend(check.conditions.iter().map(|c| c.name.as_str()));
        }
        for condition in self.conditions.values().flatten() {
            referenced.extend(condition.params.iter().filter(|p| !p.optional).map(|p| p.name.as_str()));
        }
        referenced.extend(self.aliases.values().map(String::as_str));

        let mut undeclared = BTreeSet::new();
        for name in referenced {
            if let Some(name) = self.undeclared(name)? {
                undeclared.insert(name);
            }
        }
        for iterarg in self.iterargs.values() {
            if self.kind_of(&iterarg.plural) != Some(NameKind::ExpectedValue) {
                undeclared.insert(iterarg.plural.clone());
            }
        }
        for derived in self.derived_iterables.values() {
            if self.kind_of(&derived.source) != Some(NameKind::Condition) {
                undeclared.insert(derived.source.clone());
            }
        }
        if !undeclared.is_empty() {
            return Err(SetupError::UndeclaredNames(undeclared.into_iter().collect()));
        }

        let mut done = HashSet::new();
        for condition in self.conditions.values().flatten() {
            let mut path = Vec::new();
            self.visit_dependencies(&condition.name, condition.testable, &mut path, &mut done)?;
        }
        for derived in self.derived_iterables.values() {
            self.derived_iterable_dimension(derived)?;
        }
        Ok(())
    }

    fn visit_dependencies(
        &self,
        name: &str,
        scope: Testable,
        path: &mut Vec<String>,
        done: &mut HashSet<(String, Testable)>,
    ) -> Result<()> {
        let name = self.resolve_alias(name)?;
        if path.contains(&name) {
            path.push(name.clone());
            return Err(SetupError::CircularDependency {
                name,
                path: path.clone(),
            });
        }

        let (scope, dependencies): (Testable, Vec<String>) = match self.kind_of(&name) {
            Some(NameKind::Condition) => match self.condition(&name, scope) {
                Some(condition) => (
                    condition.testable,
                    condition.params.iter().map(|p| p.name.clone()).collect(),
                ),
                None => return Ok(()),
            },
            Some(NameKind::DerivedIterable) => match self.derived_iterables.get(&name) {
                Some(derived) => (scope, vec![derived.source.clone()]),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        if done.contains(&(name.clone(), scope)) {
            return Ok(());
        }

        path.push(name.clone());
        for dependency in dependencies {
            if dependency == CONFIG_PARAM {
                continue;
            }
            self.visit_dependencies(&dependency, scope, path, done)?;
        }
        path.pop();
        done.insert((name, scope));
        Ok(())
    }

    /// Verify the profile holds the `expected` checks; with `exclusive`,
    /// nothing else either.
    pub fn test_expected_checks<I, S>(&self, expected: I, exclusive: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registered: BTreeSet<&str> = self.check_ids().into_iter().collect();
        let expected: Vec<String> = expected.into_iter().map(|s| s.as_ref().to_string()).collect();

        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = expected
            .iter()
            .filter(|id| !seen.insert(id.as_str()))
            .map(String::as_str)
            .collect();
        if !duplicates.is_empty() {
            problems.push(format!("duplicate expected checks: {}", duplicates.join(", ")));
        }

        let missing: Vec<&str> = expected
            .iter()
            .map(String::as_str)
            .filter(|id| !registered.contains(id))
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing checks: {}", missing.join(", ")));
        }

        if exclusive {
            let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
            let unexpected: Vec<&str> = registered
                .iter()
                .copied()
                .filter(|id| !expected_set.contains(id))
                .collect();
            if !unexpected.is_empty() {
                problems.push(format!("unexpected checks: {}", unexpected.join(", ")));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SetupError::ExpectedChecks(problems.join("; ")))
        }
    }

    /// Whether caller supplied values may shadow profile names.
    pub fn set_values_can_override_profile_names(&mut self, allowed: bool) {
        self.values_can_override_profile_names = allowed;
    }

    /// Reject supplied value names that collide with non-input profile names
    /// unless shadowing is allowed.
    pub fn check_value_names<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        if self.values_can_override_profile_names {
            return Ok(());
        }
        for name in names {
            match self.kind_of(name) {
                None | Some(NameKind::ExpectedValue) => {}
                Some(kind) => {
                    return Err(SetupError::ValueCollision {
                        name: name.to_string(),
                        kind: kind.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    // ---- skip filter ----

    /// Install a skip filter.
    pub fn set_skip_filter<F>(&mut self, filter: F)
    where
        F: Fn(&str, &Bindings) -> std::result::Result<(), Option<String>> + Send + Sync + 'static,
    {
        self.skip_filter = Some(Arc::new(filter));
    }

    /// Ask the skip filter about one identity; `Err` holds the reason text.
    pub fn check_skip_filter(&self, check_id: &str, bindings: &Bindings) -> std::result::Result<(), String> {
        match &self.skip_filter {
            Some(filter) => filter(check_id, bindings)
                .map_err(|reason| reason.unwrap_or_else(|| "(no message)".to_string())),
            None => Ok(()),
        }
    }

    // ---- overrides and configuration ----

    /// Add an override rule for `check_id`.
    pub fn add_override(&mut self, check_id: impl Into<String>, rule: OverrideRule) {
        let rules = self.overrides.entry(check_id.into()).or_default();
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }

    /// The profile's override table.
    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// The rule reclassifying `code` of `check_id`, if any.
    pub fn override_rule(&self, check_id: &str, code: &str) -> Option<&OverrideRule> {
        self.overrides
            .get(check_id)?
            .iter()
            .find(|rule| rule.code == code)
    }

    /// Replacement status for `code` of `check_id`, if any.
    pub fn should_override(&self, check_id: &str, code: &str) -> Option<Status> {
        self.override_rule(check_id, code).map(|rule| rule.status)
    }

    /// Set the default configuration of one check.
    pub fn set_configuration_defaults(&mut self, check_id: impl Into<String>, values: serde_json::Value) {
        let mut defaults = Configuration::default();
        defaults.checks.insert(check_id.into(), values);
        self.configuration_defaults.overlay(&defaults);
    }

    /// Configuration defaults declared by the profile.
    pub fn configuration_defaults(&self) -> &Configuration {
        &self.configuration_defaults
    }

    /// The profile defaults with `user` layered on top.
    pub fn merge_default_config(&self, user: &Configuration) -> Configuration {
        let mut merged = self.configuration_defaults.clone();
        merged.overlay(user);
        merged
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("sections", &self.sections)
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::NO_PARAMS;
    use bakery_core::Value;

    fn check(id: &str, params: &[&str], conditions: &[&str]) -> Check {
        Check::builder(id)
            .params(params.iter().copied())
            .conditions(conditions.iter().copied())
            .body_fn(|_, _| Ok(()))
            .build()
            .unwrap()
    }

    fn condition(name: &str, params: &[&str]) -> Condition {
        Condition::from_fn(name, Testable::Font, params.iter().copied(), |_| Ok(Value::Bool(true)))
    }

    fn fonts_profile() -> Profile {
        let mut profile = Profile::new("fonts");
        profile
            .register_expected_value(ExpectedValue::new("fonts", "Font files"))
            .unwrap();
        profile.register_iterarg(Iterarg::new("font", "fonts")).unwrap();
        profile
    }

    #[test]
    fn test_new_profile_rejects_duplicate_ids_across_sections() {
        let a = Section::new("A").with_check(check("same", &[], &[])).unwrap();
        let b = Section::new("B").with_check(check("same", &[], &[])).unwrap();
        let err = new_profile("p", [a, b]).unwrap_err();
        assert_eq!(err, SetupError::DuplicateCheck("same".into()));
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let mut profile = Profile::new("p");
        let err = profile
            .register_condition(Condition::from_fn("font", Testable::Font, NO_PARAMS, |_| Ok(Value::Null)))
            .unwrap_err();
        assert_eq!(err, SetupError::ReservedName("font".into()));
        assert!(profile
            .register_expected_value(ExpectedValue::new("config", ""))
            .is_err());
        // iterargs may bind a context name
        assert!(profile.register_iterarg(Iterarg::new("font", "fonts")).is_ok());
    }

    #[test]
    fn test_namespace_clash() {
        let mut profile = fonts_profile();
        let err = profile
            .register_condition(condition("fonts", &["font"]))
            .unwrap_err();
        assert!(matches!(err, SetupError::NamespaceClash { ref name, .. } if name == "fonts"));
    }

    #[test]
    fn test_condition_scope_fallback() {
        let mut profile = Profile::new("p");
        let run_level = Condition::from_fn("network", Testable::Run, NO_PARAMS, |_| Ok(Value::Bool(true)));
        profile.register_condition(run_level).unwrap();
        let font_level = Condition::from_fn("is_ttf", Testable::Font, NO_PARAMS, |_| Ok(Value::Bool(true)));
        profile.register_condition(font_level).unwrap();

        assert_eq!(profile.condition("network", Testable::Font).unwrap().testable, Testable::Run);
        assert_eq!(profile.condition("is_ttf", Testable::Family).unwrap().testable, Testable::Font);
        assert!(profile.condition("missing", Testable::Run).is_none());
    }

    #[test]
    fn test_same_condition_twice_is_noop_and_force_replaces() {
        let mut profile = Profile::new("p");
        let first = condition("is_ttf", &[]);
        profile.register_condition(first.clone()).unwrap();
        profile.register_condition(first).unwrap();
        assert!(profile.register_condition(condition("is_ttf", &[])).is_err());
        profile
            .register_condition(condition("is_ttf", &["font"]).forced())
            .unwrap();
        assert_eq!(profile.condition("is_ttf", Testable::Font).unwrap().params.len(), 1);
    }

    #[test]
    fn test_undeclared_names() {
        let mut profile = fonts_profile();
        profile
            .register_check("S", check("c", &["font", "ttFont"], &["is_ttf"]))
            .unwrap();
        let err = profile.test_dependencies().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Profile uses names that are not declared in its namespace: is_ttf, ttFont"
        );
    }

    #[test]
    fn test_circular_dependency() {
        let mut profile = fonts_profile();
        profile.register_condition(condition("a", &["b"])).unwrap();
        profile.register_condition(condition("b", &["a"])).unwrap();
        let err = profile.test_dependencies().unwrap_err();
        assert!(matches!(err, SetupError::CircularDependency { .. }));
    }

    #[test]
    fn test_alias_resolution_and_cycles() {
        let mut profile = fonts_profile();
        profile.register_alias("ttf_files", "fonts").unwrap();
        assert_eq!(profile.resolve_alias("ttf_files").unwrap(), "fonts");

        profile.register_alias("x", "y").unwrap();
        profile.register_alias("y", "x").unwrap();
        let err = profile.resolve_alias("x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Alias for \"x\" has a circular reference in x -> y -> x"
        );
    }

    #[test]
    fn test_iterargs_reach_through_conditions() {
        let mut profile = fonts_profile();
        profile.register_condition(condition("ttFont", &["font"])).unwrap();
        profile.register_condition(condition("is_ttf", &["ttFont"])).unwrap();
        profile
            .register_derived_iterable(DerivedIterable::new("ttFonts", "ttFont", false))
            .unwrap();

        let per_font = check("per_font", &[], &["is_ttf"]);
        let whole = check("whole", &["fonts", "ttFonts"], &[]);
        assert_eq!(profile.iterargs_of_check(&per_font), BTreeSet::from(["font".to_string()]));
        assert!(profile.iterargs_of_check(&whole).is_empty());

        let derived = profile.derived_iterable("ttFonts").unwrap().clone();
        assert_eq!(profile.derived_iterable_dimension(&derived).unwrap(), "font");
    }

    #[test]
    fn test_derived_iterable_needs_an_iterarg() {
        let mut profile = fonts_profile();
        profile.register_condition(condition("constant", &[])).unwrap();
        profile
            .register_derived_iterable(DerivedIterable::new("constants", "constant", true))
            .unwrap();
        let err = profile.test_dependencies().unwrap_err();
        assert!(matches!(err, SetupError::NotIterable { .. }));
    }

    #[test]
    fn test_include_and_exclude() {
        let mut base = fonts_profile();
        base.register_check("Universal", check("a", &[], &[])).unwrap();

        let mut extra = fonts_profile();
        extra.register_check("Universal", check("b", &[], &[])).unwrap();
        extra.register_check("Extra", check("c", &[], &[])).unwrap();
        extra.add_override("b", OverrideRule::new("x", Status::Warn));

        base.include(&extra).unwrap();
        assert_eq!(base.check_ids(), vec!["a", "b", "c"]);
        assert_eq!(base.should_override("b", "x"), Some(Status::Warn));

        base.exclude(["b"]).unwrap();
        assert_eq!(base.check_ids(), vec!["a", "c"]);
        assert_eq!(
            base.exclude(["nope"]).unwrap_err(),
            SetupError::UnknownCheck("nope".into())
        );
    }

    #[test]
    fn test_include_rejects_conflicting_check() {
        let shared = check("a", &[], &[]);
        let mut base = fonts_profile();
        base.register_check("Universal", shared.clone()).unwrap();

        let mut same = Profile::new("same");
        same.register_check("Universal", shared).unwrap();
        base.include(&same).unwrap();
        assert_eq!(base.check_ids(), vec!["a"]);

        let mut other = Profile::new("other");
        other.register_check("Universal", check("a", &[], &[])).unwrap();
        assert_eq!(
            base.include(&other).unwrap_err(),
            SetupError::DuplicateCheck("a".into())
        );
    }

    #[test]
    fn test_should_override_is_pure_lookup() {
        let mut profile = Profile::new("p");
        profile.add_override("c", OverrideRule::new("bad", Status::Warn).with_message("meh"));
        assert_eq!(profile.should_override("c", "bad"), Some(Status::Warn));
        assert_eq!(profile.should_override("c", "other"), None);
        assert_eq!(profile.should_override("d", "bad"), None);
        assert_eq!(profile.override_rule("c", "bad").unwrap().message.as_deref(), Some("meh"));
    }

    #[test]
    fn test_expected_checks() {
        let mut profile = Profile::new("p");
        profile.register_check("S", check("a", &[], &[])).unwrap();
        profile.register_check("S", check("b", &[], &[])).unwrap();

        assert!(profile.test_expected_checks(["a"], false).is_ok());
        let err = profile.test_expected_checks(["a"], true).unwrap_err();
        assert_eq!(err.to_string(), "Profile fails expected checks test: unexpected checks: b");
        let err = profile.test_expected_checks(["a", "z"], false).unwrap_err();
        assert!(err.to_string().contains("missing checks: z"));
    }

    #[test]
    fn test_value_names_collision() {
        let mut profile = fonts_profile();
        profile.register_condition(condition("is_ttf", &["font"])).unwrap();
        assert!(profile.check_value_names(["is_ttf"]).is_ok());

        profile.set_values_can_override_profile_names(false);
        assert!(profile.check_value_names(["fonts"]).is_ok());
        assert!(matches!(
            profile.check_value_names(["is_ttf"]),
            Err(SetupError::ValueCollision { .. })
        ));
    }

    #[test]
    fn test_skip_filter_reason() {
        let mut profile = Profile::new("p");
        assert!(profile.check_skip_filter("c", &Bindings::empty()).is_ok());
        profile.set_skip_filter(|id, _| if id == "slow" { Err(None) } else { Ok(()) });
        assert_eq!(
            profile.check_skip_filter("slow", &Bindings::empty()).unwrap_err(),
            "(no message)"
        );
        assert!(profile.check_skip_filter("fast", &Bindings::empty()).is_ok());
    }

    #[test]
    fn test_merge_default_config() {
        let mut profile = Profile::new("p");
        profile.set_configuration_defaults("file_size", serde_json::json!({"WARN_SIZE": 1, "FAIL_SIZE": 2}));
        let user = Configuration::from_json_str(r#"{"file_size": {"FAIL_SIZE": 5}}"#).unwrap();
        let merged = profile.merge_default_config(&user);
        let config = merged.check_config("file_size");
        assert_eq!(config.get::<u64>("WARN_SIZE"), Some(1));
        assert_eq!(config.get::<u64>("FAIL_SIZE"), Some(5));
    }
}
