//! Dependency resolution: turns declared parameter names into values for
//! one identity.
//!
//! A value supplied by the caller always wins. Otherwise the name is looked
//! up by its declared kind: aliases resolve to their target, expected values
//! fall back to their default, iterargs bind the element of the identity,
//! conditions go through the [`ConditionCache`] and derived iterables map
//! their source condition over its iterarg. `config` is never resolved; it
//! is handed to bodies as [`Args::config`].

use crate::cache::{CacheKey, ConditionCache};
use crate::error::{panic_detail, Fault};
use bakery_core::{Bindings, Value};
use bakery_profile::{
    Args, Check, CheckConfig, ConditionRef, Configuration, NameKind, Param, Profile, Testable,
    CONFIG_PARAM,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;

/// Resolves parameters against a profile, the caller's values and the
/// run configuration. Shared by every identity of a run.
pub struct Resolver {
    profile: Arc<Profile>,
    values: HashMap<String, Value>,
    config: Configuration,
    cache: ConditionCache,
}

impl Resolver {
    /// Create a resolver with an empty cache.
    pub fn new(profile: Arc<Profile>, values: HashMap<String, Value>, config: Configuration) -> Self {
        Self {
            profile,
            values,
            config,
            cache: ConditionCache::new(),
        }
    }

    /// The profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The effective configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The condition cache.
    pub fn cache(&self) -> &ConditionCache {
        &self.cache
    }

    /// A supplied value or an expected-value default.
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.profile.expected_value(name)?.default.as_ref())
    }

    /// Number of elements behind the iterarg `singular`.
    pub fn iterarg_len(&self, singular: &str) -> Option<usize> {
        let iterarg = self.profile.iterarg(singular)?;
        self.input(&iterarg.plural)?.as_list().map(<[Value]>::len)
    }

    /// Resolve `name` as seen from `scope` for an identity bound to
    /// `bindings`. `Ok(None)` means an optional value is absent.
    pub fn resolve<'a>(
        &'a self,
        name: &'a str,
        scope: Testable,
        bindings: &'a Bindings,
        optional: bool,
    ) -> BoxFuture<'a, Result<Option<Value>, Fault>> {
        async move {
            if let Some(value) = self.values.get(name) {
                return Ok(Some(value.clone()));
            }

            let missing = || {
                if optional {
                    Ok(None)
                } else {
                    Err(Fault::MissingValue(name.to_string()))
                }
            };

            match self.profile.kind_of(name) {
                Some(NameKind::Alias) => {
                    let target = self
                        .profile
                        .resolve_alias(name)
                        .map_err(|_| Fault::MissingValue(name.to_string()))?;
                    self.resolve(&target, scope, bindings, optional).await
                }
                Some(NameKind::ExpectedValue) => match self.input(name) {
                    Some(value) => Ok(Some(value.clone())),
                    None => missing(),
                },
                Some(NameKind::Iterarg) => match bindings.get(name) {
                    Some(index) => self.iterarg_item(name, index).map(Some),
                    None => missing(),
                },
                Some(NameKind::Condition) => {
                    self.evaluate_condition(name, scope, bindings).await.map(Some)
                }
                Some(NameKind::DerivedIterable) => self.derived_iterable(name).await.map(Some),
                None => missing(),
            }
        }
        .boxed()
    }

    fn iterarg_item(&self, singular: &str, index: usize) -> Result<Value, Fault> {
        let iterarg = self
            .profile
            .iterarg(singular)
            .ok_or_else(|| Fault::MissingValue(singular.to_string()))?;
        let item = self
            .input(&iterarg.plural)
            .and_then(Value::as_list)
            .and_then(|items| items.get(index))
            .ok_or_else(|| Fault::MissingValue(singular.to_string()))?;
        if let Some(expected) = self.profile.expected_value(&iterarg.plural) {
            expected
                .validate_item(item)
                .map_err(|reason| Fault::InvalidItem {
                    name: iterarg.plural.clone(),
                    index,
                    reason,
                })?;
        }
        Ok(item.clone())
    }

    /// Value of condition `name` for `bindings`, evaluated at most once per
    /// cache key.
    pub fn evaluate_condition<'a>(
        &'a self,
        name: &'a str,
        scope: Testable,
        bindings: &'a Bindings,
    ) -> BoxFuture<'a, Result<Value, Fault>> {
        async move {
            let condition = self
                .profile
                .condition(name, scope)
                .ok_or_else(|| Fault::MissingValue(name.to_string()))?;
            let used = self.profile.iterargs_of(name, condition.testable);
            let key_bindings = bindings.restrict(|iterarg| used.contains(iterarg));
            let key = CacheKey::new(name, condition.testable, key_bindings.clone());

            self.cache
                .get_or_evaluate(key, || async {
                    debug!(condition = name, bindings = %key_bindings, "Evaluating condition");
                    let config = Arc::new(self.config.check_config(name));
                    let args = self
                        .build_args(&condition.params, condition.testable, &key_bindings, config)
                        .await?;
                    let outcome = AssertUnwindSafe(condition.body().evaluate(&args))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(Fault::FailedCondition {
                            name: name.to_string(),
                            detail: format!("{err:#}"),
                        }),
                        Err(payload) => Err(Fault::FailedCondition {
                            name: name.to_string(),
                            detail: format!("panicked: {}", panic_detail(payload.as_ref())),
                        }),
                    }
                })
                .await
        }
        .boxed()
    }

    /// Map the source condition of derived iterable `name` over its iterarg.
    async fn derived_iterable(&self, name: &str) -> Result<Value, Fault> {
        let missing = || Fault::MissingValue(name.to_string());
        let derived = self.profile.derived_iterable(name).ok_or_else(missing)?;
        let dimension = self
            .profile
            .derived_iterable_dimension(derived)
            .map_err(|_| missing())?;
        let len = self.iterarg_len(&dimension).ok_or_else(missing)?;
        let scope = self
            .profile
            .condition(&derived.source, Testable::Run)
            .map(|c| c.testable)
            .unwrap_or_default();

        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            let bindings = Bindings::from_pairs([(dimension.clone(), index)]);
            let value = self.evaluate_condition(&derived.source, scope, &bindings).await?;
            items.push(if derived.simple {
                value
            } else {
                Value::Indexed(bindings, Box::new(value))
            });
        }
        Ok(Value::List(items))
    }

    async fn build_args(
        &self,
        params: &[Param],
        scope: Testable,
        bindings: &Bindings,
        config: Arc<CheckConfig>,
    ) -> Result<Args, Fault> {
        let mut args = Args::new(config);
        for param in params.iter().filter(|p| p.name != CONFIG_PARAM) {
            if let Some(value) = self.resolve(&param.name, scope, bindings, param.optional).await? {
                args.insert(param.name.clone(), value);
            }
        }
        Ok(args)
    }

    /// Gating conditions of `check` that are not fulfilled for `bindings`.
    ///
    /// Every condition is evaluated so all failing references are reported.
    pub async fn unfulfilled_conditions<'c>(
        &self,
        check: &'c Check,
        bindings: &Bindings,
    ) -> Result<Vec<&'c ConditionRef>, Fault> {
        let mut unfulfilled = Vec::new();
        for reference in &check.conditions {
            let value = self
                .resolve(&reference.name, check.testable, bindings, false)
                .await?
                .unwrap_or(Value::Null);
            if !reference.is_fulfilled(&value) {
                unfulfilled.push(reference);
            }
        }
        Ok(unfulfilled)
    }

    /// Arguments for one invocation of `check`.
    pub async fn check_args(&self, check: &Check, bindings: &Bindings) -> Result<Args, Fault> {
        let config = Arc::new(self.config.check_config(check.id()));
        self.build_args(&check.params, check.testable, bindings, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_profile::{Condition, DerivedIterable, ExpectedValue, Iterarg, NO_PARAMS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn font(index: usize) -> Bindings {
        Bindings::from_pairs([("font".to_string(), index)])
    }

    fn profile(calls: Arc<AtomicUsize>) -> Profile {
        let mut profile = Profile::new("test");
        profile
            .register_expected_value(
                ExpectedValue::new("fonts", "Font files").with_item_validator(|item| {
                    match item.as_str() {
                        Some(path) if path.ends_with(".ttf") => Ok(()),
                        _ => Err("not a .ttf file".to_string()),
                    }
                }),
            )
            .unwrap();
        profile.register_iterarg(Iterarg::new("font", "fonts")).unwrap();
        profile
            .register_condition(Condition::from_fn("ttFont", Testable::Font, ["font"], move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(format!("ttFont({})", args.text("font")?)))
            }))
            .unwrap();
        profile
            .register_condition(Condition::from_fn(
                "is_variable_font",
                Testable::Font,
                ["ttFont"],
                |args| Ok(Value::Bool(args.text("ttFont")?.contains("VF"))),
            ))
            .unwrap();
        profile
            .register_condition(Condition::from_fn("broken", Testable::Font, NO_PARAMS, |_| {
                anyhow::bail!("cannot read table")
            }))
            .unwrap();
        profile
            .register_derived_iterable(DerivedIterable::new("ttFonts", "ttFont", true))
            .unwrap();
        profile
            .register_derived_iterable(DerivedIterable::new("indexedFonts", "ttFont", false))
            .unwrap();
        profile
            .register_condition(Condition::from_fn("panicky", Testable::Font, NO_PARAMS, |_| {
                panic!("bad table")
            }))
            .unwrap();
        profile.register_alias("ttf", "ttFont").unwrap();
        profile
    }

    fn resolver(calls: Arc<AtomicUsize>, fonts: &[&str]) -> Resolver {
        let values = HashMap::from([("fonts".to_string(), Value::from(fonts.to_vec()))]);
        Resolver::new(Arc::new(profile(calls)), values, Configuration::default())
    }

    #[tokio::test]
    async fn test_condition_memoization() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls.clone(), &["A.ttf", "B.ttf"]);

        let first = resolver.evaluate_condition("ttFont", Testable::Font, &font(0)).await;
        let second = resolver.evaluate_condition("ttFont", Testable::Font, &font(0)).await;
        assert_eq!(first, Ok(Value::from("ttFont(A.ttf)")));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // dependent conditions reuse the cached dependency
        resolver
            .evaluate_condition("is_variable_font", Testable::Font, &font(0))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_derived_iterable_reuses_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls.clone(), &["A.ttf", "B.ttf", "C.ttf"]);

        resolver.evaluate_condition("ttFont", Testable::Font, &font(1)).await.unwrap();
        let derived = resolver
            .resolve("ttFonts", Testable::Run, &Bindings::empty(), false)
            .await
            .unwrap();
        assert_eq!(
            derived,
            Some(Value::from(vec!["ttFont(A.ttf)", "ttFont(B.ttf)", "ttFont(C.ttf)"]))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_indexed_derived_iterable_keeps_bindings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls.clone(), &["A.ttf", "B.ttf"]);

        let derived = resolver
            .resolve("indexedFonts", Testable::Run, &Bindings::empty(), false)
            .await
            .unwrap();
        assert_eq!(
            derived,
            Some(Value::List(vec![
                Value::Indexed(font(0), Box::new(Value::from("ttFont(A.ttf)"))),
                Value::Indexed(font(1), Box::new(Value::from("ttFont(B.ttf)"))),
            ]))
        );

        resolver
            .resolve("ttFonts", Testable::Run, &Bindings::empty(), false)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_condition_panic_is_a_condition_fault() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls, &["A.ttf"]);

        let err = resolver
            .evaluate_condition("panicky", Testable::Font, &font(0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "failed-condition");
        assert_eq!(
            err.to_string(),
            "The condition panicky had an error: panicked: bad table"
        );
    }

    #[tokio::test]
    async fn test_aliases_and_iterargs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls, &["A.ttf", "B.ttf"]);

        let via_alias = resolver.resolve("ttf", Testable::Font, &font(1), false).await.unwrap();
        assert_eq!(via_alias, Some(Value::from("ttFont(B.ttf)")));

        let item = resolver.resolve("font", Testable::Font, &font(0), false).await.unwrap();
        assert_eq!(item, Some(Value::from("A.ttf")));

        let unbound = resolver.resolve("font", Testable::Font, &Bindings::empty(), true).await;
        assert_eq!(unbound, Ok(None));
        let unbound = resolver.resolve("font", Testable::Font, &Bindings::empty(), false).await;
        assert_eq!(unbound, Err(Fault::MissingValue("font".into())));
    }

    #[tokio::test]
    async fn test_item_validator_fails_one_element() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls, &["A.ttf", "notes.txt"]);

        assert!(resolver.resolve("font", Testable::Font, &font(0), false).await.is_ok());
        let err = resolver.resolve("font", Testable::Font, &font(1), false).await.unwrap_err();
        assert_eq!(err.code(), "invalid-value");
    }

    #[tokio::test]
    async fn test_condition_failure_keeps_detail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = resolver(calls, &["A.ttf"]);

        let err = resolver
            .evaluate_condition("broken", Testable::Font, &font(0))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The condition broken had an error: cannot read table");
        assert_eq!(resolver.cache().evaluations(), 1);
        resolver
            .evaluate_condition("broken", Testable::Font, &font(0))
            .await
            .unwrap_err();
        assert_eq!(resolver.cache().evaluations(), 1);
    }

    #[tokio::test]
    async fn test_supplied_values_shadow_profile_names() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut values = HashMap::from([("fonts".to_string(), Value::from(vec!["A.ttf"]))]);
        values.insert("is_variable_font".to_string(), Value::Bool(true));
        let resolver = Resolver::new(Arc::new(profile(calls.clone())), values, Configuration::default());

        let value = resolver
            .resolve("is_variable_font", Testable::Font, &font(0), false)
            .await
            .unwrap();
        assert_eq!(value, Some(Value::Bool(true)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
