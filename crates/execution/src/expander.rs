//! Expansion of a profile into the ordered identities of a run.

use crate::error::RunnerError;
use crate::resolver::Resolver;
use bakery_core::{Bindings, Identity};
use bakery_profile::{Check, Configuration};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Token of `custom_order` standing for "every check".
pub const CHECK_TOKEN: &str = "*check";

/// Token of `custom_order` standing for "every section".
pub const SECTION_TOKEN: &str = "*section";

/// One identity scheduled for execution.
#[derive(Debug, Clone)]
pub struct Planned {
    /// The identity
    pub identity: Identity,

    /// The check to invoke
    pub check: Check,
}

/// Whether the substring filters of `config` admit `check_id`.
///
/// `explicit_checks` selects, `exclude_checks` is applied last.
pub fn is_selected(config: &Configuration, check_id: &str) -> bool {
    let included = match &config.explicit_checks {
        Some(explicit) => explicit.iter().any(|pattern| check_id.contains(pattern.as_str())),
        None => true,
    };
    let excluded = match &config.exclude_checks {
        Some(exclude) => exclude.iter().any(|pattern| check_id.contains(pattern.as_str())),
        None => false,
    };
    included && !excluded
}

/// Every combination of indices over `dimensions`, last dimension varying
/// fastest. No dimensions yield exactly one empty binding.
pub fn cartesian(dimensions: &[(String, usize)]) -> Vec<Bindings> {
    let mut combinations: Vec<Vec<(String, usize)>> = vec![Vec::new()];
    for (name, len) in dimensions {
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                (0..*len).map(move |index| {
                    let mut next = prefix.clone();
                    next.push((name.clone(), index));
                    next
                })
            })
            .collect();
    }
    combinations.into_iter().map(Bindings::from_pairs).collect()
}

/// The iterarg that leads the execution order, taken from the first
/// iterarg token before `*check` in `custom_order`.
fn outer_iterarg(resolver: &Resolver, config: &Configuration) -> Option<String> {
    let order = config.custom_order.as_ref()?;
    for token in order {
        if token == CHECK_TOKEN {
            return None;
        }
        if token == SECTION_TOKEN {
            continue;
        }
        if resolver.profile().iterarg(token).is_some() {
            return Some(token.clone());
        }
        warn!(token = %token, "Ignoring unknown custom_order token");
    }
    None
}

/// Identities of one check, in binding order.
fn expand_check(resolver: &Resolver, section: &str, check: &Check) -> Result<Vec<Planned>, RunnerError> {
    let iterargs: BTreeSet<String> = resolver.profile().iterargs_of_check(check);
    let mut dimensions = Vec::with_capacity(iterargs.len());
    for singular in iterargs {
        let len = match resolver.profile().iterarg(&singular) {
            Some(iterarg) => match resolver.input(&iterarg.plural) {
                Some(value) => value
                    .as_list()
                    .map(<[_]>::len)
                    .ok_or_else(|| RunnerError::NotAList(iterarg.plural.clone()))?,
                None => 0,
            },
            None => 0,
        };
        dimensions.push((singular, len));
    }

    Ok(cartesian(&dimensions)
        .into_iter()
        .map(|bindings| Planned {
            identity: Identity::new(section, check.id(), bindings),
            check: check.clone(),
        })
        .collect())
}

/// The ordered identities of a run.
///
/// Identities come section by section, check by check. With a leading
/// iterarg in `custom_order`, checks of a section that don't depend on it run
/// first; the rest of that section runs element by element of that iterarg.
pub fn plan(resolver: &Resolver) -> Result<Vec<Planned>, RunnerError> {
    let config = resolver.config();
    let mut sections: Vec<(String, Vec<Planned>)> = Vec::new();
    for (section, check) in resolver.profile().checks() {
        if !is_selected(config, check.id()) {
            debug!(check = check.id(), "Check filtered out");
            continue;
        }
        let planned = expand_check(resolver, &section.name, check)?;
        match sections.last_mut() {
            Some((name, identities)) if *name == section.name => identities.extend(planned),
            _ => sections.push((section.name.clone(), planned)),
        }
    }

    let Some(outer) = outer_iterarg(resolver, config) else {
        return Ok(sections.into_iter().flat_map(|(_, identities)| identities).collect());
    };
    let len = resolver.iterarg_len(&outer).unwrap_or(0);

    let mut ordered = Vec::new();
    for (_, identities) in sections {
        ordered.extend(order_by_outer(identities, &outer, len));
    }
    Ok(ordered)
}

/// Identities not bound to `outer` first, then the bound ones grouped by
/// element of `outer`.
fn order_by_outer(identities: Vec<Planned>, outer: &str, len: usize) -> Vec<Planned> {
    let (mut ordered, grouped): (Vec<_>, Vec<_>) = identities
        .into_iter()
        .partition(|planned| planned.identity.bindings.get(outer).is_none());
    for index in 0..len {
        ordered.extend(
            grouped
                .iter()
                .filter(|planned| planned.identity.bindings.get(outer) == Some(index))
                .cloned(),
        );
    }
    ordered
}
