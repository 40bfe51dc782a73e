//! Status aggregation and override application.

use bakery_core::{CheckResult, Event, Message, Status};
use bakery_profile::{Configuration, OverrideRule, Profile};
use tracing::debug;

/// `max` over the event statuses; `None` for no events.
pub fn summary_status(events: &[Event]) -> Option<Status> {
    events.iter().map(|event| event.status).max()
}

/// Seal `result` with its summary status.
///
/// When nothing at or above PASS was reported, an explanatory ERROR event is
/// appended and the summary is ERROR.
pub fn seal(result: &mut CheckResult) -> Status {
    let summary = match summary_status(&result.events) {
        Some(status) if status >= Status::Pass => status,
        Some(status) => {
            result.events.push(Event::new(
                Status::Error,
                format!(
                    "The most significant status of {} was only {} but the minimum is {}",
                    result.identity.check,
                    status,
                    Status::Pass
                ),
            ));
            Status::Error
        }
        None => {
            result.events.push(Event::new(
                Status::Error,
                format!("The check {} did not yield any status", result.identity.check),
            ));
            Status::Error
        }
    };
    result.seal(summary);
    summary
}

/// The rule for `code` of `check_id`; configuration rules win over profile
/// rules.
pub fn find_override<'a>(
    profile: &'a Profile,
    config: &'a Configuration,
    check_id: &str,
    code: &str,
) -> Option<&'a OverrideRule> {
    config
        .overrides
        .get(check_id)
        .and_then(|rules| rules.iter().find(|rule| rule.code == code))
        .or_else(|| profile.override_rule(check_id, code))
}

/// Rewrite the coded events of `check_id` that have an override rule.
/// Returns the number of rewritten events.
///
/// Only events emitted by the check body are passed here; events the runner
/// synthesizes for faults and gating are never overridden. The result is
/// sealed afterwards.
pub fn apply_overrides(
    events: &mut [Event],
    check_id: &str,
    profile: &Profile,
    config: &Configuration,
) -> usize {
    let mut rewritten = 0;
    for event in events.iter_mut() {
        let Some(code) = event.message.code().map(str::to_string) else {
            continue;
        };
        let Some(rule) = find_override(profile, config, check_id, &code) else {
            continue;
        };
        debug!(
            check = %check_id,
            code = %code,
            from = %event.status,
            to = %rule.status,
            "Overriding status"
        );
        event.overridden_from.get_or_insert(event.status);
        event.status = rule.status;
        if let Some(text) = &rule.message {
            event.message = Message::new(code, text.clone()).into();
        }
        rewritten += 1;
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_core::{Bindings, CheckMeta, Identity};
    use std::sync::Arc;

    fn result(events: Vec<Event>) -> CheckResult {
        let mut result = CheckResult::new(
            Identity::new("S", "file_size", Bindings::empty()),
            Arc::new(CheckMeta {
                id: "file_size".into(),
                ..Default::default()
            }),
        );
        for event in events {
            result.push(event);
        }
        result
    }

    #[test]
    fn test_aggregation_is_max() {
        let mut r = result(vec![
            Event::new(Status::Pass, "a"),
            Event::new(Status::Warn, "b"),
            Event::new(Status::Info, "c"),
        ]);
        assert_eq!(seal(&mut r), Status::Warn);
        assert_eq!(r.events.len(), 3);

        let mut r = result(vec![Event::new(Status::Skip, "s"), Event::new(Status::Pass, "p")]);
        assert_eq!(seal(&mut r), Status::Skip);
    }

    #[test]
    fn test_floor_invariant() {
        let mut empty = result(vec![]);
        assert_eq!(seal(&mut empty), Status::Error);
        assert_eq!(empty.events.len(), 1);
        assert_eq!(
            empty.events[0].message.text(),
            "The check file_size did not yield any status"
        );

        let mut debug_only = result(vec![Event::new(Status::Debug, "d")]);
        assert_eq!(seal(&mut debug_only), Status::Error);
        assert_eq!(debug_only.events.len(), 2);
        assert!(debug_only.events[1].message.text().contains("was only DEBUG"));
    }

    #[test]
    fn test_override_rewrites_event_and_summary() {
        let mut profile = Profile::new("p");
        profile.add_override("file_size", OverrideRule::new("large-file", Status::Warn));

        let mut events = vec![
            Event::coded(Status::Fail, "large-file", "Too big"),
            Event::coded(Status::Pass, "other", "fine"),
        ];
        let count = apply_overrides(&mut events, "file_size", &profile, &Configuration::default());
        assert_eq!(count, 1);

        let mut r = result(events);
        assert_eq!(seal(&mut r), Status::Warn);
        assert_eq!(r.events[0].status, Status::Warn);
        assert_eq!(r.events[0].overridden_from, Some(Status::Fail));
        assert_eq!(r.events[0].message.text(), "Too big");
        assert_eq!(r.summary_status(), Status::Warn);
    }

    #[test]
    fn test_configuration_overrides_win() {
        let mut profile = Profile::new("p");
        profile.add_override("file_size", OverrideRule::new("large-file", Status::Warn));
        let config = Configuration::from_json_str(
            r#"{"overrides": {"file_size": [{"code": "large-file", "status": "INFO", "message": "Accepted"}]}}"#,
        )
        .unwrap();

        let mut events = vec![Event::coded(Status::Fail, "large-file", "Too big")];
        apply_overrides(&mut events, "file_size", &profile, &config);
        let mut r = result(events);
        seal(&mut r);
        assert_eq!(r.events[0].status, Status::Info);
        assert_eq!(r.events[0].message.text(), "Accepted");
        assert_eq!(r.summary_status(), Status::Info);
    }

    #[test]
    fn test_override_below_pass_hits_floor() {
        let mut profile = Profile::new("p");
        profile.add_override("file_size", OverrideRule::new("noise", Status::Debug));
        let mut events = vec![Event::coded(Status::Warn, "noise", "meh")];
        apply_overrides(&mut events, "file_size", &profile, &Configuration::default());
        let mut r = result(events);
        seal(&mut r);
        assert_eq!(r.summary_status(), Status::Error);
    }

    #[test]
    fn test_override_lifts_debug_output_above_floor() {
        let mut profile = Profile::new("p");
        profile.add_override("file_size", OverrideRule::new("x", Status::Warn));
        let mut events = vec![Event::coded(Status::Debug, "x", "quiet")];
        apply_overrides(&mut events, "file_size", &profile, &Configuration::default());

        let mut r = result(events);
        assert_eq!(seal(&mut r), Status::Warn);
        assert_eq!(r.events.len(), 1);
        assert_eq!(r.events[0].overridden_from, Some(Status::Debug));
    }
}
