//! The check runner: expands a profile into identities, executes them in
//! isolation and reports their sealed results.

use crate::aggregate;
use crate::error::{panic_detail, Fault, RunnerError};
use crate::expander::{self, Planned};
use crate::resolver::Resolver;
use crate::scheduler::{Budget, StopHandle};
use bakery_core::{CheckResult, Event, RunId, Status, StatusCounter, Time, Value};
use bakery_profile::{Configuration, Profile, Report};
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Runs the checks of a profile against supplied values.
///
/// ```text
/// Expand → Resolve → Gate → Invoke → Seal → Override
/// ```
pub struct Runner {
    resolver: Arc<Resolver>,
    budget: Budget,
    stop: StopHandle,
    run_id: RunId,
}

impl Runner {
    /// Prepare a run.
    ///
    /// Validates the profile and the supplied values, then layers `config`
    /// over the profile's configuration defaults.
    pub fn new(
        profile: Profile,
        values: HashMap<String, Value>,
        config: Configuration,
    ) -> Result<Self, RunnerError> {
        profile.test_dependencies()?;
        profile.check_value_names(values.keys().map(String::as_str))?;
        for (name, value) in &values {
            if let Some(expected) = profile.expected_value(name) {
                expected
                    .validate(value)
                    .map_err(|reason| RunnerError::Validation {
                        name: name.clone(),
                        reason,
                    })?;
            }
        }

        let config = profile.merge_default_config(&config);
        for (_, check) in profile.checks() {
            for key in config.keys_for(check.id()) {
                if !check.used_config_keys.contains(&key) {
                    warn!(check = check.id(), key = %key, "Configuration key is not used by the check");
                }
            }
        }

        Ok(Self {
            resolver: Arc::new(Resolver::new(Arc::new(profile), values, config)),
            budget: Budget::default(),
            stop: StopHandle::new(),
            run_id: RunId::new(),
        })
    }

    /// Set the budget.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Handle that stops this run.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Id of this run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The profile being run.
    pub fn profile(&self) -> &Profile {
        self.resolver.profile()
    }

    /// The effective configuration.
    pub fn config(&self) -> &Configuration {
        self.resolver.config()
    }

    /// Number of condition bodies evaluated so far.
    pub fn condition_evaluations(&self) -> usize {
        self.resolver.cache().evaluations()
    }

    /// The identities this run executes, in reporting order.
    pub fn plan(&self) -> Result<Vec<Planned>, RunnerError> {
        expander::plan(&self.resolver)
    }

    /// Execute the run, yielding each sealed result in reporting order.
    ///
    /// Up to `max_concurrent` identities are in flight at once. After a
    /// stop is requested no further identity starts.
    pub fn run_stream(&self) -> Result<BoxStream<'static, CheckResult>, RunnerError> {
        let planned = self.plan()?;
        info!(
            run = %self.run_id,
            profile = self.profile().name(),
            identities = planned.len(),
            "Starting run"
        );

        let resolver = Arc::clone(&self.resolver);
        let budget = self.budget;
        let stop = self.stop.clone();
        let gate = self.stop.clone();
        let stream = futures::stream::iter(planned)
            .take_while(move |_| futures::future::ready(!gate.is_stopped()))
            .map(move |planned| execute(Arc::clone(&resolver), planned, budget, stop.clone()))
            .buffered(budget.max_concurrent.get());
        Ok(stream.boxed())
    }

    /// Execute the run and collect a report.
    pub async fn run(&self) -> Result<RunReport, RunnerError> {
        let mut report = RunReport::new(self.run_id, self.profile().name());
        let mut stream = self.run_stream()?;
        while let Some(result) = stream.next().await {
            report.record(result);
        }
        report.finished_at = Utc::now();

        info!(
            run = %self.run_id,
            results = report.results.len(),
            worst = ?report.worst_status(),
            "Run finished"
        );
        Ok(report)
    }
}

/// Run one identity on the worker pool, enforcing the budget and the stop
/// handle. Always yields a sealed result.
async fn execute(resolver: Arc<Resolver>, planned: Planned, budget: Budget, stop: StopHandle) -> CheckResult {
    let task = tokio::spawn(run_identity(Arc::clone(&resolver), planned.clone()));
    let abort = task.abort_handle();
    let joined = async move {
        match budget.time_per_identity {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| limit),
            None => Ok(task.await),
        }
    };

    let check = planned.check.id().to_string();
    tokio::select! {
        outcome = joined => match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                let fault = Fault::Panicked { check, detail: panic_message(err) };
                warn!(identity = %planned.identity, "{fault}");
                fault_result(planned, fault)
            }
            Err(limit) => {
                abort.abort();
                let fault = Fault::TimedOut { check, budget: limit };
                warn!(identity = %planned.identity, "{fault}");
                fault_result(planned, fault)
            }
        },
        _ = stop.stopped() => {
            abort.abort();
            debug!(identity = %planned.identity, "Identity cancelled");
            fault_result(planned, Fault::Cancelled)
        }
    }
}

async fn run_identity(resolver: Arc<Resolver>, planned: Planned) -> CheckResult {
    let Planned { identity, check } = planned;
    let bindings = identity.bindings.clone();
    let mut result = CheckResult::new(identity, Arc::clone(&check.meta));
    debug!(identity = %result.identity, "Running identity");

    if let Err(reason) = resolver.profile().check_skip_filter(check.id(), &bindings) {
        result.push(Event::coded(Status::Skip, "filtered", format!("Filtered: {reason}")));
        return finish(result);
    }

    match resolver.unfulfilled_conditions(&check, &bindings).await {
        Err(fault) => {
            warn!(identity = %result.identity, "{fault}");
            result.push(fault.to_event());
        }
        Ok(unfulfilled) if !unfulfilled.is_empty() => {
            let refs: Vec<&str> = unfulfilled.iter().map(|r| r.as_written()).collect();
            result.push(Event::coded(
                Status::Skip,
                "unfulfilled-conditions",
                format!("Unfulfilled Conditions: {}", refs.join(", ")),
            ));
        }
        Ok(_) => match resolver.check_args(&check, &bindings).await {
            Err(fault) => {
                warn!(identity = %result.identity, "{fault}");
                result.push(fault.to_event());
            }
            Ok(args) => {
                let mut report = Report::new();
                let outcome = check.body().run(&args, &mut report).await;
                let mut events = report.into_events();
                aggregate::apply_overrides(&mut events, check.id(), resolver.profile(), resolver.config());
                for event in events {
                    result.push(event);
                }
                if let Err(err) = outcome {
                    let fault = Fault::FailedCheck {
                        check: check.id().to_string(),
                        detail: format!("{err:#}"),
                    };
                    warn!(identity = %result.identity, "{fault}");
                    result.push(fault.to_event());
                }
            }
        },
    }

    finish(result)
}

fn fault_result(planned: Planned, fault: Fault) -> CheckResult {
    let mut result = CheckResult::new(planned.identity, Arc::clone(&planned.check.meta));
    result.push(fault.to_event());
    finish(result)
}

fn finish(mut result: CheckResult) -> CheckResult {
    aggregate::seal(&mut result);
    result
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => panic_detail(payload.as_ref()),
        Err(err) => err.to_string(),
    }
}

/// Results of a run with per-section and whole-run status tallies.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run id
    pub run_id: RunId,

    /// Profile name
    pub profile: String,

    /// When the run started
    pub started_at: Time,

    /// When the run finished
    pub finished_at: Time,

    /// Sealed results in reporting order
    pub results: Vec<CheckResult>,

    sections: Vec<(String, StatusCounter)>,
    totals: StatusCounter,
}

impl RunReport {
    /// Start an empty report.
    pub fn new(run_id: RunId, profile: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            profile: profile.into(),
            started_at: now,
            finished_at: now,
            results: Vec::new(),
            sections: Vec::new(),
            totals: StatusCounter::new(),
        }
    }

    /// Add a sealed result.
    pub fn record(&mut self, result: CheckResult) {
        let status = result.summary_status();
        let section = &result.identity.section;
        match self.sections.iter_mut().find(|(name, _)| name == section) {
            Some((_, counter)) => counter.add(status),
            None => {
                let mut counter = StatusCounter::new();
                counter.add(status);
                self.sections.push((section.clone(), counter));
            }
        }
        self.totals.add(status);
        self.results.push(result);
    }

    /// Tally of one section.
    pub fn section_summary(&self, section: &str) -> Option<&StatusCounter> {
        self.sections
            .iter()
            .find(|(name, _)| name == section)
            .map(|(_, counter)| counter)
    }

    /// Section tallies in reporting order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &StatusCounter)> + '_ {
        self.sections.iter().map(|(name, counter)| (name.as_str(), counter))
    }

    /// Tally of the whole run.
    pub fn totals(&self) -> &StatusCounter {
        &self.totals
    }

    /// The most severe summary status, if anything ran.
    pub fn worst_status(&self) -> Option<Status> {
        self.totals.worst()
    }

    /// Process exit code: 1 when the worst status reaches `threshold`.
    pub fn exit_code(&self, threshold: Status) -> i32 {
        match self.worst_status() {
            Some(worst) if worst >= threshold => 1,
            _ => 0,
        }
    }

    /// Serializable data for report renderers.
    pub fn get_data(&self) -> serde_json::Value {
        let counts = |counter: &StatusCounter| {
            counter
                .iter()
                .map(|(status, count)| (status.name().to_string(), serde_json::json!(count)))
                .collect::<serde_json::Map<_, _>>()
        };
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "profile": self.profile,
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.to_rfc3339(),
            "sections": self
                .sections
                .iter()
                .map(|(name, counter)| serde_json::json!({"name": name, "summary": counts(counter)}))
                .collect::<Vec<_>>(),
            "summary": counts(&self.totals),
            "results": self.results.iter().map(CheckResult::get_data).collect::<Vec<_>>(),
        })
    }
}
