//! Plain text rendering of reports and profiles.

use bakery_core::{CheckResult, Status, StatusCounter};
use bakery_execution::RunReport;
use bakery_profile::Profile;

fn format_counts(counter: &StatusCounter) -> String {
    counter
        .iter()
        .map(|(status, count)| format!("{status}: {count}"))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Text lines for one result. PASS-only results are a single line.
pub fn format_result(result: &CheckResult) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}] {}: {}",
        result.summary_status(),
        result.identity,
        result.meta.description
    )];
    if result.summary_status() > Status::Pass {
        for event in &result.events {
            let mut line = format!("    {}: {}", event.status, event.message);
            if let Some(original) = event.overridden_from {
                line.push_str(&format!(" (was {original})"));
            }
            lines.push(line);
        }
    }
    lines
}

/// Print a run report.
pub fn print_report(report: &RunReport) {
    println!("Profile {} (run {})", report.profile, report.run_id);
    for result in &report.results {
        for line in format_result(result) {
            println!("{line}");
        }
    }

    println!();
    for (section, counter) in report.sections() {
        println!("{section}: {}", format_counts(counter));
    }
    println!("Total: {}", format_counts(report.totals()));
}

/// Print the sections and checks of a profile.
pub fn print_profile(profile: &Profile) {
    println!("Profile: {}", profile.name());
    if let Some(description) = profile.description() {
        println!("  {description}");
    }
    for section in profile.sections() {
        println!("  Section {}", section.name);
        for check in section.checks() {
            println!("    {} - {}", check.id(), check.meta.description);
        }
    }
}
