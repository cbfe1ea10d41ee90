//! Formatted output for CLI commands.
//!
//! Text output is an aligned table, one resource per line, followed by a
//! summary. JSON output is the serialized report.

use std::fmt::Write as _;

use clap::ValueEnum;
use dockhand_engine::plan::Action;
use dockhand_engine::{Outcome, RunReport};
use dockhand_manifest::model::Catalog;

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable table.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Prints a run report.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn report(report: &RunReport, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Text => emit(&render_report(report)),
        Format::Json => emit(&format!("{}\n", report.to_json()?)),
    }
    Ok(())
}

/// Prints the convergence order of a validated catalog.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn order(catalog: &Catalog, order: &[usize], format: Format) -> anyhow::Result<()> {
    match format {
        Format::Text => emit(&render_order(catalog, order)),
        Format::Json => {
            let keys: Vec<String> = order
                .iter()
                .map(|&i| catalog.resources[i].key.to_string())
                .collect();
            let doc = serde_json::json!({ "valid": true, "order": keys });
            emit(&format!("{}\n", serde_json::to_string_pretty(&doc)?));
        }
    }
    Ok(())
}

/// Prints a top-level error with its cause chain.
#[allow(clippy::print_stderr)]
pub fn error(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
}

#[allow(clippy::print_stdout)]
fn emit(text: &str) {
    print!("{text}");
}

/// Renders a report as an aligned table plus a summary line.
#[must_use]
pub fn render_report(report: &RunReport) -> String {
    let width = report
        .resources
        .iter()
        .map(|r| r.resource.to_string().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for r in &report.resources {
        let (status, detail) = match &r.outcome {
            Outcome::Unchanged => ("ok", String::new()),
            Outcome::Changed { actions } => {
                let status = if report.dry_run { "planned" } else { "changed" };
                (status, join(actions))
            }
            Outcome::Failed { failure, applied } if applied.is_empty() => {
                ("failed", failure.to_string())
            }
            Outcome::Failed { failure, applied } => {
                ("failed", format!("{failure} (after {})", join(applied)))
            }
        };
        let line = format!("{:<width$}  {status:<7}  {detail}", r.resource.to_string());
        let _ = writeln!(out, "{}", line.trim_end());
    }

    let total = report.resources.len();
    if report.dry_run {
        let _ = writeln!(
            out,
            "{} action(s) planned for {} of {total} resource(s), {} failed",
            report.actions().len(),
            report.changed(),
            report.failed()
        );
    } else {
        let _ = writeln!(
            out,
            "{total} resource(s): {} changed, {} failed",
            report.changed(),
            report.failed()
        );
    }
    out
}

/// Renders the convergence order as a numbered list.
#[must_use]
pub fn render_order(catalog: &Catalog, order: &[usize]) -> String {
    let mut out = String::new();
    for (step, &i) in order.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {}", step + 1, catalog.resources[i].key);
    }
    let _ = writeln!(out, "manifest is valid: {} resource(s)", order.len());
    out
}

fn join(actions: &[Action]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use dockhand_common::types::{ContainerName, ResourceKey, ResourceKind};
    use dockhand_engine::{Failure, ResourceReport};
    use dockhand_manifest::graph::DependencyGraph;
    use dockhand_manifest::parser::{parse_manifest, validator::compile};
    use uuid::Uuid;

    use super::*;

    fn name(n: &str) -> ContainerName {
        ContainerName::new(n).unwrap()
    }

    fn sample(dry_run: bool) -> RunReport {
        let entry = |kind, id: &str, outcome| ResourceReport {
            resource: ResourceKey::new(kind, id),
            outcome,
            duration_ms: 3,
        };
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dry_run,
            resources: vec![
                entry(
                    ResourceKind::Image,
                    "alpine",
                    Outcome::Changed {
                        actions: vec![Action::PullImage {
                            reference: "alpine".into(),
                        }],
                    },
                ),
                entry(
                    ResourceKind::Run,
                    "c1",
                    Outcome::Failed {
                        failure: Failure::Error {
                            message: "boom".into(),
                        },
                        applied: vec![Action::CreateContainer { name: name("c1") }],
                    },
                ),
                entry(ResourceKind::Exec, "seed", Outcome::Unchanged),
            ],
        }
    }

    #[test]
    fn text_report_lists_each_resource() {
        let text = render_report(&sample(false));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Image[alpine]  changed  pull alpine");
        assert_eq!(lines[1], "Run[c1]        failed   boom (after create c1)");
        assert_eq!(lines[2], "Exec[seed]     ok");
        assert_eq!(lines[3], "3 resource(s): 1 changed, 1 failed");
    }

    #[test]
    fn dry_run_report_says_planned() {
        let text = render_report(&sample(true));
        assert!(text.contains("Image[alpine]  planned  pull alpine"));
        assert!(text.ends_with("2 action(s) planned for 1 of 3 resource(s), 1 failed\n"));
    }

    #[test]
    fn order_is_numbered() {
        let catalog = compile(
            &parse_manifest(
                "resources:\n  - kind: run\n    id: c1\n    image: alpine\n  - kind: image\n    id: alpine\n",
            )
            .unwrap(),
        )
        .unwrap();
        let order = DependencyGraph::from_catalog(&catalog).resolve_order().unwrap();
        let text = render_order(&catalog, &order);
        assert_eq!(
            text,
            "  1. Image[alpine]\n  2. Run[c1]\nmanifest is valid: 2 resource(s)\n"
        );
    }

    #[test]
    fn empty_report_still_summarizes() {
        let report = RunReport {
            resources: Vec::new(),
            ..sample(false)
        };
        assert_eq!(render_report(&report), "0 resource(s): 0 changed, 0 failed\n");
    }
}
