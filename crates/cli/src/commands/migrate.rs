use anyhow::Context;
use serde::Serialize;
use tabletop_core::MigrationSettings;
use tabletop_migrations::{
    MigrationDirection, MigrationLoader, MigrationOutcome, MigrationRunner, RollbackResult,
    RunResult, StatusReport,
};

/// Apply pending migrations; returns whether every migration succeeded
pub async fn up(runner: &MigrationRunner, target: Option<&str>, json: bool) -> anyhow::Result<bool> {
    let result = runner.up(target).await?;
    if json {
        print_json(&result)?;
    } else {
        println!("{}", render_run(&result));
    }
    Ok(result.success)
}

/// Roll back the last `steps` migrations
pub async fn down(runner: &MigrationRunner, steps: usize, json: bool) -> anyhow::Result<bool> {
    let result = runner.down(steps).await?;
    report_rollback(&result, json)?;
    Ok(result.success)
}

/// Roll back every applied migration
pub async fn reset(runner: &MigrationRunner, json: bool) -> anyhow::Result<bool> {
    let result = runner.reset().await?;
    report_rollback(&result, json)?;
    Ok(result.success)
}

pub async fn status(runner: &MigrationRunner, json: bool) -> anyhow::Result<bool> {
    let report = runner.status().await?;
    if json {
        print_json(&report)?;
    } else {
        println!("{}", render_status(&report));
    }
    Ok(true)
}

/// Create a new migration file; needs no database
pub fn create(settings: &MigrationSettings, name: &str) -> anyhow::Result<bool> {
    let loader = MigrationLoader::new(settings)?;
    let filename = loader.create_migration(name)?;
    println!(
        "Created migration: {}",
        loader.directory().join(filename).display()
    );
    Ok(true)
}

fn report_rollback(result: &RollbackResult, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(result)
    } else {
        println!("{}", render_rollback(result));
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", output);
    Ok(())
}

fn render_outcome(outcome: &MigrationOutcome, direction: MigrationDirection) -> String {
    let verb = match direction {
        MigrationDirection::Up => "Applied",
        MigrationDirection::Down => "Rolled back",
    };
    match &outcome.error {
        None => format!("  ✅ {} {} ({}ms)", verb, outcome.filename, outcome.execution_time_ms),
        Some(error) => format!(
            "  ❌ Failed {} ({}ms): {}",
            outcome.filename, outcome.execution_time_ms, error
        ),
    }
}

fn render_run(result: &RunResult) -> String {
    if result.results.is_empty() {
        return "Nothing to migrate".to_string();
    }

    let mut lines: Vec<String> = result
        .results
        .iter()
        .map(|o| render_outcome(o, MigrationDirection::Up))
        .collect();
    lines.push(format!(
        "\n{} migration(s) applied, {} failed",
        result.migrations_run,
        result.failed_count()
    ));
    lines.join("\n")
}

fn render_rollback(result: &RollbackResult) -> String {
    if result.results.is_empty() {
        return "Nothing to roll back".to_string();
    }

    let mut lines: Vec<String> = result
        .results
        .iter()
        .map(|o| render_outcome(o, MigrationDirection::Down))
        .collect();
    lines.push(format!(
        "\n{} migration(s) rolled back, {} failed",
        result.migrations_rolled_back,
        result.failed_count()
    ));
    lines.join("\n")
}

fn render_status(report: &StatusReport) -> String {
    let mut lines = vec![
        "Migration Status:".to_string(),
        "================".to_string(),
    ];

    if report.migrations.is_empty() {
        lines.push("No migrations found".to_string());
    }
    for entry in &report.migrations {
        match entry.executed_at {
            Some(at) if entry.executed => lines.push(format!(
                "  ✅ {}  (applied {})",
                entry.filename,
                at.format("%Y-%m-%d %H:%M:%S")
            )),
            _ => lines.push(format!("  ⏳ {}", entry.filename)),
        }
    }

    lines.push(format!(
        "\nTotal: {}, executed: {}, pending: {}",
        report.total, report.executed, report.pending
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tabletop_migrations::StatusEntry;
    use tempfile::TempDir;

    #[test]
    fn test_render_run_summary() {
        let result = RunResult::from_outcomes(vec![
            MigrationOutcome::succeeded("001_create_menus.sql", 4),
            MigrationOutcome::failed("002_create_orders.sql", 2, "no such table: tables"),
        ]);

        let output = render_run(&result);
        assert!(output.contains("✅ Applied 001_create_menus.sql (4ms)"));
        assert!(output.contains("❌ Failed 002_create_orders.sql (2ms): no such table: tables"));
        assert!(output.ends_with("1 migration(s) applied, 1 failed"));

        assert_eq!(render_run(&RunResult::empty()), "Nothing to migrate");
    }

    #[test]
    fn test_render_rollback_summary() {
        let result = RollbackResult::from_outcomes(vec![MigrationOutcome::succeeded(
            "003_add_tips.sql",
            1,
        )]);
        let output = render_rollback(&result);
        assert!(output.contains("Rolled back 003_add_tips.sql"));
        assert!(output.ends_with("1 migration(s) rolled back, 0 failed"));
    }

    #[test]
    fn test_render_status() {
        let report = StatusReport {
            total: 2,
            executed: 1,
            pending: 1,
            migrations: vec![
                StatusEntry {
                    filename: "001_create_menus.sql".to_string(),
                    executed: true,
                    executed_at: Some(Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()),
                    execution_time_ms: Some(3),
                    checksum: Some("ab".repeat(32)),
                },
                StatusEntry {
                    filename: "002_create_orders.sql".to_string(),
                    executed: false,
                    executed_at: None,
                    execution_time_ms: None,
                    checksum: None,
                },
            ],
        };

        let output = render_status(&report);
        assert!(output.contains("✅ 001_create_menus.sql  (applied 2026-05-04 09:30:00)"));
        assert!(output.contains("⏳ 002_create_orders.sql"));
        assert!(output.ends_with("Total: 2, executed: 1, pending: 1"));
    }

    #[test]
    fn test_create_writes_into_configured_directory() {
        let temp_dir = TempDir::new().unwrap();
        let settings = MigrationSettings::with_directory(temp_dir.path().join("migrations"));

        assert!(create(&settings, "Create dining tables").unwrap());
        assert!(temp_dir
            .path()
            .join("migrations/001_create_dining_tables.sql")
            .exists());
    }
}
