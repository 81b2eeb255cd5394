use std::fmt;

use crate::error::EfciError;
use crate::exec::{CommandRunner, CommandSpec, ExecutionOutcome, OutputMode};
use crate::inputs::RunConfig;
use crate::reporter::Reporter;

/// Identifier of a migration point to roll back to. Produced by
/// [`MigrationController::current_migration`] and consumed by
/// [`MigrationController::rollback_to`]; the literal `0` is EF Core's
/// "before the first migration" target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget(String);

impl MigrationTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MigrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Environment injected into every `dotnet` invocation. The process's own
/// HOME wins over the configured one when it is set.
pub fn runtime_env(config: &RunConfig) -> Vec<(String, String)> {
    vec![
        ("DOTNET_ROOT".to_string(), config.dotnet_root.clone()),
        (
            "HOME".to_string(),
            std::env::var("HOME").unwrap_or_else(|_| config.home.clone()),
        ),
        ("ASPNETCORE_ENVIRONMENT".to_string(), config.env_name.clone()),
    ]
}

/// Drives the external `dotnet-ef` tool: capture the current migration
/// state, update to latest, or update back to a recorded target.
pub struct MigrationController<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    reporter: &'a dyn Reporter,
}

impl<'a> MigrationController<'a> {
    pub fn new(
        config: &'a RunConfig,
        runner: &'a dyn CommandRunner,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            config,
            runner,
            reporter,
        }
    }

    /// Builds a `dotnet-ef` invocation in the migrations folder. In global
    /// mode the tool is on PATH as `dotnet-ef`; otherwise the configured
    /// dotnet executable runs it through `tool run`.
    fn ef_command(&self, operation: &[&str]) -> CommandSpec {
        let (program, mut args) = if self.config.use_global_dotnet_ef {
            ("dotnet-ef".to_string(), Vec::new())
        } else {
            (
                self.config.dotnet_root.clone(),
                vec![
                    "tool".to_string(),
                    "run".to_string(),
                    "dotnet-ef".to_string(),
                ],
            )
        };
        args.extend(operation.iter().map(|s| s.to_string()));

        let mut spec =
            CommandSpec::new(program, args).current_dir(self.config.migrations_folder.clone());
        for (name, value) in runtime_env(self.config) {
            spec = spec.env(name, value);
        }
        spec
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::from_flag(self.config.get_exec_output)
    }

    fn report_captured(&self, outcome: &ExecutionOutcome) {
        if let Some(stdout) = &outcome.stdout {
            self.reporter.info(stdout);
        }
    }

    /// Records the migration state to roll back to: the last applied
    /// migration, or `0` when nothing has been applied yet. Output is
    /// always buffered for this call since the value is the point.
    pub async fn current_migration(&self) -> Result<MigrationTarget, EfciError> {
        let spec = self.ef_command(&["migrations", "list"]);
        let outcome = self.runner.run(&spec, OutputMode::Captured).await?;
        if !outcome.success() {
            return Err(EfciError::migration_failed(format!(
                "could not list migrations in {}: {}",
                self.config.migrations_folder,
                failure_detail(&outcome),
            )));
        }

        let target = outcome
            .stdout
            .as_deref()
            .and_then(parse_last_applied)
            .unwrap_or_else(|| "0".to_string());
        Ok(MigrationTarget::new(target))
    }

    /// Updates the database to the latest migration. Non-zero exit is fatal
    /// to the run.
    pub async fn apply(&self) -> Result<(), EfciError> {
        self.reporter.info(&format!(
            "🗄️  Applying migrations in {}...",
            self.config.migrations_folder
        ));

        let spec = self.ef_command(&["database", "update"]);
        let outcome = self.runner.run(&spec, self.output_mode()).await?;
        if !outcome.success() {
            return Err(EfciError::migration_failed(format!(
                "`{}` {}",
                spec.display(),
                failure_detail(&outcome),
            )));
        }

        self.report_captured(&outcome);
        self.reporter.info("Migrations applied successfully.");
        Ok(())
    }

    /// Updates the database back to `target`. The caller decides whether a
    /// failure here is fatal; for post-test remediation it is not.
    pub async fn rollback_to(&self, target: &MigrationTarget) -> Result<(), EfciError> {
        self.reporter
            .info(&format!("Rolling back to migration: {}...", target));

        let spec = self.ef_command(&["database", "update", target.as_str()]);
        let outcome = self.runner.run(&spec, self.output_mode()).await?;
        if !outcome.success() {
            return Err(EfciError::process(format!(
                "rollback `{}` {}",
                spec.display(),
                failure_detail(&outcome),
            )));
        }

        self.report_captured(&outcome);
        self.reporter.info("Rollback completed successfully.");
        Ok(())
    }
}

fn failure_detail(outcome: &ExecutionOutcome) -> String {
    let exit = match outcome.exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    };
    match outcome.stderr.as_deref().map(str::trim) {
        Some(stderr) if !stderr.is_empty() => format!("{}: {}", exit, stderr),
        _ => exit,
    }
}

/// Picks the last applied migration out of `dotnet ef migrations list`
/// output. Migration ids never contain spaces, which filters out build
/// chatter; pending migrations are suffixed with `(Pending)`.
fn parse_last_applied(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains("(Pending)"))
        .filter(|line| !line.contains(' '))
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::ScriptedRunner;
    use crate::reporter::test_support::MemoryReporter;
    use serial_test::serial;

    fn config() -> RunConfig {
        RunConfig {
            test_folder: "./app/App.Tests".to_string(),
            migrations_folder: "./app/App.MVC".to_string(),
            env_name: "Test".to_string(),
            home: "/home/node".to_string(),
            skip_migrations: false,
            skip_tests: false,
            dotnet_root: "/usr/bin/dotnet".to_string(),
            use_global_dotnet_ef: false,
            get_exec_output: false,
            test_output_folder: "./app/App.Tests/TestResults".to_string(),
            test_format: "html".to_string(),
            rollback_migrations_on_test_failed: true,
        }
    }

    #[test]
    fn local_mode_runs_ef_through_the_configured_dotnet() {
        let config = config();
        let reporter = MemoryReporter::default();
        let runner = ScriptedRunner::default();
        let controller = MigrationController::new(&config, &runner, &reporter);

        let spec = controller.ef_command(&["database", "update"]);
        assert_eq!(spec.program, "/usr/bin/dotnet");
        assert_eq!(
            spec.args,
            vec!["tool", "run", "dotnet-ef", "database", "update"]
        );
        assert_eq!(spec.cwd.as_deref(), Some("./app/App.MVC"));
    }

    #[test]
    fn global_mode_calls_dotnet_ef_directly() {
        let mut config = config();
        config.use_global_dotnet_ef = true;
        let reporter = MemoryReporter::default();
        let runner = ScriptedRunner::default();
        let controller = MigrationController::new(&config, &runner, &reporter);

        let spec = controller.ef_command(&["database", "update", "M1"]);
        assert_eq!(spec.program, "dotnet-ef");
        assert_eq!(spec.args, vec!["database", "update", "M1"]);
    }

    #[test]
    #[serial]
    fn runtime_env_injects_the_dotnet_variables() {
        let env = runtime_env(&config());
        assert!(env.contains(&("DOTNET_ROOT".to_string(), "/usr/bin/dotnet".to_string())));
        assert!(env.contains(&("ASPNETCORE_ENVIRONMENT".to_string(), "Test".to_string())));
        assert!(env.iter().any(|(name, _)| name == "HOME"));
    }

    #[test]
    #[serial]
    fn runtime_env_prefers_the_process_home() {
        let saved = std::env::var("HOME").ok();
        std::env::set_var("HOME", "/home/runner");
        let env = runtime_env(&config());
        assert!(env.contains(&("HOME".to_string(), "/home/runner".to_string())));

        std::env::remove_var("HOME");
        let env = runtime_env(&config());
        assert!(env.contains(&("HOME".to_string(), "/home/node".to_string())));

        if let Some(home) = saved {
            std::env::set_var("HOME", home);
        }
    }

    #[test]
    fn parse_last_applied_skips_pending_and_build_chatter() {
        let stdout = "Build started...\n\
                      Build succeeded.\n\
                      20240101000000_InitialCreate\n\
                      20240201000000_AddOrders\n\
                      20240301000000_AddInvoices (Pending)\n";
        assert_eq!(
            parse_last_applied(stdout).as_deref(),
            Some("20240201000000_AddOrders")
        );
    }

    #[test]
    fn parse_last_applied_is_none_when_nothing_is_applied() {
        assert_eq!(parse_last_applied("Build succeeded.\n"), None);
        assert_eq!(parse_last_applied(""), None);
        assert_eq!(
            parse_last_applied("20240101000000_InitialCreate (Pending)\n"),
            None
        );
    }

    #[tokio::test]
    async fn current_migration_always_captures_output() {
        let config = config();
        let reporter = MemoryReporter::default();
        let runner = ScriptedRunner::default();
        runner.push_ok_with_stdout("20240101000000_InitialCreate\n");
        let controller = MigrationController::new(&config, &runner, &reporter);

        let target = controller.current_migration().await.unwrap();
        assert_eq!(target.as_str(), "20240101000000_InitialCreate");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, OutputMode::Captured);
        assert!(calls[0].0.args.ends_with(&[
            "migrations".to_string(),
            "list".to_string()
        ]));
    }

    #[tokio::test]
    async fn current_migration_falls_back_to_zero() {
        let config = config();
        let reporter = MemoryReporter::default();
        let runner = ScriptedRunner::default();
        runner.push_ok_with_stdout("Build succeeded.\n");
        let controller = MigrationController::new(&config, &runner, &reporter);

        let target = controller.current_migration().await.unwrap();
        assert_eq!(target.as_str(), "0");
    }

    #[tokio::test]
    async fn apply_failure_surfaces_the_exit_detail() {
        let config = config();
        let reporter = MemoryReporter::default();
        let runner = ScriptedRunner::default();
        runner.push_failed(1, "SqlException: column already exists");
        let controller = MigrationController::new(&config, &runner, &reporter);

        let err = controller.apply().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Migration apply failed"));
        assert!(message.contains("exited with code 1"));
        assert!(message.contains("column already exists"));
    }

    #[tokio::test]
    async fn rollback_passes_the_exact_target() {
        let config = config();
        let reporter = MemoryReporter::default();
        let runner = ScriptedRunner::default();
        runner.push_ok();
        let controller = MigrationController::new(&config, &runner, &reporter);

        controller
            .rollback_to(&MigrationTarget::new("20240201000000_AddOrders"))
            .await
            .unwrap();

        let calls = runner.calls();
        assert!(calls[0].0.args.ends_with(&[
            "database".to_string(),
            "update".to_string(),
            "20240201000000_AddOrders".to_string()
        ]));
        let lines = reporter.lines.lock().unwrap();
        assert!(lines
            .iter()
            .any(|l| l.contains("Rolling back to migration: 20240201000000_AddOrders")));
        assert!(lines.iter().any(|l| l.contains("Rollback completed successfully.")));
    }
}
