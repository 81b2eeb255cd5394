use crate::error::EfciError;
use crate::exec::{CommandRunner, CommandSpec, OutputMode, ProcessRunner};
use crate::inputs::{EnvInputs, OverlayInputs, RunConfig};
use crate::migrations::{runtime_env, MigrationController, MigrationTarget};
use crate::reporter::{ConsoleReporter, Reporter};

/// Entry point for `efci run`: resolve configuration, then migrate, test,
/// and roll back as the outcome dictates.
pub async fn run(set: Vec<String>) -> Result<(), EfciError> {
    let reporter = ConsoleReporter;
    let env = EnvInputs;
    let source = OverlayInputs::new(&set, &env);
    let config = RunConfig::resolve(&source, &reporter);
    Orchestrator::new(&config, &ProcessRunner, &reporter)
        .execute()
        .await
}

/// The one run-to-completion state machine:
/// migrations phase, test phase, then a conditional rollback phase.
/// The rollback target is captured once before migrations are applied and
/// threaded through explicitly; nothing recomputes it later.
pub struct Orchestrator<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    reporter: &'a dyn Reporter,
}

impl<'a> Orchestrator<'a> {
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

    pub async fn execute(&self) -> Result<(), EfciError> {
        let rollback_target = self.migrations_phase().await?;

        if self.config.skip_tests {
            self.reporter.info("⏭️  Tests skipped.");
            self.reporter.info("✅ Run finished successfully.");
            return Ok(());
        }

        if self.test_phase().await {
            self.reporter.info("✅ Tests passed.");
            return Ok(());
        }

        self.reporter.error("Tests failed.");
        self.rollback_phase(rollback_target).await;
        Err(EfciError::TestsFailed)
    }

    fn controller(&self) -> MigrationController<'_> {
        MigrationController::new(self.config, self.runner, self.reporter)
    }

    /// Captures the rollback target, then applies. The capture must happen
    /// before the update runs; a target recorded afterwards would make the
    /// rollback a no-op.
    async fn migrations_phase(&self) -> Result<Option<MigrationTarget>, EfciError> {
        if self.config.skip_migrations {
            self.reporter.info("⏭️  Migrations skipped.");
            return Ok(None);
        }

        let controller = self.controller();
        let target = controller.current_migration().await?;
        self.reporter
            .info(&format!("Captured rollback target: {}", target));
        controller.apply().await?;
        Ok(Some(target))
    }

    /// Runs the test suite; any way the suite fails to produce a zero exit,
    /// including a runner that cannot be spawned, counts as a test failure.
    async fn test_phase(&self) -> bool {
        self.reporter.info(&format!(
            "🧪 Running tests in {}...",
            self.config.test_folder
        ));

        let spec = test_command(self.config);
        let mode = OutputMode::from_flag(self.config.get_exec_output);
        match self.runner.run(&spec, mode).await {
            Ok(outcome) => {
                if let Some(stdout) = &outcome.stdout {
                    self.reporter.info(stdout);
                }
                outcome.success()
            }
            Err(e) => {
                self.reporter
                    .error(&format!("Could not run the test suite: {}", e));
                false
            }
        }
    }

    /// Best-effort remediation after failed tests. With migrations skipped
    /// there is no captured target and nothing to undo. A failure here is
    /// reported but never changes the run's already-failed outcome.
    async fn rollback_phase(&self, target: Option<MigrationTarget>) {
        if !self.config.rollback_migrations_on_test_failed {
            return;
        }
        let Some(target) = target else {
            return;
        };
        if let Err(e) = self.controller().rollback_to(&target).await {
            self.reporter.error(&format!("Rollback failed: {}", e));
        }
    }
}

/// `dotnet test` against the configured folder, writing artifacts in the
/// configured format, with the same environment as the migration tool.
fn test_command(config: &RunConfig) -> CommandSpec {
    let mut spec = CommandSpec::new(
        "dotnet",
        vec![
            "test".to_string(),
            config.test_folder.clone(),
            "--logger".to_string(),
            config.test_format.clone(),
            "--results-directory".to_string(),
            config.test_output_folder.clone(),
        ],
    );
    for (name, value) in runtime_env(config) {
        spec = spec.env(name, value);
    }
    spec
}
