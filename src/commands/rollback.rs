use crate::error::EfciError;
use crate::exec::ProcessRunner;
use crate::inputs::{EnvInputs, OverlayInputs, RunConfig};
use crate::migrations::{MigrationController, MigrationTarget};
use crate::reporter::ConsoleReporter;

/// `efci rollback --target <MIGRATION>`: update the database back to a
/// known migration without running the rest of the pipeline. Unlike the
/// post-test rollback inside `efci run`, a failure here fails the command.
pub async fn run(target: &str, set: Vec<String>) -> Result<(), EfciError> {
    if target.trim().is_empty() {
        return Err(EfciError::configuration(
            "rollback target must not be empty (use \"0\" to revert every migration)",
        ));
    }

    let reporter = ConsoleReporter;
    let env = EnvInputs;
    let source = OverlayInputs::new(&set, &env);
    let config = RunConfig::resolve(&source, &reporter);

    let controller = MigrationController::new(&config, &ProcessRunner, &reporter);
    controller.rollback_to(&MigrationTarget::new(target)).await
}
