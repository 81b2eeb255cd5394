use crate::error::EfciError;
use crate::inputs::{EnvInputs, OverlayInputs, RunConfig};
use crate::reporter::SilentReporter;

/// `efci config`: print the configuration a run would use, after defaults
/// and overrides, as the audit block or as JSON.
pub async fn run(json: bool, set: Vec<String>) -> Result<(), EfciError> {
    let env = EnvInputs;
    let source = OverlayInputs::new(&set, &env);
    let config = RunConfig::resolve(&source, &SilentReporter);

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", config.summary());
    }
    Ok(())
}
