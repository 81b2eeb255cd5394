use std::collections::HashMap;

use serde::Serialize;

use crate::reporter::Reporter;

/// A flat name -> value mapping of operator-supplied settings.
///
/// `None` means the input is absent and its documented default applies.
/// Implementations must treat an empty string as absent, matching the
/// behavior of CI input plumbing.
pub trait InputSource {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads inputs the way GitHub Actions delivers them: input `name` becomes
/// the environment variable `INPUT_<NAME>` with the name upper-cased.
pub struct EnvInputs;

impl InputSource for EnvInputs {
    fn get(&self, name: &str) -> Option<String> {
        let key = format!("INPUT_{}", name.to_uppercase());
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }
}

/// Layers explicit `--set name=value` pairs over another source.
/// Lookup is case-insensitive on the input name.
pub struct OverlayInputs<'a> {
    overrides: HashMap<String, String>,
    base: &'a dyn InputSource,
}

impl<'a> OverlayInputs<'a> {
    pub fn new(pairs: &[String], base: &'a dyn InputSource) -> Self {
        let overrides = pairs
            .iter()
            .filter_map(|pair| {
                pair.split_once('=')
                    .map(|(name, value)| (name.trim().to_lowercase(), value.to_string()))
            })
            .collect();
        Self { overrides, base }
    }
}

impl InputSource for OverlayInputs<'_> {
    fn get(&self, name: &str) -> Option<String> {
        match self.overrides.get(&name.to_lowercase()) {
            Some(value) if !value.is_empty() => Some(value.clone()),
            Some(_) => None,
            None => self.base.get(name),
        }
    }
}

/// Everything one invocation needs, resolved once up front and read-only
/// afterwards. No external command runs before this record exists.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub test_folder: String,
    pub migrations_folder: String,
    pub env_name: String,
    pub home: String,
    pub skip_migrations: bool,
    pub skip_tests: bool,
    pub dotnet_root: String,
    pub use_global_dotnet_ef: bool,
    pub get_exec_output: bool,
    pub test_output_folder: String,
    pub test_format: String,
    pub rollback_migrations_on_test_failed: bool,
}

impl RunConfig {
    /// Resolves a configuration from `source`, filling absent inputs with
    /// their documented defaults, and reports a summary of every resolved
    /// value for the job log.
    pub fn resolve(source: &dyn InputSource, reporter: &dyn Reporter) -> RunConfig {
        let get_exec_output = exact_true(source, "getExecOutput");
        let skip_migrations = exact_true(source, "skipMigrations");
        let use_global_dotnet_ef = exact_true(source, "useGlobalDotnetEf");
        let skip_tests = exact_true(source, "skipTests");

        let dotnet_root = source
            .get("dotnetRoot")
            .unwrap_or_else(|| "/usr/bin/dotnet".to_string());
        let env_name = source.get("envName").unwrap_or_else(|| "Test".to_string());
        let home = source.get("home").unwrap_or_else(|| "/home/node".to_string());
        let migrations_folder = source
            .get("migrationsFolder")
            .unwrap_or_else(|| "./sample-project/sample-project.MVC".to_string());
        let test_folder = source
            .get("testFolder")
            .unwrap_or_else(|| "./sample-project/sample-project.Tests".to_string());
        let test_format = source
            .get("testFormat")
            .unwrap_or_else(|| "html".to_string());
        let test_output_folder = source
            .get("testOutputFolder")
            .unwrap_or_else(|| format!("{}/TestResults", test_folder));

        // This flag defaults to true and, unlike every other boolean input,
        // is trimmed and compared case-insensitively. Longstanding behavior;
        // existing pipelines pass values like "True" and rely on it.
        let raw_rollback = source
            .get("rollbackMigrationsOnTestFailed")
            .unwrap_or_else(|| "true".to_string());
        let rollback_migrations_on_test_failed =
            raw_rollback.trim().to_lowercase() == "true";

        reporter.info(&format!(
            "rollbackMigrationsOnTestFailed raw value: \"{}\"",
            raw_rollback
        ));
        reporter.info(&format!(
            "rollbackMigrationsOnTestFailed boolean: {}",
            rollback_migrations_on_test_failed
        ));

        let config = RunConfig {
            test_folder,
            migrations_folder,
            env_name,
            home,
            skip_migrations,
            skip_tests,
            dotnet_root,
            use_global_dotnet_ef,
            get_exec_output,
            test_output_folder,
            test_format,
            rollback_migrations_on_test_failed,
        };
        reporter.info(&config.summary());
        config
    }

    /// The "Loaded inputs" audit block.
    pub fn summary(&self) -> String {
        format!(
            "Loaded inputs:\n\n\
             - getExecOutput: {}\n\
             - Dotnet Root: {}\n\
             - Environment: {}\n\
             - Home: {}\n\
             - Skip Migrations: {}\n\
             - Migration Folder: {}\n\
             - Use Global dotnet-ef: {}\n\n\
             - Skip Tests: {}\n\
             - Test Folder: {}\n\
             - Test Output Folder: {}\n\
             - Test Format: {}\n\
             - Rollback Migrations On Test Failed: {}",
            self.get_exec_output,
            self.dotnet_root,
            self.env_name,
            self.home,
            self.skip_migrations,
            self.migrations_folder,
            self.use_global_dotnet_ef,
            self.skip_tests,
            self.test_folder,
            self.test_output_folder,
            self.test_format,
            self.rollback_migrations_on_test_failed,
        )
    }
}

/// Exact-case boolean parse: only the literal `"true"` is true.
fn exact_true(source: &dyn InputSource, name: &str) -> bool {
    source.get(name).as_deref() == Some("true")
}
