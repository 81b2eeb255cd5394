use console::style;

/// Sink for human-readable progress and diagnostics.
///
/// Everything user-visible goes through this trait so command logic can be
/// exercised in tests without spamming the console. Reporting is infallible:
/// nothing a sink does may abort a run.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default reporter: stdout for info, styled stderr for errors.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", style("error:").red().bold(), message);
    }
}

/// Discards everything. Used when a command wants resolved values without
/// the resolution chatter, e.g. machine-readable output.
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn info(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}
