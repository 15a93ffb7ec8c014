use std::path::{Path, PathBuf};
use std::str::FromStr;

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

use crate::eval::Finding;

/// Log target for finding records; only the findings file receives them.
const FINDINGS_TARGET: &str = "findings";

fn findings_log_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(Path::new(&home).join(".local/share/mkvet/findings.log"))
}

/// Install a terminal logger on stderr at `level` and, if the file can be
/// opened, a logger appending findings to
/// `~/.local/share/mkvet/findings.log`.
///
/// Best-effort: nothing here may stop the checks from running.
pub fn init(level: &str, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::from_str(level).unwrap_or(LevelFilter::Warn)
    };

    let term_config = ConfigBuilder::new()
        .add_filter_ignore_str(FINDINGS_TARGET)
        .build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        term_config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let Some(path) = findings_log_path()
        && let Some(dir) = path.parent()
        && std::fs::create_dir_all(dir).is_ok()
        && let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path)
    {
        let file_config = ConfigBuilder::new()
            .add_filter_allow_str(FINDINGS_TARGET)
            .set_time_format_rfc3339()
            .build();
        loggers.push(WriteLogger::new(LevelFilter::Info, file_config, file));
    }

    let _ = CombinedLogger::init(loggers);
}

/// Record the findings for one fragment in the findings log.
pub fn log_findings(filename: &str, fragment: &str, findings: &[Finding]) {
    // One line per record; fragments may span several lines.
    let fragment: String = fragment.replace('\n', "\\n").chars().take(200).collect();
    for finding in findings {
        log::info!(
            target: FINDINGS_TARGET,
            "{filename}\t{}\t{fragment}\t{}",
            finding.severity.label(),
            finding.message,
        );
    }
}
