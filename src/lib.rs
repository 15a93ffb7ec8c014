//! mkvet: quoting and permission checks for Makefile fragments.
//!
//! This crate looks at variable references like `${CFLAGS:M*:Q}` in
//! Makefile lines and in the shell commands embedded in them, and decides
//! whether the `:Q` modifier is [required](eval::QuotingVerdict::Required),
//! [forbidden](eval::QuotingVerdict::Forbidden) or irrelevant there, and
//! whether the file may use or assign the variable at all. Variable types
//! and permissions come from a [`TypeCatalog`](catalog::TypeCatalog) built
//! from configuration.
//!
//! # Architecture
//!
//! - **[`parse`]**: expression lexer, modifiers, quoting-aware shell lexer, condition parser.
//! - **[`catalog`]**: variable types, permission tables, tools, naming heuristics.
//! - **[`eval`]**: quoting decision table, permission checks, per-fragment checker.
//! - **[`config`]**: embedded defaults plus user overlay merge.
//! - **[`logging`]**: terminal logging and the findings log at `~/.local/share/mkvet/findings.log`.

/// Type catalog: variable types, permission tables and tools.
pub mod catalog;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Fatal configuration errors.
pub mod error;
/// Quoting verdicts, permission checks and the fragment checker.
pub mod eval;
/// Terminal and findings-file logging.
pub mod logging;
/// Lexers for make expressions and shell commands, and the condition parser.
pub mod parse;

use eval::{Checker, Finding, Fragment};

/// Build the catalog from the default config and check one fragment.
///
/// This is the main entry point for tests and simple usage.
/// For user config, build the catalog and a [`Checker`] directly.
pub fn check(filename: &str, fragment: &Fragment) -> Vec<Finding> {
    let config = config::Config::default_config();
    let catalog = catalog::TypeCatalog::from_config(&config)
        .expect("embedded default config must build a valid catalog");
    Checker::new(&catalog, &config.settings, filename).check(fragment)
}
