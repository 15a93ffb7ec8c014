//! mkvet: checks Makefile fragments for quoting and permission mistakes.
//!
//! Reads a JSON request from stdin, writes the findings as JSON to stdout.
//!
//! ```text
//! {"filename": "Makefile",
//!  "fragments": [{"kind": "shell", "text": "echo ${PKGNAME:Q}"},
//!                {"kind": "cond", "text": "${OPSYS} == NetBSD"},
//!                {"kind": "for", "text": "f in ${DISTFILES}"},
//!                {"kind": "assign", "varname": "CFLAGS", "op": "+=", "value": "-O2"}]}
//! ```
//!
//! Flags:
//!   --dump-config    print the merged configuration as TOML and exit
//!   --gnu-configure  require `:M*:Q` for flag variables
//!   --verbose        log verdicts to stderr

use std::io::Read;

use serde::Deserialize;

use mkvet::catalog::TypeCatalog;
use mkvet::config::Config;
use mkvet::eval::{Checker, Fragment};

#[derive(Deserialize)]
struct Request {
    filename: String,
    #[serde(default)]
    fragments: Vec<Fragment>,
}

fn fragment_text(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Shell { text } | Fragment::Cond { text } | Fragment::For { text } => text.clone(),
        Fragment::Assign { varname, op, value } => format!("{varname}{op}{value}"),
    }
}

fn main() {
    let mut dump_config = false;
    let mut gnu_configure = false;
    let mut verbose = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dump-config" => dump_config = true,
            "--gnu-configure" => gnu_configure = true,
            "--verbose" => verbose = true,
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let mut config = Config::load();
    if gnu_configure {
        config.settings.gnu_configure = true;
    }
    mkvet::logging::init(&config.settings.log_level, verbose);

    if dump_config {
        match toml::to_string(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("failed to serialize config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let catalog = match TypeCatalog::from_config(&config) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        eprintln!("failed to read stdin");
        std::process::exit(1);
    }

    let request: Request = match serde_json::from_str(&input) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("JSON parse error: {e}");
            std::process::exit(1);
        }
    };

    let checker = Checker::new(&catalog, &config.settings, &request.filename);
    let mut findings = Vec::new();
    for (index, fragment) in request.fragments.iter().enumerate() {
        let result = checker.check(fragment);
        mkvet::logging::log_findings(&request.filename, &fragment_text(fragment), &result);
        for finding in result {
            findings.push(serde_json::json!({
                "fragment": index,
                "severity": finding.severity,
                "message": finding.message,
                "suggestion": finding.suggestion,
            }));
        }
    }

    let output = serde_json::json!({ "findings": findings });
    match serde_json::to_string(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("failed to serialize findings: {e}");
            std::process::exit(1);
        }
    }
}
