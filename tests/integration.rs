use mkvet::eval::{Finding, Fragment, Severity};

fn shell(filename: &str, text: &str) -> Vec<Finding> {
    mkvet::check(filename, &Fragment::Shell { text: text.into() })
}

fn cond(text: &str) -> Vec<Finding> {
    mkvet::check("Makefile", &Fragment::Cond { text: text.into() })
}

fn assign(filename: &str, varname: &str, op: &str, value: &str) -> Vec<Finding> {
    mkvet::check(
        filename,
        &Fragment::Assign {
            varname: varname.into(),
            op: op.into(),
            value: value.into(),
        },
    )
}

fn messages(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| format!("{}: {}", f.severity.label(), f.message))
        .collect::<Vec<_>>()
        .join("\n")
}

macro_rules! clean_test {
    ($name:ident, $cmd:expr) => {
        #[test]
        fn $name() {
            let findings = shell("Makefile", $cmd);
            assert!(findings.is_empty(), "command: {}\n{}", $cmd, messages(&findings));
        }
    };
}

macro_rules! finding_test {
    ($name:ident, $cmd:expr, $severity:ident, $message:expr) => {
        #[test]
        fn $name() {
            let findings = shell("Makefile", $cmd);
            assert!(
                findings
                    .iter()
                    .any(|f| f.severity == Severity::$severity && f.message.contains($message)),
                "command: {}\n{}",
                $cmd,
                messages(&findings),
            );
        }
    };
}

// ── Shell commands without findings ──

clean_test!(clean_plain_word_whole, "cd ${WRKSRC} && ls");
clean_test!(clean_tool_command, "${SED} -e 's,a,b,' ${WRKSRC}/Makefile");
clean_test!(clean_flags_whole_word, "${CC} ${CFLAGS} -o prog prog.c");
clean_test!(clean_tool_in_double_quotes, "echo \"${ECHO}\"");
clean_test!(clean_single_quoted_literal, "echo 'it'\\''s'");
clean_test!(clean_shell_variable, "for f in *.c; do echo $$f; done");
clean_test!(clean_comment, "true # ${CFLAGS}");
clean_test!(clean_configure_args_list, "./configure ${CONFIGURE_ARGS}");
clean_test!(clean_install_dirs, "${INSTALL_DATA} ${WRKSRC}/README ${DESTDIR}${PREFIX}/share/doc");
clean_test!(clean_backticks, "echo `${CAT} ${WRKSRC}/VERSION`");

// ── Quoting findings ──

finding_test!(
    note_q_not_necessary,
    "echo ${PKGNAME:Q}",
    Note,
    "The :Q operator isn't necessary for ${PKGNAME} here."
);
finding_test!(
    warn_q_on_tool,
    "${SED:Q} -e s,a,b, file",
    Warning,
    "The :Q operator should not be used for ${SED} here."
);
finding_test!(
    warn_flags_in_double_quotes,
    "echo \"CFLAGS=${CFLAGS}\" > flags",
    Warning,
    "Please use ${CFLAGS:Q} instead of ${CFLAGS}"
);
finding_test!(
    warn_flags_part_of_word,
    "env CFLAGS=${CFLAGS} make",
    Warning,
    "Please use ${CFLAGS:Q} instead of ${CFLAGS}."
);
finding_test!(
    warn_q_inside_quotes,
    "echo \"flags ${CFLAGS:Q}\"",
    Warning,
    "Please move ${CFLAGS:Q} outside of any quoting characters."
);
finding_test!(
    note_q_on_list_as_whole_word,
    "${CC} ${CFLAGS:Q} -o prog prog.c",
    Note,
    "The :Q operator isn't necessary for ${CFLAGS} here."
);
finding_test!(
    note_mstar_not_needed,
    "echo x${CONFIGURE_ENV:M*:Q}",
    Note,
    "The :M* modifier is not needed here."
);

// ── Syntax findings ──

finding_test!(
    note_round_parentheses,
    "cd $(WRKSRC)",
    Note,
    "Please use curly braces {} instead of round parentheses () for WRKSRC."
);
finding_test!(warn_ambiguous_dollar, "echo $foo", Warning, "$foo is ambiguous.");
finding_test!(warn_malformed, "echo ${WRKSRC:S,a,b}", Warning, "Malformed variable reference");
finding_test!(warn_unclosed_quotes, "echo 'oops", Warning, "Unclosed quotes");

#[test]
fn permission_alternatives_exclude_denied_file() {
    let findings = shell("buildlink3.mk", "echo ${PKGNAME}");
    assert_eq!(findings.len(), 1, "{}", messages(&findings));
    let msg = &findings[0].message;
    assert!(msg.starts_with("PKGNAME may not be used in this file; it would be ok in Makefile"));
    assert!(!msg.contains("buildlink3.mk"));
}

#[test]
fn gnu_configure_requires_mstar() {
    let mut config = mkvet::config::Config::default_config();
    config.settings.gnu_configure = true;
    let catalog = mkvet::catalog::TypeCatalog::from_config(&config).unwrap();
    let checker = mkvet::eval::Checker::new(&catalog, &config.settings, "Makefile");

    let findings = checker.check_shell_command("env CFLAGS=${CFLAGS} ./configure");
    let suggestion = findings[0].suggestion.as_ref().unwrap();
    assert_eq!(suggestion.from, "${CFLAGS}");
    assert_eq!(suggestion.to, "${CFLAGS:M*:Q}");

    assert!(checker.check_shell_command("env CFLAGS=${CFLAGS:M*:Q} ./configure").is_empty());
}

#[test]
fn conditions_at_load_time() {
    assert!(cond("${OPSYS} == NetBSD || defined(PKGREVISION)").is_empty());
    assert!(cond("!empty(PKG_OPTIONS:Mx11)").is_empty());

    let findings = cond("${CONFIGURE_ARGS:M--enable-*}");
    assert_eq!(
        messages(&findings),
        "WARN: CONFIGURE_ARGS should not be evaluated at load time."
    );
}

#[test]
fn condition_value_checks() {
    let findings = cond("${OPSYS} == Windows");
    assert_eq!(findings.len(), 1, "{}", messages(&findings));
    assert!(findings[0].message.contains("use one of"));

    let findings = cond("${OPSYS:MNet*} && ${OPSYS:M*BSD}");
    assert!(findings.is_empty(), "{}", messages(&findings));
}

#[test]
fn for_loop_items() {
    let findings = mkvet::check(
        "Makefile",
        &Fragment::For {
            text: "f in ${PKG_OPTIONS:Q}".into(),
        },
    );
    assert_eq!(
        messages(&findings),
        "WARN: The :Q operator should not be used for ${PKG_OPTIONS} here."
    );
}

#[test]
fn assignments() {
    assert!(assign("Makefile", "CONFIGURE_ARGS", "+=", "--with-cflags=${CFLAGS:Q}").is_empty());

    let findings = assign("Makefile", "SHAREMODE", "=", "0644");
    assert!(findings[0].message.starts_with("The variable SHAREMODE may not be set"));

    let findings = assign("Makefile", "PKGREVISION", "=", "two");
    assert!(
        findings
            .iter()
            .any(|f| f.message == "PKGREVISION: \"two\" is not a valid PkgRevision."),
        "{}",
        messages(&findings)
    );
}

#[test]
fn findings_serialize_to_json() {
    let findings = shell("Makefile", "echo ${PKGNAME:Q}");
    let json = serde_json::to_value(&findings).unwrap();
    assert_eq!(json[0]["severity"], "note");
    assert_eq!(json[0]["suggestion"]["action"], "remove-q");
    assert_eq!(json[0]["suggestion"]["to"], "${PKGNAME}");
}

#[test]
fn fragments_deserialize_from_json() {
    let fragment: Fragment =
        serde_json::from_str(r#"{"kind": "assign", "varname": "X", "op": "?=", "value": "y"}"#).unwrap();
    assert_eq!(
        fragment,
        Fragment::Assign {
            varname: "X".into(),
            op: "?=".into(),
            value: "y".into()
        }
    );
}
