//! Per-fragment checks that combine the lexers, the condition parser and
//! the decision engine into [`Finding`]s.

use serde::Deserialize;

use super::context::{for_loop_type, shell_command_type};
use super::{
    AssignOp, Extent, Finding, Phase, SuggestedAction, UseContext, check_use,
    classify, is_assign_allowed, is_use_allowed,
};
use crate::catalog::{BasicKind, Origin, PermissionSet, TypeCatalog, VariableType};
use crate::config::Settings;
use crate::parse::{self, CmpOp, CondVisitor, Delimiter, QuotingState, ShellLexer, VarRef};

/// One piece of a Makefile, as sent to the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fragment {
    /// A shell command of a target, without the leading tab.
    Shell { text: String },
    /// The condition of an `.if` or `.elif`.
    Cond { text: String },
    /// The arguments of a `.for` directive: `var... in values`.
    For { text: String },
    Assign {
        varname: String,
        op: String,
        value: String,
    },
}

/// Checks fragments of one file against a catalog.
pub struct Checker<'a> {
    catalog: &'a TypeCatalog,
    settings: &'a Settings,
    filename: &'a str,
}

impl<'a> Checker<'a> {
    pub fn new(catalog: &'a TypeCatalog, settings: &'a Settings, filename: &'a str) -> Self {
        Self {
            catalog,
            settings,
            filename,
        }
    }

    pub fn check(&self, fragment: &Fragment) -> Vec<Finding> {
        match fragment {
            Fragment::Shell { text } => self.check_shell_command(text),
            Fragment::Cond { text } => self.check_condition(text),
            Fragment::For { text } => self.check_for_loop(text),
            Fragment::Assign { varname, op, value } => self.check_assignment(varname, op, value),
        }
    }

    pub fn check_shell_command(&self, text: &str) -> Vec<Finding> {
        let mut out = Vec::new();
        self.check_references(text, &mut out);

        let shell = shell_command_type();
        self.check_shell_words(text, &shell, Phase::RunTime, &mut out);
        out
    }

    pub fn check_condition(&self, text: &str) -> Vec<Finding> {
        let mut out = Vec::new();
        self.check_references(text, &mut out);

        match parse::parse_condition(text) {
            Ok(cond) => {
                let mut visitor = CondChecker {
                    checker: self,
                    out: &mut out,
                };
                cond.walk(&mut visitor);
            }
            Err(e) => out.push(Finding::warning(format!("Invalid conditional {text:?}: {e}."))),
        }
        out
    }

    /// Check the arguments of a `.for` directive.
    pub fn check_for_loop(&self, text: &str) -> Vec<Finding> {
        let mut out = Vec::new();
        let Some((vars, values)) = split_for_args(text) else {
            out.push(Finding::error(format!("Invalid .for loop {text:?}.")));
            return out;
        };

        for var in vars {
            let lowercase = var.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
                && var
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if lowercase {
                continue;
            }
            if var.contains(|c: char| c.is_ascii_uppercase()) {
                out.push(Finding::warning(
                    ".for variable names should not contain uppercase letters.",
                ));
            } else {
                out.push(Finding::error(format!("Invalid variable name {var:?}.")));
            }
        }

        self.check_references(values, &mut out);

        let refs: Vec<VarRef> = parse::tokenize(values)
            .filter_map(|e| e.as_reference().cloned())
            .collect();

        // Without any declared type among the values, the loop's own
        // type is only a guess.
        let mut loop_type = for_loop_type();
        if !refs.iter().any(|r| {
            self.catalog
                .lookup(&r.name)
                .is_some_and(|t| !t.is_guessed())
        }) {
            loop_type.origin = Origin::Guessed;
        }

        let ctx = UseContext::new(
            Some(&loop_type),
            Phase::LoadTime,
            QuotingState::Plain,
            Extent::ForLoopItem,
        );
        for r in &refs {
            self.check_varuse(r, &ctx, &mut out);
        }
        out
    }

    pub fn check_assignment(&self, varname: &str, op: &str, value: &str) -> Vec<Finding> {
        let mut out = Vec::new();
        let Some(op) = AssignOp::parse(op) else {
            out.push(Finding::error(format!("Unknown assignment operator {op:?}.")));
            return out;
        };
        self.check_references(value, &mut out);

        let vartype = self.catalog.lookup(varname);
        if let Some(vartype) = vartype.as_deref() {
            if self.settings.warn_permissions && !vartype.is_guessed() {
                self.check_assign_permissions(varname, vartype, op, &mut out);
            }
            if op == AssignOp::Append && !vartype.is_list() {
                out.push(Finding::warning(
                    "The \"+=\" operator should only be used with lists.",
                ));
            }
            if op != AssignOp::Shell {
                for problem in vartype.check_value(value) {
                    out.push(Finding::warning(format!("{varname}: {problem}.")));
                }
            }
        }

        let shell;
        let context = if op == AssignOp::Shell {
            shell = shell_command_type();
            Some(&shell)
        } else {
            vartype.as_deref()
        };
        match context {
            Some(context) => self.check_shell_words(value, context, op.phase(), &mut out),
            None => {
                for r in parse::tokenize(value).filter_map(|e| e.as_reference().cloned()) {
                    let ctx = UseContext::new(None, op.phase(), QuotingState::Plain, Extent::WholeWord);
                    self.check_varuse(&r, &ctx, &mut out);
                }
            }
        }
        out
    }

    /// Check each reference in shell words of `text`, deriving the
    /// quoting and extent from the shell lexer.
    fn check_shell_words(
        &self,
        text: &str,
        context: &VariableType,
        phase: Phase,
        out: &mut Vec<Finding>,
    ) {
        let mut lexer = ShellLexer::new(text);
        while let Some(token) = lexer.next_token() {
            for (i, atom) in token.atoms.iter().enumerate() {
                if atom.malformed {
                    out.push(Finding::warning(format!(
                        "The quote {} is nested too deeply (quoting state {}).",
                        atom.text, atom.quoting
                    )));
                }
                let Some(r) = &atom.expr else {
                    continue;
                };
                let extent = if token.is_whole_word(i) {
                    Extent::WholeWord
                } else {
                    Extent::PartOfWord
                };
                let ctx = UseContext::new(Some(context), phase, atom.quoting, extent);
                self.check_varuse(r, &ctx, out);
            }
        }
        if lexer.state() != QuotingState::Plain {
            out.push(Finding::warning(format!(
                "Unclosed quotes at the end of {text:?} (quoting state {}).",
                lexer.state()
            )));
        }
    }

    /// Syntax problems of references, including nested ones.
    fn check_references(&self, text: &str, out: &mut Vec<Finding>) {
        for r in parse::references(text) {
            if r.malformed {
                out.push(Finding::warning(format!("Malformed variable reference {:?}.", r.text)));
            } else if r.delim == Delimiter::Paren {
                out.push(
                    Finding::note(format!(
                        "Please use curly braces {{}} instead of round parentheses () for {}.",
                        r.name
                    ))
                    .with_suggestion(
                        SuggestedAction::UseCurlyBraces,
                        r.text.clone(),
                        r.with_curly_braces(),
                    ),
                );
            } else if r.ambiguous {
                out.push(Finding::warning(format!(
                    "${0} is ambiguous. Use ${{{0}}} if you mean a Makefile variable or $${0} if you mean a shell variable.",
                    r.name
                )));
            }
        }
    }

    fn check_varuse(&self, r: &VarRef, ctx: &UseContext<'_>, out: &mut Vec<Finding>) {
        if r.malformed || r.name.is_empty() {
            return;
        }
        let vartype = self.catalog.lookup(&r.name);
        let vartype = vartype.as_deref();

        if self.settings.warn_extra && vartype.is_none() && r.delim != Delimiter::None {
            out.push(Finding::note(format!("No type is known for {}.", r.name)));
        }

        if self.settings.warn_permissions
            && let Some(vartype) = vartype
        {
            self.check_use_permissions(&r.name, vartype, ctx, out);
        }

        let verdict = classify(vartype, ctx);
        log::debug!("{} in {ctx}: {}", r.text, verdict.as_str());
        if self.settings.warn_quoting {
            out.extend(check_use(
                &r.name,
                &r.modifiers,
                verdict,
                ctx.quoting,
                self.settings.gnu_configure,
            ));
        }
    }

    fn check_use_permissions(
        &self,
        varname: &str,
        vartype: &VariableType,
        ctx: &UseContext<'_>,
        out: &mut Vec<Finding>,
    ) {
        if vartype.is_guessed() || ctx.context_type.is_some_and(VariableType::is_guessed) {
            return;
        }

        let runtime = is_use_allowed(vartype, self.filename, Phase::RunTime);
        if !runtime.allowed {
            let message = match runtime.alternatives.as_slice() {
                [] => format!("{varname} may not be used in this file."),
                files => format!(
                    "{varname} may not be used in this file; it would be ok in {}.",
                    files.join(" or ")
                ),
            };
            out.push(Finding::warning(message));
            return;
        }

        let perms = self.catalog.effective_permissions(vartype, self.filename);
        if perms.contains(PermissionSet::USE_AT_LOAD_TIME) {
            return;
        }
        if ctx.phase == Phase::LoadTime {
            if !is_use_allowed(vartype, self.filename, Phase::LoadTime).allowed {
                out.push(Finding::warning(format!(
                    "{varname} should not be evaluated at load time."
                )));
            }
        } else if ctx
            .context_type
            .is_some_and(|t| t.acl.union().contains(PermissionSet::USE_AT_LOAD_TIME))
        {
            out.push(Finding::warning(format!(
                "{varname} should not be evaluated indirectly at load time."
            )));
        }
    }

    fn check_assign_permissions(
        &self,
        varname: &str,
        vartype: &VariableType,
        op: AssignOp,
        out: &mut Vec<Finding>,
    ) {
        let p = is_assign_allowed(vartype, self.filename, op);
        if p.allowed {
            return;
        }
        let needed = p.needed.describe();
        let actions = p.alternative_actions.describe();
        let files = p.alternative_files.join(" or ");
        let message = match (p.alternative_actions.is_empty(), files.is_empty()) {
            (false, false) => format!(
                "The variable {varname} may not be {needed} (only {actions}) in this file; it would be ok in {files}."
            ),
            (true, false) => format!(
                "The variable {varname} may not be {needed} in this file; it would be ok in {files}."
            ),
            (false, true) => {
                format!("The variable {varname} may not be {needed} (only {actions}) in this file.")
            }
            (true, true) => format!("The variable {varname} may not be {needed} by any package."),
        };
        out.push(Finding::warning(message));
    }

    fn check_match_value(&self, varname: &str, pattern: &str, out: &mut Vec<Finding>) {
        let Some(vartype) = self.catalog.lookup(varname) else {
            return;
        };
        if let Err(problem) = vartype.basic.check_pattern(pattern) {
            out.push(Finding::warning(format!("{varname}: {problem}.")));
        }
    }
}

/// Split `.for` arguments into the loop variables and the values.
fn split_for_args(text: &str) -> Option<(Vec<&str>, &str)> {
    let mut vars = Vec::new();
    let mut rest = text.trim_start();
    loop {
        let end = rest.find(char::is_whitespace)?;
        let (word, after) = rest.split_at(end);
        let after = after.trim_start();
        if word == "in" && !vars.is_empty() {
            return Some((vars, after.trim_end()));
        }
        vars.push(word);
        rest = after;
    }
}

struct CondChecker<'c, 'a> {
    checker: &'c Checker<'a>,
    out: &'c mut Vec<Finding>,
}

/// Compare `value` against the enumeration values as they look after the
/// `:S` modifiers of `lhs`.
fn substituted_value_mismatch(lhs: &VarRef, values: &[String], value: &str) -> Option<Finding> {
    let substituted: Vec<String> = values
        .iter()
        .map(|v| {
            lhs.modifiers
                .iter()
                .try_fold(v.clone(), |acc, m| m.apply_subst(&acc))
        })
        .collect::<Option<_>>()?;
    if substituted.iter().any(|v| v == value) {
        return None;
    }
    Some(Finding::warning(format!(
        "{}: {value:?} is not one of the possible values {{ {} }} of {}.",
        lhs.name,
        substituted.join(" "),
        lhs.text
    )))
}

impl CondVisitor for CondChecker<'_, '_> {
    fn empty(&mut self, varref: &VarRef) {
        if varref.name.starts_with("${") {
            self.out.push(Finding::warning(
                "The empty() function takes a variable name as parameter, not a variable expression.",
            ));
        }
    }

    fn compare_str(&mut self, lhs: &VarRef, _op: CmpOp, value: &str) {
        let Some(vartype) = self.checker.catalog.lookup(&lhs.name) else {
            return;
        };
        match lhs.modifiers.as_slice() {
            [] => {
                for problem in vartype.check_value(value) {
                    self.out.push(Finding::warning(format!("{}: {problem}.", lhs.name)));
                }
            }
            [m] if m.match_pattern().is_some() && !value.is_empty() => {
                self.checker.check_match_value(&lhs.name, value, self.out);
            }
            mods if mods.iter().all(|m| m.subst().is_some()) => {
                if let BasicKind::Enum(values) = &vartype.basic
                    && !vartype.is_list()
                    && !value.contains('$')
                {
                    self.out.extend(substituted_value_mismatch(lhs, values, value));
                }
            }
            _ => {}
        }
    }

    fn reference(&mut self, varref: &VarRef) {
        let ctx = UseContext::new(None, Phase::LoadTime, QuotingState::Plain, Extent::WholeWord);
        self.checker.check_varuse(varref, &ctx, self.out);
        for m in &varref.modifiers {
            if let Some(p) = m.match_pattern() {
                self.checker
                    .check_match_value(&varref.name, &p.pattern, self.out);
            }
        }
    }
}
