pub mod check;
pub mod context;
pub mod decision;

pub use check::{Checker, Fragment};
pub use context::{AssignOp, Extent, Phase, UseContext};
pub use decision::{
    AssignPermission, Finding, QuotingVerdict, Severity, SuggestedAction, Suggestion,
    UsePermission,
};

use crate::catalog::{ListKind, PermissionSet, VariableType};
use crate::parse::{Innermost, Modifier, QuotingState};

/// Decide whether a reference of type `vartype` needs `:Q` in `ctx`.
///
/// The rules are checked in order; the first one that applies decides.
pub fn classify(vartype: Option<&VariableType>, ctx: &UseContext<'_>) -> QuotingVerdict {
    let (Some(vartype), Some(context)) = (vartype, ctx.context_type) else {
        return QuotingVerdict::Unknown;
    };

    // make splits .for items at whitespace, so :Q would leave quotes in the items.
    if ctx.extent == Extent::ForLoopItem {
        return QuotingVerdict::Forbidden;
    }

    if vartype.basic.is_plain_word() {
        match vartype.list {
            ListKind::None => return QuotingVerdict::Indifferent,
            ListKind::Shell if ctx.extent != Extent::PartOfWord => {
                return QuotingVerdict::Forbidden;
            }
            _ => {}
        }
    }

    let innermost = ctx.quoting.innermost();
    if vartype.is_tool() {
        match innermost {
            Innermost::None if ctx.extent == Extent::WholeWord => return QuotingVerdict::Forbidden,
            Innermost::Backtick => return QuotingVerdict::Forbidden,
            Innermost::Single | Innermost::Double => return QuotingVerdict::Indifferent,
            Innermost::None => {}
        }
    }

    if ctx.extent == Extent::PartOfWord
        && context.basic.is_shell()
        && innermost != Innermost::Backtick
    {
        return QuotingVerdict::Required;
    }

    let want_list = context.is_list();
    let have_list = vartype.is_list();
    if want_list && have_list && ctx.extent != Extent::PartOfWord {
        return QuotingVerdict::Indifferent;
    }
    if want_list != have_list {
        QuotingVerdict::Required
    } else {
        QuotingVerdict::Unknown
    }
}

/// Variables that GNU configure scripts only handle correctly after `:M*`.
fn is_flag_variable(varname: &str) -> bool {
    const FLAGS: [&str; 6] = ["CFLAGS", "CPPFLAGS", "CXXFLAGS", "FFLAGS", "LDFLAGS", "LIBS"];
    let suffix = varname.rsplit_once('_').map_or(varname, |(_, suffix)| suffix);
    FLAGS.contains(&suffix)
}

/// Compare the modifiers of a reference with its verdict.
///
/// A `:Q` inside quotes is reported as unreliable unless the verdict
/// already asks to change the modifiers.
pub fn check_use(
    varname: &str,
    modifiers: &[Modifier],
    verdict: QuotingVerdict,
    quoting: QuotingState,
    gnu_configure: bool,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let written: String = modifiers.iter().map(|m| format!(":{m}")).collect();
    let has_q = modifiers.last().is_some_and(Modifier::is_q);
    let has_mstar_q = matches!(modifiers, [.., m, q] if m.text() == "M*" && q.is_q());
    let need_mstar = gnu_configure && is_flag_variable(varname);
    let plain = quoting == QuotingState::Plain;

    let mut keep = modifiers.len();
    if has_q {
        keep -= 1;
    }
    if keep > 0 && modifiers[keep - 1].text() == "M*" {
        keep -= 1;
    }
    let stripped: String = modifiers[..keep].iter().map(|m| format!(":{m}")).collect();
    let braces = |mods: &str| format!("${{{varname}{mods}}}");

    let mut reported = false;
    if verdict != QuotingVerdict::Unknown && has_mstar_q && !need_mstar {
        findings.push(
            Finding::note("The :M* modifier is not needed here.").with_suggestion(
                SuggestedAction::RemoveMStar,
                braces(&written),
                braces(&format!("{stripped}:Q")),
            ),
        );
    } else if verdict == QuotingVerdict::Required {
        let correct = format!("{stripped}{}", if need_mstar { ":M*:Q" } else { ":Q" });
        if written != correct {
            let action = if need_mstar {
                SuggestedAction::RequireMStarQ
            } else {
                SuggestedAction::AddQ
            };
            let message = if plain {
                format!("Please use {} instead of {}.", braces(&correct), braces(&written))
            } else {
                format!(
                    "Please use {} instead of {} and make sure the variable appears outside of any quoting characters.",
                    braces(&correct),
                    braces(&written)
                )
            };
            findings.push(Finding::warning(message).with_suggestion(
                action,
                braces(&written),
                braces(&correct),
            ));
            reported = true;
        }
    }

    if has_q && matches!(verdict, QuotingVerdict::Forbidden | QuotingVerdict::Indifferent) {
        let bad = braces(&written);
        let good = braces(&written[..written.len() - 2]);
        let finding = if verdict == QuotingVerdict::Forbidden {
            Finding::warning(format!("The :Q operator should not be used for ${{{varname}}} here."))
        } else {
            Finding::note(format!("The :Q operator isn't necessary for ${{{varname}}} here."))
        };
        findings.push(finding.with_suggestion(SuggestedAction::RemoveQ, bad, good));
        reported = true;
    }

    if has_q && !plain && !reported {
        findings.push(Finding::warning(format!(
            "Please move {} outside of any quoting characters.",
            braces(&written)
        )));
    }
    findings
}

/// Whether a variable may be used in `filename` at the given phase.
pub fn is_use_allowed(vartype: &VariableType, filename: &str, phase: Phase) -> UsePermission {
    let perms = vartype.acl.effective(filename);
    let (needed, allowed) = match phase {
        Phase::LoadTime => (
            PermissionSet::USE_AT_LOAD_TIME,
            perms.contains(PermissionSet::USE_AT_LOAD_TIME),
        ),
        Phase::RunTime => (PermissionSet::USE, perms.intersects(PermissionSet::ALL_USE)),
    };
    let alternatives = if allowed {
        Vec::new()
    } else {
        vartype.acl.alternatives(needed)
    };
    UsePermission {
        allowed,
        needed,
        alternatives,
    }
}

/// Whether a variable may be assigned with `op` in `filename`.
pub fn is_assign_allowed(vartype: &VariableType, filename: &str, op: AssignOp) -> AssignPermission {
    let perms = vartype.acl.effective(filename);
    let needed = op.needed();
    let allowed = perms.contains(needed);
    AssignPermission {
        allowed,
        needed,
        alternative_actions: perms & PermissionSet::ALL_WRITE,
        alternative_files: if allowed {
            Vec::new()
        } else {
            vartype.acl.alternatives(needed)
        },
    }
}
