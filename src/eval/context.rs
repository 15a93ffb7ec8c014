use std::fmt;

use crate::catalog::{BasicKind, ListKind, PermissionSet, PermissionTable, VariableType};
use crate::parse::QuotingState;

/// When make evaluates a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// While the file is parsed: `.if`, `.for`, right-hand side of `:=`.
    LoadTime,
    /// When a shell command runs or a target is built.
    RunTime,
}

/// How much of a shell word a reference makes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// `${VAR}` or `"${VAR}"`
    WholeWord,
    /// `--prefix=${PREFIX}`
    PartOfWord,
    /// An item of a `.for` loop, which make splits at whitespace.
    ForLoopItem,
}

/// Everything about the place of a reference that influences quoting.
#[derive(Debug, Clone, Copy)]
pub struct UseContext<'a> {
    /// The type that the surrounding text has: a shell command, the
    /// left-hand side of an assignment, or a `.for` loop.
    pub context_type: Option<&'a VariableType>,
    pub phase: Phase,
    pub quoting: QuotingState,
    pub extent: Extent,
}

impl<'a> UseContext<'a> {
    pub fn new(
        context_type: Option<&'a VariableType>,
        phase: Phase,
        quoting: QuotingState,
        extent: Extent,
    ) -> Self {
        Self {
            context_type,
            phase,
            quoting,
            extent,
        }
    }
}

impl fmt::Display for UseContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = self
            .context_type
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        write!(f, "({context}, {:?}, {}, {:?})", self.phase, self.quoting, self.extent)
    }
}

/// The type of a shell command line in a target or of a `!=` assignment.
pub fn shell_command_type() -> VariableType {
    VariableType::new(
        BasicKind::ShellCommand,
        ListKind::None,
        PermissionTable::everywhere(PermissionSet::ALL_WRITE | PermissionSet::USE),
    )
}

/// The type of the values of a `.for` loop.
pub fn for_loop_type() -> VariableType {
    VariableType::new(
        BasicKind::Unchecked,
        ListKind::Space,
        PermissionTable::everywhere(PermissionSet::ALL_USE),
    )
}

/// The operator of a variable assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `?=`
    Default,
    /// `+=`
    Append,
    /// `:=`
    Eval,
    /// `!=`
    Shell,
}

impl AssignOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Assign),
            "?=" => Some(Self::Default),
            "+=" => Some(Self::Append),
            ":=" => Some(Self::Eval),
            "!=" => Some(Self::Shell),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Default => "?=",
            Self::Append => "+=",
            Self::Eval => ":=",
            Self::Shell => "!=",
        }
    }

    /// The permission an assignment with this operator needs.
    pub fn needed(self) -> PermissionSet {
        match self {
            Self::Assign | Self::Eval | Self::Shell => PermissionSet::SET,
            Self::Default => PermissionSet::DEFAULT_ASSIGN,
            Self::Append => PermissionSet::APPEND,
        }
    }

    /// When the right-hand side is evaluated.
    pub fn phase(self) -> Phase {
        match self {
            Self::Eval | Self::Shell => Phase::LoadTime,
            _ => Phase::RunTime,
        }
    }
}
