use serde::Serialize;

use crate::catalog::PermissionSet;

/// Whether a reference needs the `:Q` modifier in its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotingVerdict {
    Required,
    Forbidden,
    Indifferent,
    Unknown,
}

impl QuotingVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotingVerdict::Required => "required",
            QuotingVerdict::Forbidden => "forbidden",
            QuotingVerdict::Indifferent => "indifferent",
            QuotingVerdict::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Note => "NOTE",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestedAction {
    AddQ,
    RemoveQ,
    RequireMStarQ,
    RemoveMStar,
    UseCurlyBraces,
}

/// A textual replacement that would fix a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub action: SuggestedAction,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl Finding {
    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, action: SuggestedAction, from: String, to: String) -> Self {
        self.suggestion = Some(Suggestion { action, from, to });
        self
    }
}

/// Outcome of [`is_use_allowed`](super::is_use_allowed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsePermission {
    pub allowed: bool,
    pub needed: PermissionSet,
    /// Files in which the needed permission would be granted.
    pub alternatives: Vec<String>,
}

/// Outcome of [`is_assign_allowed`](super::is_assign_allowed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignPermission {
    pub allowed: bool,
    pub needed: PermissionSet,
    /// The write permissions this file does have.
    pub alternative_actions: PermissionSet,
    pub alternative_files: Vec<String>,
}
