//! Declared types of Makefile variables.

use std::fmt;

use super::acl::PermissionTable;

/// What a single value (or list item) of a variable looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicKind {
    Unchecked,
    Identifier,
    Pathname,
    PrefixPathname,
    Pathmask,
    Pathlist,
    Filename,
    Filemask,
    ShellWord,
    ShellCommand,
    ShellCommands,
    CFlag,
    LdFlag,
    PkgName,
    PkgPath,
    PkgRevision,
    Version,
    Integer,
    FileMode,
    YesNo,
    Yes,
    UserGroupName,
    Option,
    Category,
    Url,
    FetchUrl,
    Enum(Vec<String>),
}

impl BasicKind {
    /// Parse the type name used in the variable table.
    ///
    /// Enumerations are not named here; they are built from their values.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "Unchecked" => Self::Unchecked,
            "Identifier" => Self::Identifier,
            "Pathname" => Self::Pathname,
            "PrefixPathname" => Self::PrefixPathname,
            "Pathmask" => Self::Pathmask,
            "Pathlist" => Self::Pathlist,
            "Filename" => Self::Filename,
            "Filemask" => Self::Filemask,
            "ShellWord" => Self::ShellWord,
            "ShellCommand" => Self::ShellCommand,
            "ShellCommands" => Self::ShellCommands,
            "CFlag" => Self::CFlag,
            "LdFlag" => Self::LdFlag,
            "PkgName" => Self::PkgName,
            "PkgPath" => Self::PkgPath,
            "PkgRevision" => Self::PkgRevision,
            "Version" => Self::Version,
            "Integer" => Self::Integer,
            "FileMode" => Self::FileMode,
            "YesNo" => Self::YesNo,
            "Yes" => Self::Yes,
            "UserGroupName" => Self::UserGroupName,
            "Option" => Self::Option,
            "Category" => Self::Category,
            "URL" => Self::Url,
            "FetchURL" => Self::FetchUrl,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unchecked => "Unchecked",
            Self::Identifier => "Identifier",
            Self::Pathname => "Pathname",
            Self::PrefixPathname => "PrefixPathname",
            Self::Pathmask => "Pathmask",
            Self::Pathlist => "Pathlist",
            Self::Filename => "Filename",
            Self::Filemask => "Filemask",
            Self::ShellWord => "ShellWord",
            Self::ShellCommand => "ShellCommand",
            Self::ShellCommands => "ShellCommands",
            Self::CFlag => "CFlag",
            Self::LdFlag => "LdFlag",
            Self::PkgName => "PkgName",
            Self::PkgPath => "PkgPath",
            Self::PkgRevision => "PkgRevision",
            Self::Version => "Version",
            Self::Integer => "Integer",
            Self::FileMode => "FileMode",
            Self::YesNo => "YesNo",
            Self::Yes => "Yes",
            Self::UserGroupName => "UserGroupName",
            Self::Option => "Option",
            Self::Category => "Category",
            Self::Url => "URL",
            Self::FetchUrl => "FetchURL",
            Self::Enum(_) => "enum",
        }
    }

    /// Values of this kind never contain whitespace or shell metacharacters,
    /// so quoting them cannot change their meaning.
    pub fn is_plain_word(&self) -> bool {
        matches!(
            self,
            Self::Identifier
                | Self::Pathname
                | Self::PrefixPathname
                | Self::Filename
                | Self::PkgName
                | Self::PkgPath
                | Self::PkgRevision
                | Self::Version
                | Self::Integer
                | Self::FileMode
                | Self::YesNo
                | Self::Yes
                | Self::UserGroupName
                | Self::Option
                | Self::Category
                | Self::Enum(_)
        )
    }

    /// Values of this kind are interpreted by the shell.
    pub fn is_shell(&self) -> bool {
        matches!(
            self,
            Self::ShellCommand | Self::ShellCommands | Self::ShellWord | Self::CFlag | Self::LdFlag
        )
    }

    /// Check a literal value of this kind. Values containing `$` are not
    /// checked since their expansion is unknown.
    pub fn check_value(&self, value: &str) -> Result<(), String> {
        if value.contains('$') {
            return Ok(());
        }
        let valid = match self {
            Self::Identifier => {
                !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.'))
            }
            Self::Pathname | Self::PrefixPathname | Self::PkgName | Self::PkgPath => {
                !value.is_empty() && !value.contains(char::is_whitespace)
            }
            Self::Filename => {
                !value.is_empty() && !value.contains(char::is_whitespace) && !value.contains('/')
            }
            Self::Integer | Self::PkgRevision => {
                !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
            }
            Self::Version => {
                value.starts_with(|c: char| c.is_ascii_digit())
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
            }
            Self::FileMode => {
                (3..=4).contains(&value.len()) && value.chars().all(|c| ('0'..='7').contains(&c))
            }
            Self::YesNo => matches!(value, "yes" | "no" | "YES" | "NO" | "Yes" | "No"),
            Self::Yes => matches!(value, "yes" | "YES" | "Yes"),
            Self::UserGroupName => {
                !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
            }
            Self::Option => {
                value.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
                    && value.chars().all(|c| {
                        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | '_')
                    })
            }
            Self::Category => {
                !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            }
            Self::Enum(values) => {
                if values.iter().any(|v| v == value) {
                    return Ok(());
                }
                return Err(format!(
                    "{value:?} is not valid; use one of {{ {} }}",
                    values.join(" ")
                ));
            }
            _ => true,
        };
        if valid {
            Ok(())
        } else {
            Err(format!("{value:?} is not a valid {}", self.name()))
        }
    }

    /// Check a `:M`/`:N` pattern against this kind.
    ///
    /// Patterns without wildcards are checked as plain values. For
    /// enumerations, a wildcard pattern must match at least one value.
    pub fn check_pattern(&self, pattern: &str) -> Result<(), String> {
        if pattern.contains('$') {
            return Ok(());
        }
        let exact = !pattern.contains(['*', '?', '[', '\\']);
        match self {
            Self::Enum(values) if !exact => {
                let Ok(glob) = glob::Pattern::new(pattern) else {
                    return Ok(());
                };
                if values.iter().any(|v| glob.matches(v)) {
                    Ok(())
                } else {
                    Err(format!(
                        "the pattern {pattern:?} cannot match any of {{ {} }}",
                        values.join(" ")
                    ))
                }
            }
            _ if exact => self.check_value(pattern),
            _ => Ok(()),
        }
    }
}

/// How a variable's value is split into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// A single value.
    None,
    /// Split at whitespace, like `.for` loops do.
    Space,
    /// Split into shell words, respecting quotes.
    Shell,
}

impl ListKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "space" => Some(Self::Space),
            "shell" => Some(Self::Shell),
            _ => None,
        }
    }

    /// Split a literal value into items.
    pub fn split(self, value: &str) -> Vec<String> {
        match self {
            Self::None => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed.to_string()]
                }
            }
            Self::Space => value.split_whitespace().map(String::from).collect(),
            Self::Shell => shlex::split(value)
                .unwrap_or_else(|| value.split_whitespace().map(String::from).collect()),
        }
    }
}

/// Where a type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Registered from the variable table.
    Declared,
    /// The variable names a known tool command, like `SED`.
    Tool,
    /// Derived from naming conventions; permissions are not enforced.
    Guessed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableType {
    pub basic: BasicKind,
    pub list: ListKind,
    pub acl: PermissionTable,
    pub origin: Origin,
}

impl VariableType {
    pub fn new(basic: BasicKind, list: ListKind, acl: PermissionTable) -> Self {
        Self {
            basic,
            list,
            acl,
            origin: Origin::Declared,
        }
    }

    pub fn is_guessed(&self) -> bool {
        self.origin == Origin::Guessed
    }

    pub fn is_tool(&self) -> bool {
        self.origin == Origin::Tool
    }

    /// Whether the value is treated as a list of shell words. Shell
    /// commands count as lists since they consist of several words.
    pub fn is_list(&self) -> bool {
        self.list != ListKind::None
            || matches!(self.basic, BasicKind::ShellCommand | BasicKind::ShellCommands)
    }

    /// Check a literal value item by item.
    pub fn check_value(&self, value: &str) -> Vec<String> {
        self.list
            .split(value)
            .iter()
            .filter_map(|item| self.basic.check_value(item).err())
            .collect()
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.list {
            ListKind::None => "",
            ListKind::Space => "InternalList of ",
            ListKind::Shell => "List of ",
        };
        match &self.basic {
            BasicKind::Enum(values) => write!(f, "{prefix}enum {{ {} }}", values.join(" "))?,
            other => write!(f, "{prefix}{}", other.name())?,
        }
        if self.is_guessed() {
            f.write_str(" (guessed)")?;
        }
        Ok(())
    }
}
