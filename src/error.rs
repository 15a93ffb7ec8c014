//! Fatal configuration errors.
//!
//! Only the catalog registration path can fail. Everything that goes wrong
//! while scanning a fragment is reported as data (malformed flags and
//! [`Finding`](crate::eval::Finding)s), never as an error.

use thiserror::Error;

/// A mistake in the static variable table or in a user overlay.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The variable name pattern is not `NAME`, `NAME*`, `NAME.*` or `@`.
    #[error("invalid variable name pattern {0:?}")]
    InvalidVariableName(String),

    /// The `type` field names no known basic kind.
    #[error("unknown basic type {kind:?} for {varname}")]
    UnknownType { varname: String, kind: String },

    /// An enumeration type was declared without any values.
    #[error("enumeration type for {0} has no values")]
    EmptyEnumeration(String),

    /// The `list` field is not one of `none`, `space`, `shell`.
    #[error("unknown list kind {kind:?} for {varname}")]
    UnknownListKind { varname: String, kind: String },

    /// A variable was declared without any ACL entries.
    #[error("at least one ACL entry must be given for {0}")]
    NoAclEntries(String),

    /// An ACL entry is not of the form `globs: permissions`.
    #[error("ACL entry {entry:?} for {varname} must have exactly one \": \"")]
    MalformedAclEntry { varname: String, entry: String },

    /// The glob is outside the fixed vocabulary and lacks the `special:` prefix.
    #[error("invalid ACL glob {glob:?} for {varname}")]
    InvalidGlob { varname: String, glob: String },

    /// A glob is already fully matched by an earlier entry of the same table.
    #[error("unreachable ACL pattern {glob:?} for {varname}, already covered by {earlier:?}")]
    UnreachableGlob {
        varname: String,
        glob: String,
        earlier: String,
    },

    /// Two consecutive entries declare the same permissions.
    #[error("repeated permissions {perms:?} for {varname}")]
    RepeatedPermissions { varname: String, perms: String },

    /// The permission list contains an unknown word or has them out of order.
    #[error(
        "invalid ACL permission {perms:?} for {varname}; valid permissions are \
         default, set, append, use, use-loadtime (in this order), or none"
    )]
    InvalidPermission { varname: String, perms: String },

    /// A variable refers to a profile that the config does not define.
    #[error("unknown ACL profile {profile:?} for {varname}")]
    UnknownProfile { varname: String, profile: String },

    /// A variable declares both a profile and explicit ACL entries, or neither.
    #[error("{0} must declare exactly one of `profile` and `acl`")]
    AmbiguousAcl(String),

    /// The configuration text is not valid TOML for the expected schema.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
