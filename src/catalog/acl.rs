//! Per-variable permission tables keyed by filename glob.

use bitflags::bitflags;
use glob::Pattern;

use crate::error::ConfigError;

bitflags! {
    /// What a file may do with a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PermissionSet: u8 {
        /// `VAR?= value`
        const DEFAULT_ASSIGN = 1 << 0;
        /// `VAR= value`, `VAR:= value`, `VAR!= command`
        const SET = 1 << 1;
        /// `VAR+= value`
        const APPEND = 1 << 2;
        /// `${VAR}` in a context that is evaluated after all files are loaded.
        const USE = 1 << 3;
        /// `${VAR}` in `.if`, `.for` or on the right-hand side of `:=`.
        const USE_AT_LOAD_TIME = 1 << 4;

        const ALL_WRITE = Self::DEFAULT_ASSIGN.bits() | Self::SET.bits() | Self::APPEND.bits();
        const ALL_USE = Self::USE.bits() | Self::USE_AT_LOAD_TIME.bits();
    }
}

impl PermissionSet {
    /// Human-readable form used in findings, e.g. `"set, appended to or used"`.
    pub fn describe(self) -> String {
        let words: Vec<&str> = [
            (Self::DEFAULT_ASSIGN, "given a default value"),
            (Self::SET, "set"),
            (Self::APPEND, "appended to"),
            (Self::USE, "used"),
            (Self::USE_AT_LOAD_TIME, "used at load time"),
        ]
        .into_iter()
        .filter(|(perm, _)| self.contains(*perm))
        .map(|(_, word)| word)
        .collect();

        match words.as_slice() {
            [] => "none".to_string(),
            [one] => (*one).to_string(),
            [init @ .., last] => format!("{} or {last}", init.join(", ")),
        }
    }

    /// Parse the permission half of an ACL entry.
    ///
    /// The words must appear in the order `default, set, append, use,
    /// use-loadtime`, or the whole text must be `none`.
    fn parse(varname: &str, perms: &str) -> Result<Self, ConfigError> {
        if perms == "none" {
            return Ok(Self::empty());
        }

        let mut words = perms.split(", ").peekable();
        let mut result = Self::empty();
        for (word, perm) in [
            ("default", Self::DEFAULT_ASSIGN),
            ("set", Self::SET),
            ("append", Self::APPEND),
            ("use", Self::USE),
            ("use-loadtime", Self::USE_AT_LOAD_TIME),
        ] {
            if words.next_if_eq(&word).is_some() {
                result |= perm;
            }
        }

        if words.next().is_some() || result.is_empty() {
            return Err(ConfigError::InvalidPermission {
                varname: varname.to_string(),
                perms: perms.to_string(),
            });
        }
        Ok(result)
    }
}

/// The filename globs an ACL entry may name without the `special:` prefix.
pub const GLOB_VOCABULARY: [&str; 8] = [
    "Makefile",
    "Makefile.*",
    "buildlink3.mk",
    "builtin.mk",
    "options.mk",
    "hacks.mk",
    "*.mk",
    "*",
];

/// One `(filename-glob, permissions)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionEntry {
    pub glob: String,
    pattern: Pattern,
    pub permissions: PermissionSet,
}

impl PermissionEntry {
    pub fn new(glob: &str, permissions: PermissionSet) -> Result<Self, glob::PatternError> {
        Ok(Self {
            glob: glob.to_string(),
            pattern: Pattern::new(glob)?,
            permissions,
        })
    }

    /// Whether this entry applies to the given file (basename only).
    pub fn matches(&self, filename: &str) -> bool {
        self.pattern.matches(basename(filename))
    }

    fn is_wildcard(&self) -> bool {
        self.glob.contains(['*', '?', '['])
    }
}

/// Ordered, first-match-wins list of permission entries for one variable.
///
/// No entry is reachable only through an earlier one: registration rejects
/// any glob that an earlier glob of the same table already matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PermissionTable {
    entries: Vec<PermissionEntry>,
}

impl PermissionTable {
    /// Build a table from already-parsed entries, checking reachability.
    pub fn new(varname: &str, entries: Vec<PermissionEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::NoAclEntries(varname.to_string()));
        }
        for (i, entry) in entries.iter().enumerate() {
            if let Some(earlier) = entries[..i].iter().find(|prev| prev.pattern.matches(&entry.glob)) {
                return Err(ConfigError::UnreachableGlob {
                    varname: varname.to_string(),
                    glob: entry.glob.clone(),
                    earlier: earlier.glob.clone(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Parse textual ACL entries of the form `"Makefile, *.mk: default, set, use"`.
    pub fn parse<S: AsRef<str>>(varname: &str, acl: &[S]) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        let mut prev_perms: Option<&str> = None;

        for entry in acl {
            let entry = entry.as_ref();
            let Some((globs, perms)) = entry.split_once(": ") else {
                return Err(ConfigError::MalformedAclEntry {
                    varname: varname.to_string(),
                    entry: entry.to_string(),
                });
            };
            if perms.contains(": ") {
                return Err(ConfigError::MalformedAclEntry {
                    varname: varname.to_string(),
                    entry: entry.to_string(),
                });
            }
            if prev_perms == Some(perms) {
                return Err(ConfigError::RepeatedPermissions {
                    varname: varname.to_string(),
                    perms: perms.to_string(),
                });
            }
            prev_perms = Some(perms);

            let permissions = PermissionSet::parse(varname, perms)?;
            for glob in globs.split(", ") {
                let glob = if GLOB_VOCABULARY.contains(&glob) {
                    glob
                } else if let Some(literal) = glob.strip_prefix("special:")
                    && !literal.is_empty()
                {
                    literal
                } else {
                    return Err(ConfigError::InvalidGlob {
                        varname: varname.to_string(),
                        glob: glob.to_string(),
                    });
                };
                let parsed = PermissionEntry::new(glob, permissions).map_err(|_| {
                    ConfigError::InvalidGlob {
                        varname: varname.to_string(),
                        glob: glob.to_string(),
                    }
                })?;
                entries.push(parsed);
            }
        }

        Self::new(varname, entries)
    }

    /// A table with a single entry; used for tool and guessed types.
    pub(crate) fn everywhere(permissions: PermissionSet) -> Self {
        Self {
            entries: vec![PermissionEntry {
                glob: "*".to_string(),
                pattern: Pattern::new("*").expect("\"*\" is a valid glob"),
                permissions,
            }],
        }
    }

    pub fn entries(&self) -> &[PermissionEntry] {
        &self.entries
    }

    fn first_match(&self, filename: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(filename))
    }

    /// Permissions for the given file. The first matching glob wins; no
    /// match yields the empty set.
    pub fn effective(&self, filename: &str) -> PermissionSet {
        self.first_match(filename)
            .map(|i| self.entries[i].permissions)
            .unwrap_or(PermissionSet::empty())
    }

    /// Union of the permissions over all files.
    pub fn union(&self) -> PermissionSet {
        self.entries
            .iter()
            .fold(PermissionSet::empty(), |acc, e| acc | e.permissions)
    }

    /// Files in which every bit of `needed` is granted.
    ///
    /// Wildcard globs are expanded to the vocabulary names whose first match
    /// is that very entry, so a file excluded by an earlier entry is never
    /// offered as an alternative.
    pub fn alternatives(&self, needed: PermissionSet) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if needed.is_empty() || !entry.permissions.contains(needed) {
                continue;
            }
            if !entry.is_wildcard() {
                if !result.contains(&entry.glob) {
                    result.push(entry.glob.clone());
                }
                continue;
            }
            for name in GLOB_VOCABULARY.iter().filter(|n| **n != "*") {
                if entry.pattern.matches(name)
                    && self.first_match(name) == Some(i)
                    && !result.iter().any(|r| r == name)
                {
                    result.push((*name).to_string());
                }
            }
        }
        result
    }
}

fn basename(filename: &str) -> &str {
    filename.rsplit_once('/').map_or(filename, |(_, base)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(acl: &[&str]) -> PermissionTable {
        PermissionTable::parse("VAR", acl).unwrap()
    }

    #[test]
    fn parse_permission_words_in_order() {
        let perms = PermissionSet::parse("VAR", "default, set, use").unwrap();
        assert_eq!(
            perms,
            PermissionSet::DEFAULT_ASSIGN | PermissionSet::SET | PermissionSet::USE
        );
    }

    #[test]
    fn parse_permission_none() {
        assert!(PermissionSet::parse("VAR", "none").unwrap().is_empty());
    }

    #[test]
    fn parse_permission_out_of_order_is_rejected() {
        assert!(matches!(
            PermissionSet::parse("VAR", "use, set"),
            Err(ConfigError::InvalidPermission { .. })
        ));
    }

    #[test]
    fn parse_permission_unknown_word_is_rejected() {
        assert!(PermissionSet::parse("VAR", "read").is_err());
    }

    #[test]
    fn first_matching_glob_wins() {
        let t = table(&["buildlink3.mk: none", "*: use"]);
        assert_eq!(t.effective("Makefile"), PermissionSet::USE);
        assert_eq!(t.effective("buildlink3.mk"), PermissionSet::empty());
        assert_eq!(t.effective("../../devel/foo/buildlink3.mk"), PermissionSet::empty());
    }

    #[test]
    fn no_match_is_empty() {
        let t = table(&["Makefile: set"]);
        assert!(t.effective("options.mk").is_empty());
    }

    #[test]
    fn unreachable_glob_is_fatal() {
        let err = PermissionTable::parse("VAR", &["*: use", "buildlink3.mk: none"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableGlob { .. }));
    }

    #[test]
    fn unreachable_glob_within_one_entry() {
        let err = PermissionTable::parse("VAR", &["*.mk, options.mk: use"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableGlob { .. }));
    }

    #[test]
    fn invalid_glob_is_fatal() {
        let err = PermissionTable::parse("VAR", &["foo.mk: use"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGlob { .. }));
    }

    #[test]
    fn special_glob_is_literal() {
        let t = table(&["special:Makefile.common: set", "*: use"]);
        assert_eq!(t.effective("Makefile.common"), PermissionSet::SET);
        assert_eq!(t.entries()[0].glob, "Makefile.common");
    }

    #[test]
    fn repeated_permissions_are_fatal() {
        let err = PermissionTable::parse("VAR", &["Makefile: use", "*.mk: use"]).unwrap_err();
        assert!(matches!(err, ConfigError::RepeatedPermissions { .. }));
    }

    #[test]
    fn missing_colon_is_fatal() {
        let err = PermissionTable::parse("VAR", &["Makefile use"]).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedAclEntry { .. }));
    }

    #[test]
    fn empty_table_is_fatal() {
        let err = PermissionTable::parse::<&str>("VAR", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::NoAclEntries(_)));
    }

    #[test]
    fn alternatives_skip_excluded_files() {
        let t = table(&["buildlink3.mk: none", "*: use"]);
        let alt = t.alternatives(PermissionSet::USE);
        assert_eq!(alt[0], "Makefile");
        assert!(alt.contains(&"builtin.mk".to_string()));
        assert!(!alt.contains(&"buildlink3.mk".to_string()));
    }

    #[test]
    fn alternatives_keep_literal_globs() {
        let t = table(&[
            "buildlink3.mk, builtin.mk: none",
            "Makefile, Makefile.*, *.mk: default, set, use",
        ]);
        let alt = t.alternatives(PermissionSet::SET);
        assert_eq!(alt, vec!["Makefile", "Makefile.*", "options.mk", "hacks.mk", "*.mk"]);
    }

    #[test]
    fn alternatives_empty_when_nothing_grants() {
        let t = table(&["*: use"]);
        assert!(t.alternatives(PermissionSet::SET).is_empty());
    }

    #[test]
    fn describe_joins_words() {
        assert_eq!(PermissionSet::empty().describe(), "none");
        assert_eq!(PermissionSet::USE.describe(), "used");
        assert_eq!(
            (PermissionSet::SET | PermissionSet::APPEND | PermissionSet::USE).describe(),
            "set, appended to or used"
        );
    }

    #[test]
    fn union_covers_all_entries() {
        let t = table(&["Makefile: set", "*: use, use-loadtime"]);
        assert!(t.union().contains(PermissionSet::SET | PermissionSet::USE_AT_LOAD_TIME));
    }
}
