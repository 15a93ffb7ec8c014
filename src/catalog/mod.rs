//! The type catalog: declared types and permissions of Makefile variables.
//!
//! Built once from configuration and read-only afterwards. Lookups fall back
//! from the exact name to the parameterized form (`BASE.*`), then to known
//! tools, then to naming conventions.

pub mod acl;
pub mod tools;
pub mod types;

pub use acl::{GLOB_VOCABULARY, PermissionEntry, PermissionSet, PermissionTable};
pub use tools::{Tool, ToolRegistry};
pub use types::{BasicKind, ListKind, Origin, VariableType};

use std::borrow::Cow;
use std::collections::HashMap;

use crate::config::Config;
use crate::error::ConfigError;

#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: HashMap<String, VariableType>,
    tools: ToolRegistry,
}

impl TypeCatalog {
    /// An empty catalog without variables or tools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from configuration, registering every variable.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut catalog = Self {
            types: HashMap::new(),
            tools: ToolRegistry::from_config(&config.tools),
        };

        for var in &config.variables {
            let basic = if var.kind == "enum" {
                if var.values.is_empty() {
                    return Err(ConfigError::EmptyEnumeration(var.name.clone()));
                }
                BasicKind::Enum(var.values.clone())
            } else {
                BasicKind::from_name(&var.kind).ok_or_else(|| ConfigError::UnknownType {
                    varname: var.name.clone(),
                    kind: var.kind.clone(),
                })?
            };
            let list = ListKind::from_name(&var.list).ok_or_else(|| ConfigError::UnknownListKind {
                varname: var.name.clone(),
                kind: var.list.clone(),
            })?;
            let acl = var.acl_entries(&config.profiles)?;
            catalog.register(&var.name, basic, list, acl)?;
        }

        log::debug!(
            "type catalog: {} variables, {} tools",
            catalog.types.len(),
            catalog.tools.len()
        );
        Ok(catalog)
    }

    /// Register a variable type.
    ///
    /// `pattern` is `NAME`, `NAME.*` (parameterized only) or `NAME*`, which
    /// registers both `NAME` and `NAME.*`. A later registration of the same
    /// name replaces the earlier one.
    pub fn register<S: AsRef<str>>(
        &mut self,
        pattern: &str,
        basic: BasicKind,
        list: ListKind,
        acl: &[S],
    ) -> Result<(), ConfigError> {
        let (base, param) = split_pattern(pattern)
            .ok_or_else(|| ConfigError::InvalidVariableName(pattern.to_string()))?;
        let table = PermissionTable::parse(pattern, acl)?;
        let vartype = VariableType::new(basic, list, table);

        match param {
            Param::None => {
                self.types.insert(base.to_string(), vartype);
            }
            Param::Only => {
                self.types.insert(format!("{base}.*"), vartype);
            }
            Param::Both => {
                self.types.insert(format!("{base}.*"), vartype.clone());
                self.types.insert(base.to_string(), vartype);
            }
        }
        Ok(())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Number of registered names, counting `NAME` and `NAME.*` separately.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up the type of a variable.
    ///
    /// Types derived from tools or naming conventions are computed on the
    /// fly, hence the `Cow`.
    pub fn lookup(&self, varname: &str) -> Option<Cow<'_, VariableType>> {
        if let Some(vartype) = self.types.get(varname) {
            return Some(Cow::Borrowed(vartype));
        }
        if let Some(canon) = canonical_name(varname)
            && let Some(vartype) = self.types.get(&canon)
        {
            return Some(Cow::Borrowed(vartype));
        }

        if let Some(tool) = self.tools.by_varname(varname) {
            let mut perms = PermissionSet::USE;
            if tool.load_time {
                perms |= PermissionSet::USE_AT_LOAD_TIME;
            }
            let mut vartype = VariableType::new(
                BasicKind::ShellCommand,
                ListKind::None,
                PermissionTable::everywhere(perms),
            );
            vartype.origin = Origin::Tool;
            return Some(Cow::Owned(vartype));
        }

        if let Some(toolvar) = varname.strip_prefix("TOOLS_")
            && self.tools.by_varname(toolvar).is_some()
        {
            return Some(Cow::Owned(VariableType::new(
                BasicKind::Pathname,
                ListKind::None,
                PermissionTable::everywhere(PermissionSet::USE),
            )));
        }

        let guessed = guess_type(varname);
        match &guessed {
            Some(vartype) => log::debug!("guessed type of {varname}: {vartype}"),
            None => log::debug!("no type for {varname}"),
        }
        guessed.map(Cow::Owned)
    }

    /// Permissions of the variable in the given file; the first matching
    /// glob wins and no match yields the empty set.
    pub fn effective_permissions(&self, vartype: &VariableType, filename: &str) -> PermissionSet {
        vartype.acl.effective(filename)
    }
}

/// Which names a registration pattern covers.
enum Param {
    None,
    Only,
    Both,
}

/// Split `NAME`, `NAME*` or `NAME.*` into the base name and its suffix.
///
/// The base is either `@` or starts with an uppercase letter, `_` or `.`,
/// followed by uppercase letters, digits and underscores.
fn split_pattern(pattern: &str) -> Option<(&str, Param)> {
    let (base, param) = if let Some(base) = pattern.strip_suffix(".*") {
        (base, Param::Only)
    } else if let Some(base) = pattern.strip_suffix('*') {
        (base, Param::Both)
    } else {
        (pattern, Param::None)
    };

    if base == "@" {
        return Some((base, param));
    }
    let mut chars = base.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_uppercase() || first == '_' || first == '.')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    valid.then_some((base, param))
}

/// `BASE.param` becomes `BASE.*`. Names starting with a dot are not
/// parameterized.
fn canonical_name(varname: &str) -> Option<String> {
    match varname.find('.') {
        Some(dot) if dot > 0 => Some(format!("{}.*", &varname[..dot])),
        _ => None,
    }
}

/// Derive a type from naming conventions. Guessed types allow everything
/// except load-time use, and some allow that too.
fn guess_type(varname: &str) -> Option<VariableType> {
    let base = match varname.find('.') {
        Some(dot) if dot > 0 => &varname[..dot],
        _ => varname,
    };
    let runtime = PermissionSet::ALL_WRITE | PermissionSet::USE;
    let all = PermissionSet::all();

    let (basic, list, perms) = if base.ends_with("DIRS") {
        (BasicKind::Pathmask, ListKind::Shell, runtime)
    } else if base.ends_with("DIR") || varname.ends_with("_HOME") {
        (BasicKind::Pathname, ListKind::None, runtime)
    } else if base.ends_with("FILES") {
        (BasicKind::Pathmask, ListKind::Shell, runtime)
    } else if base.ends_with("FILE") {
        (BasicKind::Pathname, ListKind::None, runtime)
    } else if base.ends_with("PATH") {
        (BasicKind::Pathlist, ListKind::None, runtime)
    } else if base.ends_with("PATHS") {
        (BasicKind::Pathname, ListKind::Shell, runtime)
    } else if base.ends_with("_USER") || base.ends_with("_GROUP") {
        (BasicKind::UserGroupName, ListKind::None, all)
    } else if base.ends_with("_ENV") || base.ends_with("_ARGS") {
        (BasicKind::ShellWord, ListKind::Shell, runtime)
    } else if base.ends_with("_CMD") {
        (BasicKind::ShellCommand, ListKind::None, runtime)
    } else if base.ends_with("_CFLAGS") || base.ends_with("_CPPFLAGS") || base.ends_with("_CXXFLAGS") {
        (BasicKind::CFlag, ListKind::Shell, runtime)
    } else if base.ends_with("_LDFLAGS") {
        (BasicKind::LdFlag, ListKind::Shell, runtime)
    } else if base.ends_with("_MK") {
        (BasicKind::Unchecked, ListKind::None, all)
    } else if varname.starts_with("PLIST.") {
        (BasicKind::Yes, ListKind::None, all)
    } else {
        return None;
    };

    let mut vartype = VariableType::new(basic, list, PermissionTable::everywhere(perms));
    vartype.origin = Origin::Guessed;
    Some(vartype)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TypeCatalog {
        TypeCatalog::from_config(&Config::default_config()).unwrap()
    }

    #[test]
    fn default_config_registers() {
        let catalog = catalog();
        assert!(!catalog.is_empty());
        assert!(!catalog.tools().is_empty());
    }

    #[test]
    fn exact_lookup() {
        let catalog = catalog();
        let t = catalog.lookup("PKGNAME").unwrap();
        assert_eq!(t.basic, BasicKind::PkgName);
        assert_eq!(t.origin, Origin::Declared);
    }

    #[test]
    fn star_pattern_registers_base_and_parameterized() {
        let catalog = catalog();
        assert_eq!(catalog.lookup("CFLAGS").unwrap().basic, BasicKind::CFlag);
        assert_eq!(catalog.lookup("CFLAGS.gcc").unwrap().basic, BasicKind::CFlag);
    }

    #[test]
    fn parameterized_only_pattern() {
        let catalog = catalog();
        assert!(catalog.lookup("BUILDLINK_PREFIX.zlib").is_some());
        assert!(
            catalog
                .lookup("BUILDLINK_PREFIX")
                .is_none_or(|t| t.is_guessed())
        );
    }

    #[test]
    fn tool_variable_is_shell_command() {
        let catalog = catalog();
        let t = catalog.lookup("SED").unwrap();
        assert!(t.is_tool());
        assert_eq!(t.basic, BasicKind::ShellCommand);
        assert!(t.acl.effective("Makefile").contains(PermissionSet::USE_AT_LOAD_TIME));

        let chmod = catalog.lookup("CHMOD").unwrap();
        assert!(!chmod.acl.effective("Makefile").contains(PermissionSet::USE_AT_LOAD_TIME));
    }

    #[test]
    fn tools_prefix_is_pathname() {
        let catalog = catalog();
        let t = catalog.lookup("TOOLS_SED").unwrap();
        assert_eq!(t.basic, BasicKind::Pathname);
        assert!(catalog.lookup("TOOLS_NONEXISTENT").is_none());
    }

    #[test]
    fn guessed_types() {
        let catalog = catalog();
        let cases = [
            ("MY_DIRS", BasicKind::Pathmask, ListKind::Shell),
            ("EGDIR", BasicKind::Pathname, ListKind::None),
            ("JAVA_HOME", BasicKind::Pathname, ListKind::None),
            ("CONF_FILES", BasicKind::Pathmask, ListKind::Shell),
            ("SEARCH_PATH", BasicKind::Pathlist, ListKind::None),
            ("APACHE_USER", BasicKind::UserGroupName, ListKind::None),
            ("TEST_ENV", BasicKind::ShellWord, ListKind::Shell),
            ("FOO_CMD", BasicKind::ShellCommand, ListKind::None),
            ("FOO_CFLAGS", BasicKind::CFlag, ListKind::Shell),
            ("FOO_LDFLAGS", BasicKind::LdFlag, ListKind::Shell),
            ("PLIST.doc", BasicKind::Yes, ListKind::None),
        ];
        for (name, basic, list) in cases {
            let t = catalog.lookup(name).unwrap();
            assert!(t.is_guessed(), "{name}");
            assert_eq!((t.basic.clone(), t.list), (basic, list), "{name}");
        }
    }

    #[test]
    fn unknown_variable() {
        assert!(catalog().lookup("FOOBAR").is_none());
    }

    #[test]
    fn example_permissions_with_excluded_file() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register("VAR", BasicKind::Unchecked, ListKind::None, &["buildlink3.mk: none", "*: use"])
            .unwrap();
        let t = catalog.lookup("VAR").unwrap();
        assert_eq!(catalog.effective_permissions(&t, "Makefile"), PermissionSet::USE);
        assert!(catalog.effective_permissions(&t, "buildlink3.mk").is_empty());
        let alternatives = t.acl.alternatives(PermissionSet::USE);
        assert!(alternatives.contains(&"Makefile".to_string()));
        assert!(!alternatives.contains(&"buildlink3.mk".to_string()));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut catalog = TypeCatalog::new();
        for name in ["lowercase", "", "A-B", "A.B", "*"] {
            assert!(
                matches!(
                    catalog.register(name, BasicKind::Unchecked, ListKind::None, &["*: use"]),
                    Err(ConfigError::InvalidVariableName(_))
                ),
                "{name}"
            );
        }
        assert!(
            catalog
                .register("@", BasicKind::Unchecked, ListKind::None, &["*: use"])
                .is_ok()
        );
    }

    #[test]
    fn overlapping_globs_fail_registration() {
        let mut catalog = TypeCatalog::new();
        let err = catalog
            .register("VAR", BasicKind::Unchecked, ListKind::None, &["*: use", "Makefile: set"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnreachableGlob { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn unknown_type_in_config() {
        let config = Config::from_toml_str(
            r#"
            [[variables]]
            name = "X"
            type = "Frobnicator"
            acl = ["*: use"]
        "#,
        )
        .unwrap();
        assert!(matches!(
            TypeCatalog::from_config(&config),
            Err(ConfigError::UnknownType { .. })
        ));
    }

    #[test]
    fn empty_enumeration_in_config() {
        let config = Config::from_toml_str(
            r#"
            [[variables]]
            name = "X"
            type = "enum"
            acl = ["*: use"]
        "#,
        )
        .unwrap();
        assert!(matches!(
            TypeCatalog::from_config(&config),
            Err(ConfigError::EmptyEnumeration(_))
        ));
    }
}
