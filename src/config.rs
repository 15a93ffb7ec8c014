use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    /// Named ACL entry lists that variables refer to by `profile`.
    #[serde(default)]
    pub profiles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// The package uses GNU configure, so `*FLAGS` need `:M*:Q`.
    #[serde(default)]
    pub gnu_configure: bool,
    #[serde(default = "default_true")]
    pub warn_quoting: bool,
    #[serde(default = "default_true")]
    pub warn_permissions: bool,
    /// Report variables whose type is neither declared nor guessable.
    #[serde(default)]
    pub warn_extra: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gnu_configure: false,
            warn_quoting: true,
            warn_permissions: true,
            warn_extra: false,
            log_level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolConfig {
    pub name: String,
    pub varname: String,
    /// The tool's variable may be evaluated at load time.
    #[serde(default)]
    pub load_time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VariableConfig {
    /// `NAME`, `NAME*` (also `NAME.*`) or `NAME.*`.
    pub name: String,
    /// Basic type name, or `enum` together with `values`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// `none`, `space` or `shell`.
    #[serde(default = "default_list")]
    pub list: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<String>,
}

fn default_list() -> String {
    "none".into()
}

impl VariableConfig {
    /// The ACL entries of this variable, resolving `profile` references.
    pub fn acl_entries<'a>(
        &'a self,
        profiles: &'a BTreeMap<String, Vec<String>>,
    ) -> Result<&'a [String], ConfigError> {
        match (&self.profile, self.acl.is_empty()) {
            (Some(profile), true) => profiles
                .get(profile)
                .map(Vec::as_slice)
                .ok_or_else(|| ConfigError::UnknownProfile {
                    varname: self.name.clone(),
                    profile: profile.clone(),
                }),
            (None, false) => Ok(&self.acl),
            _ => Err(ConfigError::AmbiguousAcl(self.name.clone())),
        }
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    profiles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    tools: ToolsOverlay,
    #[serde(default)]
    variables: VariablesOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsOverlay {
    gnu_configure: Option<bool>,
    warn_quoting: Option<bool>,
    warn_permissions: Option<bool>,
    warn_extra: Option<bool>,
    log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ToolsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    add: Vec<ToolConfig>,
    /// Variable names of tools to drop.
    #[serde(default)]
    remove: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct VariablesOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    add: Vec<VariableConfig>,
    /// Name patterns of variables to drop.
    #[serde(default)]
    remove: Vec<String>,
}

// ── Merge logic ──

/// Merge user entries into a default list, keyed by `key`.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove keys first, then add entries; an added entry
/// replaces a default entry with the same key.
fn merge_keyed<T>(
    base: &mut Vec<T>,
    add: Vec<T>,
    remove: &[String],
    replace: bool,
    key: impl Fn(&T) -> &str,
) {
    if replace {
        *base = add;
        return;
    }
    base.retain(|item| !remove.iter().any(|r| r == key(item)));
    for item in add {
        match base.iter().position(|b| key(b) == key(&item)) {
            Some(i) => base[i] = item,
            None => base.push(item),
        }
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Parse a complete configuration, without merging it with the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/mkvet/config.toml (if exists)
    ///
    /// Tools and variables merge by name; profiles and scalars override.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    fn load_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(".config/mkvet/config.toml");
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                log::warn!("ignoring {}: {e}", path.display());
                None
            }
        }
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let s = overlay.settings;
        if let Some(v) = s.gnu_configure {
            self.settings.gnu_configure = v;
        }
        if let Some(v) = s.warn_quoting {
            self.settings.warn_quoting = v;
        }
        if let Some(v) = s.warn_permissions {
            self.settings.warn_permissions = v;
        }
        if let Some(v) = s.warn_extra {
            self.settings.warn_extra = v;
        }
        if let Some(v) = s.log_level {
            self.settings.log_level = v;
        }

        self.profiles.extend(overlay.profiles);

        let t = overlay.tools;
        merge_keyed(&mut self.tools, t.add, &t.remove, t.replace, |tool| {
            tool.varname.as_str()
        });

        let v = overlay.variables;
        merge_keyed(&mut self.variables, v.add, &v.remove, v.replace, |var| {
            var.name.as_str()
        });
    }

    /// Apply an overlay from a TOML string. Used for testing.
    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable<'a>(config: &'a Config, name: &str) -> Option<&'a VariableConfig> {
        config.variables.iter().find(|v| v.name == name)
    }

    #[test]
    fn default_config_parses() {
        let config = Config::default_config();
        assert!(!config.profiles.is_empty());
        assert!(!config.tools.is_empty());
        assert!(!config.variables.is_empty());
    }

    #[test]
    fn every_default_profile_is_used() {
        let config = Config::default_config();
        for profile in config.profiles.keys() {
            assert!(
                config
                    .variables
                    .iter()
                    .any(|v| v.profile.as_deref() == Some(profile.as_str())),
                "profile {profile} is not used by any variable"
            );
        }
    }

    #[test]
    fn default_config_has_expected_entries() {
        let config = Config::default_config();
        assert!(variable(&config, "PKGNAME").is_some());
        assert!(variable(&config, "CFLAGS*").is_some());
        assert!(config.tools.iter().any(|t| t.varname == "SED"));
    }

    #[test]
    fn default_settings() {
        let config = Config::default_config();
        assert!(!config.settings.gnu_configure);
        assert!(config.settings.warn_quoting);
        assert!(config.settings.warn_permissions);
    }

    #[test]
    fn every_default_variable_resolves_its_acl() {
        let config = Config::default_config();
        for var in &config.variables {
            assert!(
                var.acl_entries(&config.profiles).is_ok(),
                "variable {}",
                var.name
            );
        }
    }

    #[test]
    fn unknown_profile_is_reported() {
        let var = VariableConfig {
            name: "X".into(),
            kind: "Identifier".into(),
            values: vec![],
            list: "none".into(),
            profile: Some("nope".into()),
            acl: vec![],
        };
        assert!(matches!(
            var.acl_entries(&BTreeMap::new()),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn profile_and_acl_together_are_ambiguous() {
        let var = VariableConfig {
            name: "X".into(),
            kind: "Identifier".into(),
            values: vec![],
            list: "none".into(),
            profile: Some("pkg".into()),
            acl: vec!["*: use".into()],
        };
        let config = Config::default_config();
        assert!(matches!(
            var.acl_entries(&config.profiles),
            Err(ConfigError::AmbiguousAcl(_))
        ));
    }

    // ── Merge semantics ──

    #[test]
    fn overlay_sets_scalar() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [settings]
            gnu_configure = true
        "#,
        );
        assert!(config.settings.gnu_configure);
        // Untouched settings keep their defaults
        assert!(config.settings.warn_quoting);
    }

    #[test]
    fn overlay_adds_variable() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [[variables.add]]
            name = "MY_DIR"
            type = "Pathname"
            profile = "pkg"
        "#,
        );
        assert!(variable(&config, "MY_DIR").is_some());
        assert!(variable(&config, "PKGNAME").is_some());
    }

    #[test]
    fn overlay_replaces_variable_with_same_name() {
        let mut config = Config::default_config();
        let before = config.variables.len();
        config.apply_overlay_str(
            r#"
            [[variables.add]]
            name = "PKGNAME"
            type = "Unchecked"
            profile = "sys"
        "#,
        );
        assert_eq!(config.variables.len(), before);
        assert_eq!(variable(&config, "PKGNAME").unwrap().kind, "Unchecked");
    }

    #[test]
    fn overlay_removes_tool() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [tools]
            remove = ["SED"]
        "#,
        );
        assert!(!config.tools.iter().any(|t| t.varname == "SED"));
        assert!(config.tools.iter().any(|t| t.varname == "AWK"));
    }

    #[test]
    fn overlay_replace_tools() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [tools]
            replace = true

            [[tools.add]]
            name = "xz"
            varname = "XZ"
        "#,
        );
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.tools[0].varname, "XZ");
        assert!(!config.tools[0].load_time);
    }

    #[test]
    fn overlay_overrides_profile() {
        let mut config = Config::default_config();
        config.apply_overlay_str(
            r#"
            [profiles]
            sys = ["*: use"]
        "#,
        );
        assert_eq!(config.profiles["sys"], vec!["*: use"]);
        assert!(config.profiles.contains_key("pkg"));
    }

    #[test]
    fn empty_overlay_changes_nothing() {
        let original = Config::default_config();
        let mut config = Config::default_config();
        config.apply_overlay_str("");
        assert_eq!(config.variables, original.variables);
        assert_eq!(config.tools, original.tools);
    }

    #[test]
    fn from_toml_str_reports_parse_errors() {
        assert!(matches!(
            Config::from_toml_str("variables = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
