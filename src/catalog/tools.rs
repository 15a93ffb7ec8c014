//! Known tool commands such as `sed` (`${SED}`) or `echo` (`${ECHO}`).

use std::collections::HashMap;

use crate::config::ToolConfig;

/// A shell utility that the build infrastructure provides by variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    /// Plain command name, e.g. `sed`.
    pub name: String,
    /// Variable holding the command, e.g. `SED`.
    pub varname: String,
    /// Whether `${VARNAME}` may already be evaluated at load time.
    pub load_time: bool,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    by_varname: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn from_config(tools: &[ToolConfig]) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.define(Tool {
                name: tool.name.clone(),
                varname: tool.varname.clone(),
                load_time: tool.load_time,
            });
        }
        registry
    }

    /// Add a tool. A later definition for the same variable replaces the
    /// earlier one.
    pub fn define(&mut self, tool: Tool) {
        self.by_varname.insert(tool.varname.clone(), tool);
    }

    pub fn by_varname(&self, varname: &str) -> Option<&Tool> {
        self.by_varname.get(varname)
    }

    pub fn len(&self) -> usize {
        self.by_varname.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_varname.is_empty()
    }
}
