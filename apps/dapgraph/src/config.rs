//! # Configuration
//!
//! Optional TOML file layered over the built-in debugger schema:
//!
//! ```toml
//! roles = ["session", "thread", "frame"]
//!
//! [view]
//! default_limit = 20
//!
//! [collections]
//! procs = "session"
//!
//! [relations.watches]
//! edge = "watch"
//! direction = "in"
//! kind = "variable"
//! ```
//!
//! Top-level keys such as `roles` must come before the first table header.
//!
//! The path comes from `--config`, else `DAPGRAPH_CONFIG`; with neither the
//! defaults apply.

use dapgraph_core::primitives::DEFAULT_VIEW_LIMIT;
use dapgraph_core::{GraphError, Relation, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DAPGRAPH_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub default_limit: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_VIEW_LIMIT,
        }
    }
}

/// Inspector configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub view: ViewConfig,
    /// Extra collection aliases.
    pub collections: BTreeMap<String, String>,
    /// Extra or replacement relations.
    pub relations: BTreeMap<String, Relation>,
    /// Focus role hierarchy override, outermost first.
    pub roles: Option<Vec<String>>,
}

impl AppConfig {
    /// Load from `explicit`, else from `$DAPGRAPH_CONFIG`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, GraphError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            GraphError::IoError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&contents).map_err(|e| match e {
            GraphError::DeserializationError(reason) => {
                GraphError::DeserializationError(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, GraphError> {
        toml::from_str(contents).map_err(|e| GraphError::DeserializationError(e.to_string()))
    }

    /// The default schema with this config's overrides applied.
    pub fn schema(&self) -> Schema {
        let mut schema = Schema::default();
        for (alias, kind) in &self.collections {
            schema = schema.with_collection(alias.as_str(), kind.as_str());
        }
        for (name, relation) in &self.relations {
            schema = schema.with_relation(name.as_str(), relation.clone());
        }
        if let Some(roles) = &self.roles {
            schema.roles = roles.clone();
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapgraph_core::Direction;

    #[test]
    fn empty_file_is_default() {
        let config = AppConfig::from_toml("").expect("parse");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.view.default_limit, DEFAULT_VIEW_LIMIT);
        assert_eq!(config.schema(), Schema::default());
    }

    #[test]
    fn overrides_reach_the_schema() {
        let config = AppConfig::from_toml(
            r#"
            roles = ["session", "thread"]

            [view]
            default_limit = 5

            [collections]
            procs = "session"

            [relations.watches]
            edge = "watch"
            direction = "in"
            kind = "variable"
            "#,
        )
        .expect("parse");

        assert_eq!(config.view.default_limit, 5);
        let schema = config.schema();
        assert_eq!(schema.collection_kind("procs"), "session");
        assert_eq!(schema.roles, vec!["session".to_string(), "thread".to_string()]);
        let watches = schema.relation("watches").expect("relation");
        assert_eq!(watches.direction, Direction::In);
        assert!(!watches.transitive);
        assert!(schema.relation("threads").is_some());
    }

    #[test]
    fn keys_after_a_relation_table_are_rejected() {
        let misplaced = r#"
            [relations.watches]
            edge = "watch"
            direction = "in"

            roles = ["session", "thread"]
            "#;
        assert!(matches!(
            AppConfig::from_toml(misplaced),
            Err(GraphError::DeserializationError(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            AppConfig::from_toml("colour = true"),
            Err(GraphError::DeserializationError(_))
        ));
    }
}
