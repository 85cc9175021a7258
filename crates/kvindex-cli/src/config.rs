use crate::error::CliError;
use kvindex_core::{
    binding::{Schema, SchemaRegistry},
    config::{ConfigError, EngineConfig},
};
use serde::Deserialize;
use std::path::Path;

///
/// CliConfig
///
/// `[engine]` holds `EngineConfig`; each `[[schemas]]` entry declares one
/// record type. Without schemas the built-in `Person` schema is used.
///

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub schemas: Vec<Schema>,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, CliError> {
        let config: Self = toml::from_str(source).map_err(ConfigError::from)?;
        config.engine.validate()?;

        Ok(config)
    }

    pub fn registry(&self) -> SchemaRegistry {
        if self.schemas.is_empty() {
            SchemaRegistry::new([Schema::person()])
        } else {
            SchemaRegistry::new(self.schemas.iter().cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvindex_core::binding::FieldKind;

    #[test]
    fn defaults_to_person_schema() {
        let config = CliConfig::from_toml_str("").expect("parse");

        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.registry().contains("Person"));
    }

    #[test]
    fn declared_schemas_replace_the_default() {
        let config = CliConfig::from_toml_str(
            r#"
            [engine]
            index_prefix = "idx"

            [[schemas]]
            name = "Pet"
            fields = [
                { name = "name", kind = "text" },
                { name = "age", kind = "int" },
            ]
            "#,
        )
        .expect("parse");

        let registry = config.registry();
        assert!(!registry.contains("Person"));
        let pet = registry.get("Pet").expect("pet");
        assert_eq!(pet.field("age").map(|f| f.kind), Some(FieldKind::Int));
        assert_eq!(config.engine.index_prefix, "idx");
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        let err = CliConfig::from_toml_str(
            r#"
            [engine]
            index_prefix = "same"
            metadata_prefix = "same"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, CliError::Config(ConfigError::Invalid(_))));
    }
}
