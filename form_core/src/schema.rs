use crate::config::{FormSchema, SchemaError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Every form schema of the console, keyed by schema name
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, Arc<FormSchema>>,
}

impl SchemaCatalog {
    /// Load every `*.toml` file in `dir`, one schema per file.
    /// Each schema is checked before it is accepted.
    pub fn load_from_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut paths = Vec::new();
        for entry in Self::read_dir_with_context(dir)? {
            let entry = entry.map_err(|e| CatalogError::Io {
                source: e,
                path: Some(dir.to_path_buf()),
            })?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut catalog = SchemaCatalog::default();
        for path in paths {
            let content = Self::read_file_with_context(&path)?;
            let schema = FormSchema::from_toml_str(&content).map_err(|e| CatalogError::Parse {
                source: e,
                path: path.clone(),
            })?;
            schema.check().map_err(|e| CatalogError::Schema {
                source: e,
                path: path.clone(),
            })?;
            catalog.insert_from(schema, path)?;
        }

        debug!(dir = %dir.display(), schemas = catalog.len(), "schema catalog loaded");
        Ok(catalog)
    }

    fn insert_from(&mut self, schema: FormSchema, path: PathBuf) -> Result<(), CatalogError> {
        if self.schemas.contains_key(&schema.name) {
            return Err(CatalogError::Duplicate {
                name: schema.name,
                path,
            });
        }
        self.schemas.insert(schema.name.clone(), Arc::new(schema));
        Ok(())
    }

    fn read_dir_with_context(dir: &Path) -> Result<std::fs::ReadDir, CatalogError> {
        std::fs::read_dir(dir).map_err(|e| CatalogError::Io {
            source: e,
            path: Some(dir.to_path_buf()),
        })
    }

    fn read_file_with_context(path: &Path) -> Result<String, CatalogError> {
        std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            source: e,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<FormSchema>> {
        self.schemas.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormSchema> {
        self.schemas.values().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Schema loading errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error in '{}': {source}", display_path(.path))]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    #[error("Parse error in '{}': {source}", .path.display())]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("Invalid schema in '{}': {source}", .path.display())]
    Schema { source: SchemaError, path: PathBuf },
    #[error("Schema '{name}' in '{}' is already defined", .path.display())]
    Duplicate { name: String, path: PathBuf },
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map_or_else(|| "unknown location".to_string(), |p| p.display().to_string())
}

impl CatalogError {
    /// File the error came from, if known
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            CatalogError::Io { path, .. } => path.as_deref(),
            CatalogError::Parse { path, .. }
            | CatalogError::Schema { path, .. }
            | CatalogError::Duplicate { path, .. } => Some(path),
        }
    }

    /// File and, for parse errors, byte span, for display next to the message
    pub fn location_description(&self) -> String {
        match self {
            CatalogError::Io { path: None, .. } => "Unknown location".to_string(),
            CatalogError::Parse { source, path } => {
                let mut desc = format!("File: {}", path.display());
                if let Some(span) = source.span() {
                    desc.push_str(&format!("\nPosition: bytes {}..{}", span.start, span.end));
                }
                desc
            }
            other => match other.file_path() {
                Some(path) => format!("File: {}", path.display()),
                None => "Unknown location".to_string(),
            },
        }
    }

    /// The message without location details
    pub fn error_message(&self) -> String {
        match self {
            CatalogError::Io { source, .. } => source.to_string(),
            CatalogError::Parse { source, .. } => source.message().to_string(),
            CatalogError::Schema { source, .. } => source.to_string(),
            CatalogError::Duplicate { name, .. } => format!("schema '{}' is already defined", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const NEWSLETTERS: &str = r#"
name = "newsletters"
title = "Newsletters"

[[fields]]
name = "email"
label = "Email"
type = "email"
required = true
"#;

    #[test]
    fn test_loads_toml_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("newsletters.toml"), NEWSLETTERS).unwrap();
        fs::write(dir.path().join("README.md"), "not a schema").unwrap();

        let catalog = SchemaCatalog::load_from_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["newsletters"]);
        let schema = catalog.get("newsletters").unwrap();
        assert_eq!(schema.fields[0].label, "Email");
    }

    #[test]
    fn test_parse_error_carries_path_and_span() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "name = \"broken\"\n[[fields]\n").unwrap();

        let err = SchemaCatalog::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
        assert_eq!(err.file_path(), Some(path.as_path()));
        assert!(err.location_description().contains("Position: bytes"));
    }

    #[test]
    fn test_schema_fault_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blogs.toml");
        fs::write(
            &path,
            r#"
name = "blogs"

[[tabs]]
id = 1
label = "Features"
isDynamic = true
"#,
        )
        .unwrap();

        let err = SchemaCatalog::load_from_dir(dir.path()).unwrap_err();
        match err {
            CatalogError::Schema { source, .. } => {
                assert_eq!(source, SchemaError::MissingDynamicConfig { tab: 1 })
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), NEWSLETTERS).unwrap();
        fs::write(dir.path().join("b.toml"), NEWSLETTERS).unwrap();
        let err = SchemaCatalog::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { ref name, .. } if name == "newsletters"));
    }

    #[test]
    fn test_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = SchemaCatalog::load_from_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { path: Some(_), .. }));
    }
}
