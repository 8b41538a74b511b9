//! Schema discovery on disk.

use std::path::{Path, PathBuf};

use super::compile::{CompiledSchema, compile};
use super::error::SchemaError;
use super::types::SchemaDocument;

/// Compile a schema from YAML text.
pub fn parse_str(name: &str, yaml: &str) -> Result<CompiledSchema, SchemaError> {
    let doc: SchemaDocument = serde_yaml::from_str(yaml).map_err(|source| SchemaError::Parse {
        source_name: name.to_string(),
        source,
    })?;
    compile(name, doc)
}

/// Load one schema file. The schema is named after the file stem.
pub fn load_file(path: &Path) -> Result<CompiledSchema, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_str(&name, &content)
}

/// Load every `*.yaml`/`*.yml` schema below `dir`, recursively.
///
/// Invalid documents are logged and skipped. Only an unreadable directory is
/// an error.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<CompiledSchema>, SchemaError> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut schemas = Vec::with_capacity(files.len());
    for path in files {
        tracing::debug!(path = %path.display(), "Loading schema");
        match load_file(&path) {
            Ok(schema) => {
                tracing::info!(
                    schema = %schema.name,
                    resource_path = %schema.resource_path,
                    metrics = schema.metrics.len(),
                    "Schema loaded"
                );
                schemas.push(schema);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Skipping invalid schema");
            }
        }
    }
    Ok(schemas)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), SchemaError> {
    let io_err = |source| SchemaError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if path.is_file() && (ext == "yaml" || ext == "yml") {
            files.push(path);
        }
    }
    Ok(())
}
