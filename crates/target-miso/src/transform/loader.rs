//! Template folder loading
//!
//! Every `<stream>.expr` file becomes an expression transformer and every
//! `<stream>.jinja` file a text transformer for `<stream>`. When both exist
//! for a stream, the `.jinja` template wins. `.jsonnet` templates are not
//! evaluated; one without a replacement for its stream fails the load.

use crate::error::{Result, TargetError};
use crate::transform::{
    shared_environment, ExpressionTransformer, TextTemplateTransformer, TransformerRegistry,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Extension of expression templates
pub const EXPRESSION_EXTENSION: &str = "expr";

/// Extension of text templates
pub const TEXT_EXTENSION: &str = "jinja";

/// Extension of jsonnet templates, which are recognized but not evaluated
pub const JSONNET_EXTENSION: &str = "jsonnet";

/// Build a registry from the templates in `folder`
pub fn load_templates(folder: &Path) -> Result<TransformerRegistry> {
    if !folder.is_dir() {
        return Err(TargetError::config(format!(
            "Template folder '{}' does not exist or is not a directory",
            folder.display()
        )));
    }

    let env = shared_environment(Some(folder));
    let mut registry = TransformerRegistry::new();

    for path in templates_with_extension(folder, EXPRESSION_EXTENSION)? {
        let Some(stream) = stream_name(&path) else {
            continue;
        };
        let source = fs::read_to_string(&path)?;
        let transformer = ExpressionTransformer::new(env, source)
            .map_err(|e| TargetError::template(path.display().to_string(), e))?;
        debug!(stream = %stream, path = %path.display(), "Loaded expression template");
        registry.register(stream, Box::new(transformer));
    }

    for path in templates_with_extension(folder, TEXT_EXTENSION)? {
        let (Some(stream), Some(name)) = (stream_name(&path), file_name(&path)) else {
            continue;
        };
        let transformer = TextTemplateTransformer::new(env, name)
            .map_err(|e| TargetError::template(path.display().to_string(), e))?;
        debug!(stream = %stream, path = %path.display(), "Loaded text template");
        registry.register(stream, Box::new(transformer));
    }

    for path in templates_with_extension(folder, JSONNET_EXTENSION)? {
        let Some(stream) = stream_name(&path) else {
            continue;
        };
        if registry.contains(&stream) {
            warn!(
                stream = %stream,
                path = %path.display(),
                "Ignoring jsonnet template, stream has an .expr or .jinja template"
            );
            continue;
        }
        error!(stream = %stream, path = %path.display(), "Jsonnet templates are not supported");
        return Err(TargetError::template(
            path.display().to_string(),
            format!(
                "jsonnet templates are not supported; rewrite it as {}.{} or {}.{}",
                stream, EXPRESSION_EXTENSION, stream, TEXT_EXTENSION
            ),
        ));
    }

    info!(
        folder = %folder.display(),
        streams = ?registry.streams(),
        "Loaded templates"
    );

    Ok(registry)
}

fn templates_with_extension(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn stream_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}
