use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{ConfigError, ServiceConfig};
use crate::mounts::segments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yml" | "yaml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}

/// Parse one document. `origin` is only used in error messages.
pub fn parse_str(text: &str, format: ConfigFormat, origin: &Path) -> Result<ServiceConfig, ConfigError> {
    // an empty file is an empty document in every format
    if text.trim().is_empty() {
        return Ok(ServiceConfig::default());
    }
    let parse_error = |reason: String| ConfigError::Parse {
        path: origin.to_path_buf(),
        reason,
    };
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string())),
        ConfigFormat::Toml => toml::from_str(text).map_err(|e| parse_error(e.to_string())),
    }
}

fn parse_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let format =
        ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text, format, path)
}

/// Load a configuration file, or every configuration file in a directory
/// (in name order, hidden files skipped) merged into one document.
pub fn parse_configs(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(io_error)?;
    if !metadata.is_dir() {
        return parse_file(path);
    }

    let mut files = Vec::new();
    for dir_entry in std::fs::read_dir(path).map_err(io_error)? {
        let file = dir_entry.map_err(io_error)?.path();
        let hidden = file
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden || file.is_dir() {
            continue;
        }
        files.push(file);
    }
    files.sort();
    if files.is_empty() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let parsed = files
        .into_iter()
        .map(|file| parse_file(&file).map(|config| (file, config)))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(files = parsed.len(), dir = %path.display(), "merging configuration files");
    merge(parsed)
}

/// Directory that relative paths in a configuration resolve against.
pub fn base_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn take_once<T>(
    section: &'static str,
    merged: &mut Option<T>,
    incoming: Option<T>,
    file: &Path,
    owners: &mut HashMap<&'static str, PathBuf>,
) -> Result<(), ConfigError> {
    let Some(incoming) = incoming else {
        return Ok(());
    };
    if let Some(first) = owners.get(section) {
        return Err(ConfigError::DuplicateSection {
            section,
            first: first.clone(),
            second: file.to_path_buf(),
        });
    }
    owners.insert(section, file.to_path_buf());
    *merged = Some(incoming);
    Ok(())
}

/// Combine documents from several files.
///
/// Lists and maps are combined; `authentication`, `access_control`,
/// `object_cache` and `server` may each come from one file only, and a
/// tree path may be mounted by one file only.
pub fn merge(configs: Vec<(PathBuf, ServiceConfig)>) -> Result<ServiceConfig, ConfigError> {
    let mut merged = ServiceConfig::default();
    let mut owners = HashMap::new();
    let mut tree_paths: HashMap<Vec<String>, PathBuf> = HashMap::new();

    for (file, config) in configs {
        merged.allow_origins.extend(config.allow_origins);
        for (family, media_types) in config.media_types {
            merged.media_types.entry(family).or_default().extend(media_types);
        }
        merged.file_extensions.extend(config.file_extensions);

        take_once("authentication", &mut merged.authentication, config.authentication, &file, &mut owners)?;
        take_once("access_control", &mut merged.access_control, config.access_control, &file, &mut owners)?;
        take_once("object_cache", &mut merged.object_cache, config.object_cache, &file, &mut owners)?;
        take_once("server", &mut merged.server, config.server, &file, &mut owners)?;

        for tree in config.trees {
            let key = segments(&tree.path);
            if let Some(first) = tree_paths.get(&key) {
                return Err(ConfigError::DuplicatePath {
                    path: tree.path,
                    first: first.clone(),
                    second: file,
                });
            }
            tree_paths.insert(key, file.clone());
            merged.trees.push(tree);
        }
    }
    Ok(merged)
}
