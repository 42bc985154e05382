use std::path::Path;

use log::debug;

use crate::app_config::error::ConfigurationError;
use crate::app_config::node::ConfigDocument;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    fn label(&self) -> String {
        self.extension().to_uppercase()
    }
}

/// Parse a configuration document from text.
pub fn parse_document(text: &str, format: ConfigFormat) -> Result<ConfigDocument, ConfigurationError> {
    let parse_error = |message: String| ConfigurationError::Parse {
        format: format.label(),
        message,
    };
    match format {
        ConfigFormat::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string())),
        #[cfg(feature = "yaml-config")]
        ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string())),
        #[cfg(feature = "toml-config")]
        ConfigFormat::Toml => toml::from_str(text).map_err(|e| parse_error(e.to_string())),
    }
}

/// Load a configuration document, picking the format from the extension.
pub fn load_document(path: &Path) -> Result<ConfigDocument, ConfigurationError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigurationError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document = parse_document(&text, format)?;
    debug!(
        "Loaded {} configuration(s) from '{}'",
        document.configs.len(),
        path.display()
    );
    Ok(document)
}

/// Async variant of [`load_document`] for callers already on the runtime.
pub async fn load_document_async(path: &Path) -> Result<ConfigDocument, ConfigurationError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigurationError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_document(&text, format)
}
