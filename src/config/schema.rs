use crate::error::{MirrorFsError, Result};
use serde::{Deserialize, Serialize};

/// Host platform the adapter emulates. Injected through the config so that
/// platform-gated behavior never depends on ambient global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::host()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationForm {
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
    /// Leave names exactly as decoded.
    None,
}

impl std::str::FromStr for NormalizationForm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nfc" => Ok(NormalizationForm::Nfc),
            "nfd" => Ok(NormalizationForm::Nfd),
            "nfkc" => Ok(NormalizationForm::Nfkc),
            "nfkd" => Ok(NormalizationForm::Nfkd),
            "none" => Ok(NormalizationForm::None),
            _ => Err(format!(
                "Invalid normalization form '{}'. Must be one of: nfc, nfd, nfkc, nfkd, none",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdapterConfig {
    #[serde(default)]
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_normalization: Option<NormalizationForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_normalization: Option<NormalizationForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_name_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_patterns: Option<Vec<String>>,
    /// Whether the storage exposes POSIX permission bits. When false, each
    /// node kind reports fixed default permissions instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posix_permissions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Attribute and entry cache timeout handed to the kernel by the FUSE bridge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl AdapterConfig {
    pub fn for_platform(platform: Platform) -> Self {
        AdapterConfig {
            platform,
            ..Default::default()
        }
    }

    pub fn get_kernel_charset(&self) -> String {
        self.kernel_charset
            .clone()
            .unwrap_or_else(super::default_charset)
    }

    pub fn get_storage_charset(&self) -> String {
        self.storage_charset
            .clone()
            .unwrap_or_else(super::default_charset)
    }

    pub fn get_kernel_normalization(&self) -> NormalizationForm {
        self.kernel_normalization
            .unwrap_or_else(|| super::default_kernel_normalization(self.platform))
    }

    pub fn get_storage_normalization(&self) -> NormalizationForm {
        self.storage_normalization
            .unwrap_or_else(super::default_storage_normalization)
    }

    pub fn get_max_file_name_length(&self) -> u32 {
        self.max_file_name_length
            .unwrap_or_else(super::default_max_file_name_length)
    }

    pub fn get_sidecar_patterns(&self) -> Vec<String> {
        self.sidecar_patterns
            .clone()
            .unwrap_or_else(|| super::default_sidecar_patterns(self.platform))
    }

    pub fn get_posix_permissions(&self) -> bool {
        self.posix_permissions
            .unwrap_or_else(super::default_posix_permissions)
    }

    pub fn get_uid(&self) -> u32 {
        self.uid
            .unwrap_or_else(|| nix::unistd::getuid().as_raw())
    }

    pub fn get_gid(&self) -> u32 {
        self.gid
            .unwrap_or_else(|| nix::unistd::getgid().as_raw())
    }

    pub fn get_ttl_secs(&self) -> u64 {
        self.ttl_secs.unwrap_or_else(super::default_ttl_secs)
    }
}

pub fn validate_config(config: &AdapterConfig) -> Result<()> {
    for label in [config.get_kernel_charset(), config.get_storage_charset()] {
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| MirrorFsError::Config(format!("Unknown charset '{}'", label)))?;
        if !encoding.is_ascii_compatible() {
            return Err(MirrorFsError::Config(format!(
                "Charset '{}' is not ASCII-compatible; path separators would not survive transcoding",
                label
            )));
        }
    }

    for pattern in config.get_sidecar_patterns() {
        glob::Pattern::new(&pattern).map_err(|e| {
            MirrorFsError::Config(format!(
                "Invalid sidecar glob pattern '{}': {}",
                pattern, e
            ))
        })?;
    }

    if config.get_max_file_name_length() == 0 {
        return Err(MirrorFsError::Config(
            "max_file_name_length must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_gated_defaults() {
        let mac = AdapterConfig::for_platform(Platform::MacOs);
        assert_eq!(mac.get_kernel_normalization(), NormalizationForm::Nfd);
        assert_eq!(mac.get_sidecar_patterns(), vec![".DS_Store", "._*"]);

        let linux = AdapterConfig::for_platform(Platform::Linux);
        assert_eq!(linux.get_kernel_normalization(), NormalizationForm::Nfc);
        assert!(linux.get_sidecar_patterns().is_empty());
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let config = AdapterConfig {
            platform: Platform::MacOs,
            kernel_normalization: Some(NormalizationForm::Nfc),
            sidecar_patterns: Some(vec!["Thumbs.db".to_string()]),
            max_file_name_length: Some(220),
            ..Default::default()
        };
        assert_eq!(config.get_kernel_normalization(), NormalizationForm::Nfc);
        assert_eq!(config.get_sidecar_patterns(), vec!["Thumbs.db"]);
        assert_eq!(config.get_max_file_name_length(), 220);
    }

    #[test]
    fn test_validate_rejects_unknown_charset() {
        let config = AdapterConfig {
            storage_charset: Some("klingon".to_string()),
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown charset"));
    }

    #[test]
    fn test_validate_rejects_utf16() {
        let config = AdapterConfig {
            kernel_charset: Some("utf-16le".to_string()),
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("not ASCII-compatible"));
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config = AdapterConfig {
            sidecar_patterns: Some(vec!["[unclosed".to_string()]),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_normalization_form_from_str() {
        assert_eq!(
            "NFD".parse::<NormalizationForm>().unwrap(),
            NormalizationForm::Nfd
        );
        assert!("nfx".parse::<NormalizationForm>().is_err());
    }
}
