pub mod persistence;
pub mod schema;

pub use persistence::*;
pub use schema::*;

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_kernel_normalization(platform: Platform) -> NormalizationForm {
    // macFUSE hands names to userspace in decomposed form
    match platform {
        Platform::MacOs => NormalizationForm::Nfd,
        Platform::Linux | Platform::Windows => NormalizationForm::Nfc,
    }
}

fn default_storage_normalization() -> NormalizationForm {
    NormalizationForm::Nfc
}

fn default_max_file_name_length() -> u32 {
    255
}

fn default_sidecar_patterns(platform: Platform) -> Vec<String> {
    match platform {
        Platform::MacOs => vec![".DS_Store".to_string(), "._*".to_string()],
        Platform::Linux | Platform::Windows => vec![],
    }
}

fn default_posix_permissions() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    1
}
