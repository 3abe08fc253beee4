//! Filename transcoding between the kernel-facing and storage-facing encodings.
//!
//! Each side is described by a charset and a Unicode normalization form. A
//! name travelling from the kernel to the storage is decoded with the kernel
//! charset, normalized to the storage form and encoded with the storage
//! charset; names read back from the storage take the reverse route.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use unicode_normalization::{is_nfc, is_nfd, is_nfkc, is_nfkd, UnicodeNormalization};

use crate::config::{AdapterConfig, NormalizationForm};
use crate::error::{MirrorFsError, Result};

#[derive(Debug, Clone, Copy)]
struct Side {
    charset: &'static Encoding,
    form: NormalizationForm,
}

#[derive(Debug, Clone, Copy)]
pub struct NameCodec {
    kernel: Side,
    storage: Side,
}

impl NameCodec {
    pub fn new(
        kernel_charset: &str,
        kernel_form: NormalizationForm,
        storage_charset: &str,
        storage_form: NormalizationForm,
    ) -> Result<Self> {
        Ok(NameCodec {
            kernel: Side {
                charset: lookup_charset(kernel_charset)?,
                form: kernel_form,
            },
            storage: Side {
                charset: lookup_charset(storage_charset)?,
                form: storage_form,
            },
        })
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        Self::new(
            &config.get_kernel_charset(),
            config.get_kernel_normalization(),
            &config.get_storage_charset(),
            config.get_storage_normalization(),
        )
    }

    /// UTF-8 on both sides with no normalization.
    pub fn passthrough() -> Self {
        let side = Side {
            charset: UTF_8,
            form: NormalizationForm::None,
        };
        NameCodec {
            kernel: side,
            storage: side,
        }
    }

    /// Kernel-facing name to storage-facing name.
    pub fn encode(&self, kernel_name: &OsStr) -> OsString {
        transcode(kernel_name, self.kernel, self.storage)
    }

    /// Storage-facing name to kernel-facing name.
    pub fn decode(&self, storage_name: &OsStr) -> OsString {
        transcode(storage_name, self.storage, self.kernel)
    }
}

fn lookup_charset(label: &str) -> Result<&'static Encoding> {
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| MirrorFsError::Config(format!("Unknown charset '{}'", label)))?;
    if !encoding.is_ascii_compatible() {
        return Err(MirrorFsError::Config(format!(
            "Charset '{}' is not ASCII-compatible",
            label
        )));
    }
    Ok(encoding)
}

fn transcode(input: &OsStr, from: Side, to: Side) -> OsString {
    let (decoded, had_errors) = from.charset.decode_without_bom_handling(input.as_bytes());
    if had_errors {
        tracing::debug!(
            "Name {:?} is not valid {}, substituting replacement characters",
            input,
            from.charset.name()
        );
    }

    let normalized = normalize(decoded, to.form);

    if to.charset == UTF_8 {
        return OsString::from(normalized.into_owned());
    }

    let (encoded, _, unmappable) = to.charset.encode(&normalized);
    if unmappable {
        tracing::debug!(
            "Name {:?} has characters outside {}",
            normalized,
            to.charset.name()
        );
    }
    OsString::from_vec(encoded.into_owned())
}

fn normalize(name: Cow<'_, str>, form: NormalizationForm) -> Cow<'_, str> {
    match form {
        NormalizationForm::None => name,
        NormalizationForm::Nfc if is_nfc(&name) => name,
        NormalizationForm::Nfd if is_nfd(&name) => name,
        NormalizationForm::Nfkc if is_nfkc(&name) => name,
        NormalizationForm::Nfkd if is_nfkd(&name) => name,
        NormalizationForm::Nfc => Cow::Owned(name.nfc().collect()),
        NormalizationForm::Nfd => Cow::Owned(name.nfd().collect()),
        NormalizationForm::Nfkc => Cow::Owned(name.nfkc().collect()),
        NormalizationForm::Nfkd => Cow::Owned(name.nfkd().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const COMPOSED: &str = "caf\u{e9}";
    const DECOMPOSED: &str = "cafe\u{301}";

    fn nfc_kernel_nfd_storage() -> NameCodec {
        NameCodec::new(
            "utf-8",
            NormalizationForm::Nfc,
            "utf-8",
            NormalizationForm::Nfd,
        )
        .unwrap()
    }

    #[test]
    fn test_encode_applies_storage_form() {
        let codec = nfc_kernel_nfd_storage();
        assert_eq!(codec.encode(OsStr::new(COMPOSED)), OsString::from(DECOMPOSED));
        assert_eq!(codec.decode(OsStr::new(DECOMPOSED)), OsString::from(COMPOSED));
    }

    #[test]
    fn test_passthrough_leaves_names_alone() {
        let codec = NameCodec::passthrough();
        assert_eq!(codec.encode(OsStr::new(DECOMPOSED)), OsString::from(DECOMPOSED));
        assert_eq!(codec.decode(OsStr::new(COMPOSED)), OsString::from(COMPOSED));
    }

    #[test]
    fn test_ascii_is_untouched() {
        let codec = nfc_kernel_nfd_storage();
        assert_eq!(
            codec.encode(OsStr::new("../some/link-target.txt")),
            OsString::from("../some/link-target.txt")
        );
    }

    #[test]
    fn test_storage_charset_changes_bytes() {
        let codec = NameCodec::new(
            "utf-8",
            NormalizationForm::Nfc,
            "iso-8859-1",
            NormalizationForm::Nfc,
        )
        .unwrap();

        let stored = codec.encode(OsStr::new(COMPOSED));
        assert_eq!(stored.as_bytes(), b"caf\xe9");
        assert_eq!(codec.decode(&stored), OsString::from(COMPOSED));
    }

    #[test]
    fn test_invalid_kernel_bytes_become_replacement() {
        let codec = NameCodec::passthrough();
        let raw = OsStr::from_bytes(b"bad\xffname");
        assert_eq!(codec.encode(raw), OsString::from("bad\u{fffd}name"));
    }

    #[test]
    fn test_unknown_charset_rejected() {
        assert!(NameCodec::new(
            "no-such-charset",
            NormalizationForm::Nfc,
            "utf-8",
            NormalizationForm::Nfc
        )
        .is_err());
    }

    #[rstest]
    #[case("\u{4e2d}\u{6587}\u{6587}\u{4ef6}.txt")]
    #[case("\u{1f600} smile")]
    #[case("Gr\u{fc}\u{df}e")]
    #[case("plain.txt")]
    fn test_unicode_family_round_trip(#[case] name: &str) {
        let codec = NameCodec::new(
            "utf-8",
            NormalizationForm::Nfc,
            "gb18030",
            NormalizationForm::Nfc,
        )
        .unwrap();

        let stored = codec.encode(OsStr::new(name));
        assert_eq!(codec.decode(&stored), OsString::from(name));
    }

    proptest! {
        #[test]
        fn prop_round_trip_at_kernel_form(raw in "\\PC{1,24}") {
            let name: String = raw.nfc().collect();
            let codec = nfc_kernel_nfd_storage();
            let back = codec.decode(&codec.encode(OsStr::new(&name)));
            prop_assert_eq!(back, OsString::from(name));
        }
    }
}
