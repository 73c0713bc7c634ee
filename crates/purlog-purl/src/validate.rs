//! Structural validation of log entries.

use crate::error::ValidationError;
use crate::parse::PackageUrl;

/// Verify that `purl` is a well-formed log entry of the expected type:
/// `pkg:{type}/{namespace}/{name}@{version}?checksum=sha256:{64-hex}`.
///
/// The `checksum` qualifier must be the only qualifier, its value must be
/// `sha256:` followed by 64 lowercase hex characters, and no subpath is
/// permitted.
pub fn verify_purl(purl: &str, expected_type: &str) -> Result<(), ValidationError> {
    let parsed = PackageUrl::parse(purl)?;

    if parsed.ty != expected_type {
        return Err(ValidationError::WrongType {
            expected: expected_type.to_string(),
            actual: parsed.ty,
        });
    }
    if parsed.version.is_none() {
        return Err(ValidationError::MissingVersion);
    }
    if parsed.qualifiers.len() != 1 {
        return Err(ValidationError::QualifiersNotExactlyChecksum);
    }
    let checksum = parsed
        .qualifier("checksum")
        .ok_or(ValidationError::MissingChecksum)?;

    let parts: Vec<&str> = checksum.split(':').collect();
    if parts.len() != 2 {
        return Err(ValidationError::ChecksumNotColonSplit);
    }
    if parts[0] != "sha256" {
        return Err(ValidationError::AlgorithmNotSha256);
    }
    let digest = parts[1];
    if digest.len() % 2 != 0 || !digest.chars().all(is_lower_hex) {
        return Err(ValidationError::ChecksumNotHex);
    }
    if digest.len() != 64 {
        return Err(ValidationError::ChecksumNotSha256Length);
    }
    if parsed.subpath.is_some() {
        return Err(ValidationError::SubpathPresent);
    }
    Ok(())
}

fn is_lower_hex(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_DIGEST: &str = "3b9730808f265c6d174662668435c4cf1fc9ddcd369831a646fa84bff8594f0c";

    fn entry(suffix: &str) -> String {
        format!("pkg:generic/my-package{suffix}")
    }

    #[test]
    fn test_valid_purl() {
        let s = entry(&format!("@1.2.3?checksum=sha256:{GOOD_DIGEST}"));
        assert_eq!(verify_purl(&s, "generic"), Ok(()));
    }

    #[test]
    fn test_unparseable() {
        let err = verify_purl("invalid-purl", "generic").unwrap_err();
        assert!(matches!(err, ValidationError::Unparseable(_)));
        assert!(err.to_string().contains("purl scheme is not \"pkg\": \"\""));
    }

    #[test]
    fn test_wrong_type() {
        let s = entry(&format!("@1.2.3?checksum=sha256:{GOOD_DIGEST}"));
        let err = verify_purl(&s, "deb").unwrap_err();
        assert_eq!(err.to_string(), "pURL type must be deb, was generic");
    }

    #[test]
    fn test_missing_version() {
        let s = entry(&format!("?checksum=sha256:{GOOD_DIGEST}"));
        assert_eq!(
            verify_purl(&s, "generic"),
            Err(ValidationError::MissingVersion)
        );
    }

    #[test]
    fn test_multiple_qualifiers() {
        let s = entry(&format!("@1.2.3?checksum=sha256:{GOOD_DIGEST}&other=value"));
        assert_eq!(
            verify_purl(&s, "generic"),
            Err(ValidationError::QualifiersNotExactlyChecksum)
        );
    }

    #[test]
    fn test_no_qualifiers() {
        assert_eq!(
            verify_purl(&entry("@1.2.3"), "generic"),
            Err(ValidationError::QualifiersNotExactlyChecksum)
        );
    }

    #[test]
    fn test_missing_checksum_qualifier() {
        assert_eq!(
            verify_purl(&entry("@1.2.3?other=value"), "generic"),
            Err(ValidationError::MissingChecksum)
        );
    }

    #[test]
    fn test_checksum_not_colon_split() {
        assert_eq!(
            verify_purl(&entry(&format!("@1.2.3?checksum={GOOD_DIGEST}")), "generic"),
            Err(ValidationError::ChecksumNotColonSplit)
        );
        // More than one colon is equally malformed.
        assert_eq!(
            verify_purl(
                &entry(&format!("@1.2.3?checksum=sha256:{GOOD_DIGEST}:x")),
                "generic"
            ),
            Err(ValidationError::ChecksumNotColonSplit)
        );
    }

    #[test]
    fn test_wrong_algorithm() {
        assert_eq!(
            verify_purl(
                &entry(&format!("@1.2.3?checksum=md5:{GOOD_DIGEST}")),
                "generic"
            ),
            Err(ValidationError::AlgorithmNotSha256)
        );
    }

    #[test]
    fn test_checksum_not_hex() {
        assert_eq!(
            verify_purl(&entry("@1.2.3?checksum=sha256:invalid-hex"), "generic"),
            Err(ValidationError::ChecksumNotHex)
        );
        // Uppercase hex is rejected: the entry format mandates lowercase.
        let upper = GOOD_DIGEST.to_uppercase();
        assert_eq!(
            verify_purl(&entry(&format!("@1.2.3?checksum=sha256:{upper}")), "generic"),
            Err(ValidationError::ChecksumNotHex)
        );
    }

    #[test]
    fn test_checksum_wrong_length() {
        assert_eq!(
            verify_purl(
                &entry("@1.2.3?checksum=sha256:bf6fe28541b2a62b2cd1c6ddf3dc534b83291ec9"),
                "generic"
            ),
            Err(ValidationError::ChecksumNotSha256Length)
        );
    }

    #[test]
    fn test_subpath_rejected() {
        assert_eq!(
            verify_purl(
                &entry(&format!("@1.2.3?checksum=sha256:{GOOD_DIGEST}#subpath")),
                "generic"
            ),
            Err(ValidationError::SubpathPresent)
        );
    }
}
