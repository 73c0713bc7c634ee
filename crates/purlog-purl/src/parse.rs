//! The [`PackageUrl`] type and its string form.

use std::fmt;

use crate::error::ParseError;

/// A parsed package URL.
///
/// Coordinates are stored percent-decoded. [`fmt::Display`] re-serializes
/// the canonical form (qualifiers sorted by key), so `parse` followed by
/// `to_string` is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUrl {
    /// Package ecosystem, lowercased (`pypi`, `deb`, `generic`, ...).
    pub ty: String,
    /// Optional namespace (`/`-separated segments, e.g. a Maven group id).
    pub namespace: Option<String>,
    /// Package name.
    pub name: String,
    /// Package version; absent for bare coordinates.
    pub version: Option<String>,
    /// Qualifier key/value pairs, in input order, keys lowercased.
    pub qualifiers: Vec<(String, String)>,
    /// Optional subpath within the package.
    pub subpath: Option<String>,
}

impl PackageUrl {
    /// Parse a pURL string.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let (scheme, rest) = match input.split_once(':') {
            Some((s, r)) => (s, r),
            None => {
                return Err(ParseError::Scheme {
                    found: String::new(),
                });
            }
        };
        if !scheme.eq_ignore_ascii_case("pkg") {
            return Err(ParseError::Scheme {
                found: scheme.to_string(),
            });
        }

        // Leading slashes after the scheme are tolerated (`pkg://type/...`).
        let rest = rest.trim_start_matches('/');

        let (rest, subpath_raw) = match rest.split_once('#') {
            Some((r, s)) => (r, Some(s)),
            None => (rest, None),
        };
        let (path, qualifiers_raw) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        // The version is everything after the last `@` in the path; literal
        // `@` inside coordinates must be percent-encoded.
        let (coords, version) = match path.rfind('@') {
            Some(i) => {
                let v = unescape(&path[i + 1..], "version")?;
                (&path[..i], if v.is_empty() { None } else { Some(v) })
            }
            None => (path, None),
        };

        let mut segments: Vec<&str> = coords.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return Err(ParseError::MissingTypeOrName);
        }
        let name = unescape(segments.pop().unwrap_or_default(), "name")?;
        let ty = segments.remove(0).to_ascii_lowercase();
        if name.is_empty() || ty.is_empty() {
            return Err(ParseError::MissingTypeOrName);
        }
        if !valid_type(&ty) {
            return Err(ParseError::InvalidType(ty));
        }

        let namespace = if segments.is_empty() {
            None
        } else {
            let decoded: Result<Vec<String>, ParseError> = segments
                .iter()
                .map(|s| unescape(s, "namespace"))
                .collect();
            Some(decoded?.join("/"))
        };

        let mut qualifiers = Vec::new();
        if let Some(raw) = qualifiers_raw {
            for pair in raw.split('&').filter(|p| !p.is_empty()) {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                // Qualifiers with empty values are treated as absent.
                if v.is_empty() {
                    continue;
                }
                qualifiers.push((k.to_ascii_lowercase(), unescape(v, "qualifier")?));
            }
        }

        let subpath = match subpath_raw {
            Some(s) => {
                let s = unescape(s.trim_matches('/'), "subpath")?;
                if s.is_empty() { None } else { Some(s) }
            }
            None => None,
        };

        Ok(Self {
            ty,
            namespace,
            name,
            version,
            qualifiers,
            subpath,
        })
    }

    /// Look up a qualifier value by (lowercase) key.
    pub fn qualifier(&self, key: &str) -> Option<&str> {
        self.qualifiers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The identity key: this pURL with qualifiers and subpath stripped.
    ///
    /// Two log entries with the same identity must carry the same digest.
    pub fn identity(&self) -> String {
        let stripped = Self {
            qualifiers: Vec::new(),
            subpath: None,
            ..self.clone()
        };
        stripped.to_string()
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}", self.ty)?;
        if let Some(ns) = &self.namespace {
            for seg in ns.split('/') {
                write!(f, "/{}", escape(seg, ""))?;
            }
        }
        write!(f, "/{}", escape(&self.name, ""))?;
        if let Some(v) = &self.version {
            write!(f, "@{}", escape(v, ":+"))?;
        }
        if !self.qualifiers.is_empty() {
            let mut sorted = self.qualifiers.clone();
            sorted.sort();
            for (i, (k, v)) in sorted.iter().enumerate() {
                let sep = if i == 0 { '?' } else { '&' };
                write!(f, "{sep}{k}={}", escape(v, ":+/"))?;
            }
        }
        if let Some(s) = &self.subpath {
            write!(f, "#{}", escape(s, "/"))?;
        }
        Ok(())
    }
}

/// Type coordinates are ASCII: a letter followed by letters, digits, `.`,
/// `+` or `-`.
fn valid_type(ty: &str) -> bool {
    let mut chars = ty.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
}

/// Decode `%XX` escapes. `component` names the coordinate for error context.
fn unescape(s: &str, component: &'static str) -> Result<String, ParseError> {
    if !s.contains('%') {
        return Ok(s.to_string());
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16));
            let lo = bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16));
            match (hi, lo) {
                (Some(h), Some(l)) => {
                    out.push(((h << 4) | l) as u8);
                    i += 3;
                }
                _ => return Err(ParseError::InvalidEscape(component)),
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ParseError::InvalidEscape(component))
}

/// Percent-encode everything outside the unreserved set plus `extra`.
fn escape(s: &str, extra: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        let c = b as char;
        if c.is_ascii_alphanumeric()
            || matches!(c, '-' | '.' | '_' | '~')
            || extra.contains(c)
        {
            out.push(c);
        } else {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_purl() {
        let p = PackageUrl::parse(
            "pkg:maven/org.apache/commons-io@2.11.0?checksum=sha256:abcd#src/main",
        )
        .unwrap();
        assert_eq!(p.ty, "maven");
        assert_eq!(p.namespace.as_deref(), Some("org.apache"));
        assert_eq!(p.name, "commons-io");
        assert_eq!(p.version.as_deref(), Some("2.11.0"));
        assert_eq!(p.qualifier("checksum"), Some("sha256:abcd"));
        assert_eq!(p.subpath.as_deref(), Some("src/main"));
    }

    #[test]
    fn test_parse_no_namespace() {
        let p = PackageUrl::parse("pkg:pypi/requests@2.31.0").unwrap();
        assert_eq!(p.ty, "pypi");
        assert_eq!(p.namespace, None);
        assert_eq!(p.name, "requests");
        assert_eq!(p.version.as_deref(), Some("2.31.0"));
    }

    #[test]
    fn test_parse_missing_scheme() {
        assert_eq!(
            PackageUrl::parse("invalid-purl"),
            Err(ParseError::Scheme {
                found: String::new()
            })
        );
        assert_eq!(
            PackageUrl::parse("invalid:generic/my-package@1.2.3"),
            Err(ParseError::Scheme {
                found: "invalid".to_string()
            })
        );
    }

    #[test]
    fn test_parse_missing_name() {
        assert_eq!(
            PackageUrl::parse("pkg:pypi"),
            Err(ParseError::MissingTypeOrName)
        );
    }

    #[test]
    fn test_parse_percent_encoding() {
        let p = PackageUrl::parse("pkg:npm/%40scope/pkg@1.0.0").unwrap();
        assert_eq!(p.namespace.as_deref(), Some("@scope"));
        assert_eq!(p.name, "pkg");

        assert!(matches!(
            PackageUrl::parse("pkg:npm/bad%2@1.0.0"),
            Err(ParseError::InvalidEscape(_))
        ));
    }

    #[test]
    fn test_type_lowercased() {
        let p = PackageUrl::parse("pkg:PyPI/foo@1.0").unwrap();
        assert_eq!(p.ty, "pypi");
    }

    #[test]
    fn test_display_round_trip() {
        let s = "pkg:pypi/foo@1.0?checksum=sha256:aa";
        let p = PackageUrl::parse(s).unwrap();
        assert_eq!(p.to_string(), s);
        assert_eq!(PackageUrl::parse(&p.to_string()).unwrap(), p);
    }

    #[test]
    fn test_identity_strips_qualifiers() {
        let p = PackageUrl::parse(
            "pkg:pypi/foo@1.0?checksum=sha256:3b9730808f265c6d174662668435c4cf1fc9ddcd369831a646fa84bff8594f0c",
        )
        .unwrap();
        assert_eq!(p.identity(), "pkg:pypi/foo@1.0");

        let with_ns = PackageUrl::parse("pkg:maven/org.apache/io@2.0?checksum=sha256:aa").unwrap();
        assert_eq!(with_ns.identity(), "pkg:maven/org.apache/io@2.0");
    }

    #[test]
    fn test_empty_qualifier_value_dropped() {
        let p = PackageUrl::parse("pkg:pypi/foo@1.0?checksum=").unwrap();
        assert!(p.qualifiers.is_empty());
    }
}
