//! Package-URL (pURL) parsing and structural validation.
//!
//! A pURL identifies a software package by ecosystem and coordinates:
//! `pkg:{type}/{namespace}/{name}@{version}?checksum=sha256:{hex}`.
//!
//! [`PackageUrl`] is the parsed form; [`verify_purl`] enforces the log's
//! entry shape (exactly one `checksum` qualifier carrying a SHA-256 digest,
//! no subpath). The [`PackageUrl::identity`] string — the pURL with its
//! qualifiers stripped — is the key against which digest uniqueness is
//! enforced by the monitor.

mod error;
mod parse;
mod validate;

pub use error::{ParseError, ValidationError};
pub use parse::PackageUrl;
pub use validate::verify_purl;
