use crate::core::NotEnoughBits;
use crate::core::base64_url::base64_value;
use crate::v1::ConsentV1;
use crate::v2::ConsentV2;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
#[cfg(feature = "serde")]
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use strum_macros::Display;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ConsentDecodeError {
    #[error("unexpected end of consent string")]
    UnexpectedEnd,
    /// Carries the 6-bit version value, or the raw first byte when it is not a base64
    /// character.
    #[error("unsupported consent string version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid publisher restriction type {0}")]
    InvalidPubRestrictionType(u8),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

impl From<NotEnoughBits> for ConsentDecodeError {
    fn from(_: NotEnoughBits) -> Self {
        Self::UnexpectedEnd
    }
}

/// Format generation of a consent string.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, FromPrimitive, Display)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Version {
    V1 = 1,
    V2 = 2,
}

/// A decoded consent string of either version.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Consent {
    V1(ConsentV1),
    V2(ConsentV2),
}

impl Consent {
    pub fn version(&self) -> Version {
        match self {
            Self::V1(_) => Version::V1,
            Self::V2(_) => Version::V2,
        }
    }
}

impl FromStr for Consent {
    type Err = ConsentDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Consent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1(c) => c.fmt(f),
            Self::V2(c) => c.fmt(f),
        }
    }
}

impl From<ConsentV1> for Consent {
    fn from(c: ConsentV1) -> Self {
        Self::V1(c)
    }
}

impl From<ConsentV2> for Consent {
    fn from(c: ConsentV2) -> Self {
        Self::V2(c)
    }
}

/// Returns the version of a consent string, looking only at its first character.
///
/// A first character outside the base64 alphabet is an unsupported version.
pub fn parse_version(s: &str) -> Result<Version, ConsentDecodeError> {
    let first = s.bytes().next().ok_or(ConsentDecodeError::UnexpectedEnd)?;
    let value = base64_value(first).ok_or(ConsentDecodeError::UnsupportedVersion(first))?;

    Version::from_u8(value).ok_or(ConsentDecodeError::UnsupportedVersion(value))
}

/// Parses a consent string of any supported version.
pub fn parse(s: &str) -> Result<Consent, ConsentDecodeError> {
    let version = parse_version(s)?;
    trace!(%version, "parsing consent string");

    match version {
        Version::V1 => parse_v1(s).map(Consent::V1),
        Version::V2 => parse_v2(s).map(Consent::V2),
    }
}

/// Checks that a consent string of any supported version is well-formed.
pub fn validate(s: &str) -> Result<(), ConsentDecodeError> {
    parse(s).map(|_| ())
}

pub fn parse_v1(s: &str) -> Result<ConsentV1, ConsentDecodeError> {
    ConsentV1::from_str(s)
}

pub fn parse_v2(s: &str) -> Result<ConsentV2, ConsentDecodeError> {
    ConsentV2::from_str(s)
}

pub fn validate_v1(s: &str) -> Result<(), ConsentDecodeError> {
    parse_v1(s).map(|_| ())
}

pub fn validate_v2(s: &str) -> Result<(), ConsentDecodeError> {
    parse_v2(s).map(|_| ())
}
