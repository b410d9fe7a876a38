//! This crate is an implementation of the IAB Transparency & Consent Framework (TCF)
//! [Consent String](https://github.com/InteractiveAdvertisingBureau/GDPR-Transparency-and-Consent-Framework)
//! format.
//!
//! Both versions of the format can be decoded and encoded again: the original version 1.1
//! and version 2, with its optional disclosed vendors, allowed vendors and publisher
//! transparency and consent segments.
//!
//! NOTE: This is not an official IAB library.
//!
//! # Parsing consent strings
//!
//! The version of a string is given by its first character. [`parse`] looks at it and returns a
//! [`Consent`] holding the decoded record of the matching version.
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! use iab_tcf::{Consent, Version};
//!
//! let consent = iab_tcf::parse("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA")?;
//! assert_eq!(consent.version(), Version::V1);
//!
//! if let Consent::V1(v1) = &consent {
//!     assert_eq!(v1.cmp_id, 7);
//!     assert!(v1.is_purpose_allowed(1));
//!     assert!(!v1.is_vendor_allowed(9));
//! }
//!
//! // encoding again gives back the original string
//! assert_eq!(consent.to_string(), "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA");
//! # Ok(())
//! # }
//! ```
//!
//! # Accessing consent data
//!
//! When the expected version is known, the version specific parsers can be used directly.
//!
//! The following example checks that a specific vendor (id 755) has the right to create a
//! personalized ads profile (purpose ID 3) for the user who submitted the provided consent string.
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let s = "CPXuQIAPXuQIAAfKABENB-CgACAAAAAAAAYgF5wAQF5gAAAA.YAAAAAAAAAAA";
//! let tcf = iab_tcf::parse_v2(s)?;
//!
//! // does the user consent to the vendor creating a personalized ads profile
//! // based on their data?
//! let personalized_ads_profile_consent = tcf.core.is_purpose_consented(3);
//!
//! // does the user consent to vendor Google Advertising Products to use their data?
//! let vendor_consent = tcf.core.is_vendor_consented(755);
//!
//! assert!(personalized_ads_profile_consent && vendor_consent);
//! assert!(tcf.publisher_tc.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Creating consent strings
//!
//! ```
//! use iab_tcf::v1::ConsentV1;
//! use iab_tcf::VendorSet;
//!
//! let mut purposes = [false; 24];
//! purposes[0] = true;
//!
//! let consent = ConsentV1::new(7, 1, 3, "EN", 8, purposes, VendorSet::from([1, 2, 4]));
//! let s = consent.to_string();
//!
//! assert_eq!(iab_tcf::parse_v1(&s), Ok(consent));
//! ```
//!
//! # Error handling
//!
//! A string which cannot be fully decoded is an error, with one exception: the optional segments
//! of a version 2 string are read in order, and reading stops at the first one which is malformed
//! while keeping what was read so far. Segments of an unknown type are skipped.
//!
pub(crate) mod core;
mod consent;
pub mod v1;
pub mod v2;
mod vendors;

pub use consent::{
    Consent, ConsentDecodeError, Version, parse, parse_v1, parse_v2, parse_version, validate,
    validate_v1, validate_v2,
};
pub use v1::ConsentV1;
pub use v2::ConsentV2;
pub use vendors::{Runs, VendorEncoding, VendorSet};
