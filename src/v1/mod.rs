use crate::consent::{ConsentDecodeError, Version};
use crate::core::base64_url::{DecodeExt, EncodeExt};
use crate::core::{DataReader, DataWriter, FromDataReader, ToDataWriter, encodable_string, now};
use crate::vendors::{
    VendorEncoding, VendorSet, read_bitfield, read_max_vendor_id, read_range_with_default,
};
#[cfg(feature = "serde")]
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

const VERSION: u8 = 1;
const MIN_BITS: u64 = 21 * 8;
pub const PURPOSES: usize = 24;

// See https://github.com/InteractiveAdvertisingBureau/GDPR-Transparency-and-Consent-Framework/blob/master/Consent%20string%20and%20vendor%20list%20formats%20v1.1%20Final.md
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ConsentV1 {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_updated: OffsetDateTime,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_screen: u8,
    pub consent_language: String,
    pub vendor_list_version: u16,
    pub purposes_allowed: [bool; PURPOSES],
    pub vendor_consents: VendorSet,
}

impl ConsentV1 {
    /// Creates a consent record stamped with the current time.
    ///
    /// A language which is not made of two letters is replaced by `"XX"`.
    pub fn new(
        cmp_id: u16,
        cmp_version: u16,
        consent_screen: u8,
        consent_language: &str,
        vendor_list_version: u16,
        purposes_allowed: [bool; PURPOSES],
        vendor_consents: VendorSet,
    ) -> Self {
        let now = now();
        Self {
            created: now,
            last_updated: now,
            cmp_id,
            cmp_version,
            consent_screen,
            consent_language: encodable_string(consent_language, 2),
            vendor_list_version,
            purposes_allowed,
            vendor_consents,
        }
    }

    pub fn version(&self) -> Version {
        Version::V1
    }

    /// Purpose ids start at 1.
    pub fn is_purpose_allowed(&self, purpose_id: u8) -> bool {
        flag(&self.purposes_allowed, purpose_id)
    }

    pub fn is_vendor_allowed(&self, vendor_id: u16) -> bool {
        self.vendor_consents.contains(vendor_id)
    }
}

pub(crate) fn flag(flags: &[bool], id: u8) -> bool {
    usize::from(id)
        .checked_sub(1)
        .and_then(|i| flags.get(i))
        .copied()
        .unwrap_or(false)
}

impl FromStr for ConsentV1 {
    type Err = ConsentDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.decode_base64_url()?;
        DataReader::new(&b).parse()
    }
}

impl FromDataReader for ConsentV1 {
    type Err = ConsentDecodeError;

    fn from_data_reader(r: &mut DataReader<'_>) -> Result<Self, Self::Err> {
        if r.remaining_bits() < MIN_BITS {
            return Err(ConsentDecodeError::UnexpectedEnd);
        }

        let version = r.read_bits(6)? as u8;
        if version != VERSION {
            return Err(ConsentDecodeError::UnsupportedVersion(version));
        }

        let created = r.read_datetime()?;
        let last_updated = r.read_datetime()?;
        let cmp_id = r.read_bits(12)? as u16;
        let cmp_version = r.read_bits(12)? as u16;
        let consent_screen = r.read_bits(6)? as u8;
        let consent_language = r.read_string(2)?;
        let vendor_list_version = r.read_bits(12)? as u16;
        let purposes_allowed = r.read_flags()?;
        let vendor_consents = parse_vendor_consents(r)?;

        Ok(Self {
            created,
            last_updated,
            cmp_id,
            cmp_version,
            consent_screen,
            consent_language,
            vendor_list_version,
            purposes_allowed,
            vendor_consents,
        })
    }
}

fn parse_vendor_consents(r: &mut DataReader<'_>) -> Result<VendorSet, ConsentDecodeError> {
    let max_vendor_id = read_max_vendor_id(r)?;
    let is_range = r.read_bit()?;
    Ok(if is_range {
        read_range_with_default(r, max_vendor_id)?
    } else {
        read_bitfield(r, max_vendor_id)?
    })
}

impl ToDataWriter for ConsentV1 {
    fn to_data_writer(&self, w: &mut DataWriter) {
        w.append_bits(u64::from(VERSION), 6);
        w.append_datetime(&self.created);
        w.append_datetime(&self.last_updated);
        w.append_bits(u64::from(self.cmp_id), 12);
        w.append_bits(u64::from(self.cmp_version), 12);
        w.append_bits(u64::from(self.consent_screen), 6);
        w.append_string(&self.consent_language, 2);
        w.append_bits(u64::from(self.vendor_list_version), 12);
        w.append_flags(&self.purposes_allowed);
        self.vendor_consents.write_cheapest(w, &VendorEncoding::THREE_WAY);
    }
}

impl fmt::Display for ConsentV1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut w = DataWriter::new();
        w.write(self);
        f.write_str(&w.into_bytes().encode_base64_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use time::macros::datetime;

    fn purposes(ids: &[usize]) -> [bool; PURPOSES] {
        let mut flags = [false; PURPOSES];
        for &id in ids {
            flags[id - 1] = true;
        }
        flags
    }

    #[test]
    fn success() {
        let actual = ConsentV1::from_str("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA").unwrap();
        let expected = ConsentV1 {
            created: datetime!(2017-11-07 19:15:55.4 UTC),
            last_updated: datetime!(2017-11-07 19:15:55.4 UTC),
            cmp_id: 7,
            cmp_version: 1,
            consent_screen: 3,
            consent_language: "EN".to_string(),
            vendor_list_version: 8,
            purposes_allowed: purposes(&[1, 2, 3]),
            vendor_consents: (1..=2011).filter(|&id| id != 9).collect(),
        };

        assert_eq!(actual, expected);
        assert!(actual.is_purpose_allowed(1));
        assert!(!actual.is_purpose_allowed(4));
        assert!(!actual.is_purpose_allowed(0));
        assert!(!actual.is_purpose_allowed(25));
        assert!(actual.is_vendor_allowed(2011));
        assert!(!actual.is_vendor_allowed(9));
        assert!(!actual.is_vendor_allowed(2012));
    }

    #[test]
    fn sparse_vendors() {
        let actual = ConsentV1::from_str("BOQ7WlgOQ7WlgABACDENABwAAABJOACgACAAQABA").unwrap();
        assert_eq!(actual.created, datetime!(2018-07-15 07:00 UTC));
        assert_eq!(actual.consent_language, "EN");
        assert_eq!(actual.purposes_allowed, purposes(&[1, 2]));

        let mut vendors = VendorSet::with_max_vendor_id(1171);
        vendors.extend([1, 2, 4]);
        assert_eq!(actual.vendor_consents, vendors);
    }

    #[test_case("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA" ; "range with default true")]
    #[test_case("BOQ7WlgOQ7WlgABACDENABwAAABJOACgACAAQABA" ; "range with default false")]
    fn canonical(s: &str) {
        let c = ConsentV1::from_str(s).unwrap();
        assert_eq!(c.to_string(), s);
    }

    #[test_case("BO5a1L7O5a1L7AAABBENC2-AAAAt" => ConsentDecodeError::UnexpectedEnd ; "missing data")]
    #[test_case("BOEFEAyOEFEAyAHABDENAI4AAA" => ConsentDecodeError::UnexpectedEnd ; "shorter than header")]
    #[test_case("" => ConsentDecodeError::UnexpectedEnd ; "empty string")]
    #[test_case("DOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA" => ConsentDecodeError::UnsupportedVersion(3) ; "unknown version")]
    #[test_case("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAAS=" => matches ConsentDecodeError::Base64(_) ; "padding")]
    fn error(s: &str) -> ConsentDecodeError {
        ConsentV1::from_str(s).unwrap_err()
    }

    #[test]
    fn new_round_trips() {
        let mut vendors = VendorSet::with_max_vendor_id(500);
        vendors.extend((1..=500).filter(|id| id % 50 != 0));
        let c = ConsentV1::new(12, 3, 2, "FRA", 44, purposes(&[1, 5, 24]), vendors);

        assert_eq!(c.consent_language, "XX");
        assert_eq!(c.created, c.last_updated);
        assert_eq!(c.created.nanosecond() % 100_000_000, 0);

        let parsed = ConsentV1::from_str(&c.to_string()).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn fields_are_truncated_to_width() {
        let mut c = ConsentV1::from_str("BOQ7WlgOQ7WlgABACDENABwAAABJOACgACAAQABA").unwrap();
        c.cmp_id = 0x1001;
        c.consent_screen = 0x41;

        let parsed = ConsentV1::from_str(&c.to_string()).unwrap();
        assert_eq!(parsed.cmp_id, 1);
        assert_eq!(parsed.consent_screen, 1);
    }

    #[test]
    fn empty_vendor_set() {
        let c = ConsentV1::new(1, 1, 1, "EN", 1, [false; PURPOSES], VendorSet::new());
        let parsed = ConsentV1::from_str(&c.to_string()).unwrap();
        assert!(parsed.vendor_consents.is_empty());
        assert_eq!(parsed.vendor_consents.max_vendor_id(), 0);
    }
}
