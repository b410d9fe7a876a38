use crate::consent::ConsentDecodeError;
use crate::core::{DataReader, DataWriter, FromDataReader, ToDataWriter};
use crate::v1::flag;
use crate::v2::publisher::PubRestriction;
use crate::vendors::VendorSet;
#[cfg(feature = "serde")]
use serde::Serialize;
use time::OffsetDateTime;

const VERSION: u8 = 2;
const MIN_BITS: u64 = 213;
const NUM_PUB_RESTRICTIONS_BITS: u32 = 12;
const MAX_PUB_RESTRICTIONS: usize = (1 << NUM_PUB_RESTRICTIONS_BITS) - 1;
pub const SPECIAL_FEATURES: usize = 12;
pub const PURPOSES: usize = 24;

/// The mandatory first segment of a version 2 consent string.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Core {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_updated: OffsetDateTime,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_screen: u8,
    pub consent_language: String,
    pub vendor_list_version: u16,
    pub policy_version: u8,
    pub is_service_specific: bool,
    pub use_non_standard_stacks: bool,
    pub special_feature_optins: [bool; SPECIAL_FEATURES],
    pub purpose_consents: [bool; PURPOSES],
    pub purpose_legitimate_interests: [bool; PURPOSES],
    pub purpose_one_treatment: bool,
    pub publisher_country_code: String,
    pub vendor_consents: VendorSet,
    pub vendor_legitimate_interests: VendorSet,
    pub publisher_restrictions: Vec<PubRestriction>,
}

impl Core {
    /// Purpose ids start at 1.
    pub fn is_purpose_consented(&self, purpose_id: u8) -> bool {
        flag(&self.purpose_consents, purpose_id)
    }

    pub fn is_purpose_legitimate_interest(&self, purpose_id: u8) -> bool {
        flag(&self.purpose_legitimate_interests, purpose_id)
    }

    pub fn is_vendor_consented(&self, vendor_id: u16) -> bool {
        self.vendor_consents.contains(vendor_id)
    }

    pub fn is_vendor_legitimate_interest(&self, vendor_id: u16) -> bool {
        self.vendor_legitimate_interests.contains(vendor_id)
    }
}

/// Timestamps at the Unix epoch, codes set to `"XX"` and everything else empty.
impl Default for Core {
    fn default() -> Self {
        Self {
            created: OffsetDateTime::UNIX_EPOCH,
            last_updated: OffsetDateTime::UNIX_EPOCH,
            cmp_id: 0,
            cmp_version: 0,
            consent_screen: 0,
            consent_language: "XX".to_string(),
            vendor_list_version: 0,
            policy_version: 0,
            is_service_specific: false,
            use_non_standard_stacks: false,
            special_feature_optins: [false; SPECIAL_FEATURES],
            purpose_consents: [false; PURPOSES],
            purpose_legitimate_interests: [false; PURPOSES],
            purpose_one_treatment: false,
            publisher_country_code: "XX".to_string(),
            vendor_consents: VendorSet::default(),
            vendor_legitimate_interests: VendorSet::default(),
            publisher_restrictions: vec![],
        }
    }
}

impl FromDataReader for Core {
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
        let policy_version = r.read_bits(6)? as u8;
        let is_service_specific = r.read_bit()?;
        let use_non_standard_stacks = r.read_bit()?;
        let special_feature_optins = r.read_flags()?;
        let purpose_consents = r.read_flags()?;
        let purpose_legitimate_interests = r.read_flags()?;
        let purpose_one_treatment = r.read_bit()?;
        let publisher_country_code = r.read_string(2)?;
        let vendor_consents = r.parse()?;
        let vendor_legitimate_interests = r.parse()?;
        let publisher_restrictions = parse_publisher_restrictions(r)?;

        Ok(Self {
            created,
            last_updated,
            cmp_id,
            cmp_version,
            consent_screen,
            consent_language,
            vendor_list_version,
            policy_version,
            is_service_specific,
            use_non_standard_stacks,
            special_feature_optins,
            purpose_consents,
            purpose_legitimate_interests,
            purpose_one_treatment,
            publisher_country_code,
            vendor_consents,
            vendor_legitimate_interests,
            publisher_restrictions,
        })
    }
}

fn parse_publisher_restrictions(
    r: &mut DataReader<'_>,
) -> Result<Vec<PubRestriction>, ConsentDecodeError> {
    let n = r.read_bits(NUM_PUB_RESTRICTIONS_BITS)?;
    let mut restrictions = Vec::new();
    for _ in 0..n {
        restrictions.push(r.parse()?);
    }

    Ok(restrictions)
}

impl ToDataWriter for Core {
    fn to_data_writer(&self, w: &mut DataWriter) {
        w.append_bits(u64::from(VERSION), 6);
        w.append_datetime(&self.created);
        w.append_datetime(&self.last_updated);
        w.append_bits(u64::from(self.cmp_id), 12);
        w.append_bits(u64::from(self.cmp_version), 12);
        w.append_bits(u64::from(self.consent_screen), 6);
        w.append_string(&self.consent_language, 2);
        w.append_bits(u64::from(self.vendor_list_version), 12);
        w.append_bits(u64::from(self.policy_version), 6);
        w.append_bit(self.is_service_specific);
        w.append_bit(self.use_non_standard_stacks);
        w.append_flags(&self.special_feature_optins);
        w.append_flags(&self.purpose_consents);
        w.append_flags(&self.purpose_legitimate_interests);
        w.append_bit(self.purpose_one_treatment);
        w.append_string(&self.publisher_country_code, 2);
        w.write(&self.vendor_consents);
        w.write(&self.vendor_legitimate_interests);

        let n = self.publisher_restrictions.len().min(MAX_PUB_RESTRICTIONS);
        w.append_bits(n as u64, NUM_PUB_RESTRICTIONS_BITS);
        for restriction in &self.publisher_restrictions[..n] {
            w.write(restriction);
        }
    }
}
