use crate::consent::ConsentDecodeError;
use crate::core::{DataReader, DataWriter, FromDataReader, NotEnoughBits, ToDataWriter};
use crate::v2::core_segment::PURPOSES;
use crate::vendors::{VendorSet, read_bare_range};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
#[cfg(feature = "serde")]
use serde::Serialize;
use strum_macros::Display;

const PURPOSE_ID_BITS: u32 = 6;
const RESTRICTION_TYPE_BITS: u32 = 2;
const NUM_CUSTOM_PURPOSES_BITS: u32 = 6;
const MAX_CUSTOM_PURPOSES: usize = (1 << NUM_CUSTOM_PURPOSES_BITS) - 1;

/// A restriction a publisher puts on the vendors processing data for a purpose.
///
/// The vendors are stored without a max vendor id, so a decoded set always has its largest
/// member as max. [`PubRestriction::new`] applies the same bound.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PubRestriction {
    pub purpose_id: u8,
    pub restriction_type: RestrictionType,
    pub vendors: VendorSet,
}

impl PubRestriction {
    pub fn new(purpose_id: u8, restriction_type: RestrictionType, mut vendors: VendorSet) -> Self {
        let largest = vendors.iter().next_back().copied().unwrap_or(0);
        vendors.set_max_vendor_id(largest);

        Self {
            purpose_id,
            restriction_type,
            vendors,
        }
    }
}

impl FromDataReader for PubRestriction {
    type Err = ConsentDecodeError;

    fn from_data_reader(r: &mut DataReader<'_>) -> Result<Self, Self::Err> {
        let purpose_id = r.read_bits(PURPOSE_ID_BITS)? as u8;
        let restriction_type = r.read_bits(RESTRICTION_TYPE_BITS)? as u8;
        let restriction_type = RestrictionType::from_u8(restriction_type)
            .ok_or(ConsentDecodeError::InvalidPubRestrictionType(restriction_type))?;
        // always a list of entries, whatever the density
        let vendors = read_bare_range(r)?;

        Ok(Self {
            purpose_id,
            restriction_type,
            vendors,
        })
    }
}

impl ToDataWriter for PubRestriction {
    fn to_data_writer(&self, w: &mut DataWriter) {
        w.append_bits(u64::from(self.purpose_id), PURPOSE_ID_BITS);
        w.append_bits(self.restriction_type as u64, RESTRICTION_TYPE_BITS);
        self.vendors.write_bare_range(w);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, FromPrimitive, Display)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RestrictionType {
    NotAllowed = 0,
    RequireConsent = 1,
    RequireLegitimateInterest = 2,
}

/// Publisher transparency and consent, carried by its own optional segment.
///
/// Both custom purpose sequences share the same length on the wire, at most 63.
/// When encoding, the consent sequence sets that length.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PublisherTc {
    pub purpose_consents: [bool; PURPOSES],
    pub purpose_legitimate_interests: [bool; PURPOSES],
    pub custom_purpose_consents: Vec<bool>,
    pub custom_purpose_legitimate_interests: Vec<bool>,
}

impl FromDataReader for PublisherTc {
    type Err = NotEnoughBits;

    fn from_data_reader(r: &mut DataReader<'_>) -> Result<Self, Self::Err> {
        let purpose_consents = r.read_flags()?;
        let purpose_legitimate_interests = r.read_flags()?;
        let custom_purposes_num = r.read_bits(NUM_CUSTOM_PURPOSES_BITS)? as usize;
        let custom_purpose_consents = r.read_bools(custom_purposes_num)?;
        let custom_purpose_legitimate_interests = r.read_bools(custom_purposes_num)?;

        Ok(Self {
            purpose_consents,
            purpose_legitimate_interests,
            custom_purpose_consents,
            custom_purpose_legitimate_interests,
        })
    }
}

impl ToDataWriter for PublisherTc {
    fn to_data_writer(&self, w: &mut DataWriter) {
        w.append_flags(&self.purpose_consents);
        w.append_flags(&self.purpose_legitimate_interests);

        let n = self.custom_purpose_consents.len().min(MAX_CUSTOM_PURPOSES);
        w.append_bits(n as u64, NUM_CUSTOM_PURPOSES_BITS);
        w.append_flags(&self.custom_purpose_consents[..n]);
        for i in 0..n {
            w.append_bit(
                self.custom_purpose_legitimate_interests
                    .get(i)
                    .copied()
                    .unwrap_or(false),
            );
        }
    }
}
