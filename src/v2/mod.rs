use crate::consent::{ConsentDecodeError, Version};
use crate::core::base64_url::{DecodeExt, EncodeExt};
use crate::core::{DataReader, DataWriter, ToDataWriter};
use crate::vendors::VendorSet;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
#[cfg(feature = "serde")]
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use core_segment::Core;
pub use publisher::{PubRestriction, PublisherTc, RestrictionType};

mod core_segment;
mod publisher;

const SEGMENT_SEPARATOR: char = '.';
const SEGMENT_TYPE_BITS: u32 = 3;

#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
pub enum SegmentType {
    DisclosedVendors = 1,
    AllowedVendors = 2,
    PublisherTc = 3,
}

/// A version 2 consent string: a core segment and up to three optional segments.
///
/// An empty vendor set in an optional component is not encoded, as if it were absent.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ConsentV2 {
    pub core: Core,
    pub disclosed_vendors: Option<VendorSet>,
    pub allowed_vendors: Option<VendorSet>,
    pub publisher_tc: Option<PublisherTc>,
}

impl ConsentV2 {
    pub fn version(&self) -> Version {
        Version::V2
    }

    fn parse_optional_segment(&mut self, s: &str) -> Result<(), ConsentDecodeError> {
        let b = s.decode_base64_url()?;
        let mut r = DataReader::new(&b);

        let segment_type = r.read_bits(SEGMENT_TYPE_BITS)? as u8;
        match SegmentType::from_u8(segment_type) {
            Some(SegmentType::DisclosedVendors) => {
                self.disclosed_vendors = Some(r.parse()?);
            }
            Some(SegmentType::AllowedVendors) => {
                self.allowed_vendors = Some(r.parse()?);
            }
            Some(SegmentType::PublisherTc) => {
                self.publisher_tc = Some(r.parse()?);
            }
            None => {
                debug!(segment_type, "skipping segment of unknown type");
            }
        }

        Ok(())
    }
}

/// Parses the core segment, then the optional segments in order. Parsing stops
/// silently at the first malformed optional segment, keeping those read before it.
impl FromStr for ConsentV2 {
    type Err = ConsentDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split(SEGMENT_SEPARATOR);

        let core = segments.next().unwrap_or_default().decode_base64_url()?;
        let mut consent = Self {
            core: DataReader::new(&core).parse()?,
            ..Default::default()
        };

        for (i, segment) in segments.enumerate() {
            if let Err(err) = consent.parse_optional_segment(segment) {
                debug!(segment = i + 1, %err, "ignoring malformed optional segment");
                break;
            }
        }

        Ok(consent)
    }
}

fn encode_segment<T>(segment_type: SegmentType, value: &T) -> String
where
    T: ToDataWriter,
{
    let mut w = DataWriter::new();
    w.append_bits(segment_type as u64, SEGMENT_TYPE_BITS);
    w.write(value);
    w.into_bytes().encode_base64_url()
}

impl fmt::Display for ConsentV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut w = DataWriter::new();
        w.write(&self.core);
        f.write_str(&w.into_bytes().encode_base64_url())?;

        let vendor_segments = [
            (SegmentType::DisclosedVendors, &self.disclosed_vendors),
            (SegmentType::AllowedVendors, &self.allowed_vendors),
        ];
        for (segment_type, vendors) in vendor_segments {
            if let Some(vendors) = vendors.as_ref().filter(|v| !v.is_empty()) {
                write!(
                    f,
                    "{SEGMENT_SEPARATOR}{}",
                    encode_segment(segment_type, vendors)
                )?;
            }
        }
        if let Some(publisher_tc) = &self.publisher_tc {
            write!(
                f,
                "{SEGMENT_SEPARATOR}{}",
                encode_segment(SegmentType::PublisherTc, publisher_tc)
            )?;
        }

        Ok(())
    }
}
