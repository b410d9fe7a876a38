use crate::core::{DataReader, DataWriter, FromDataReader, NotEnoughBits, ToDataWriter};
#[cfg(feature = "serde")]
use serde::Serialize;
use std::collections::BTreeSet;
use std::collections::btree_set;
use std::iter::Peekable;
use std::ops::RangeInclusive;
use tracing::trace;

const MAX_VENDOR_ID_BITS: u32 = 16;
const VENDOR_ID_BITS: u32 = 16;
const NUM_ENTRIES_BITS: u32 = 12;
const DEFAULT_CONSENT_BITS: u64 = 1;
const SINGLE_ENTRY_BITS: u64 = 1 + VENDOR_ID_BITS as u64;
const RANGE_ENTRY_BITS: u64 = 1 + 2 * VENDOR_ID_BITS as u64;

/// The ways a vendor set can be laid out on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum VendorEncoding {
    /// One bit per vendor id from 1 to the max vendor id.
    BitField,
    /// A list of single ids and inclusive ranges of member ids.
    Range,
    /// Version 1 only: a default value, and the ranges of ids which differ from it.
    RangeWithDefault { default_consent: bool },
}

impl VendorEncoding {
    /// Candidates for version 2 vendor sets, in tie-break order.
    pub const TWO_WAY: [VendorEncoding; 2] = [VendorEncoding::BitField, VendorEncoding::Range];

    /// Candidates for the version 1 vendor consents, in tie-break order.
    pub const THREE_WAY: [VendorEncoding; 3] = [
        VendorEncoding::BitField,
        VendorEncoding::RangeWithDefault {
            default_consent: false,
        },
        VendorEncoding::RangeWithDefault {
            default_consent: true,
        },
    ];
}

/// A set of vendor ids in `1..=max_vendor_id`.
///
/// Inserting an id above the current maximum raises it. Id 0 is never a member.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct VendorSet {
    max_vendor_id: u16,
    ids: BTreeSet<u16>,
}

impl VendorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_vendor_id(max_vendor_id: u16) -> Self {
        Self {
            max_vendor_id,
            ids: BTreeSet::new(),
        }
    }

    pub fn max_vendor_id(&self) -> u16 {
        self.max_vendor_id
    }

    /// Changes the upper bound of the set, dropping members above it.
    pub fn set_max_vendor_id(&mut self, max_vendor_id: u16) {
        self.max_vendor_id = max_vendor_id;
        self.ids.retain(|&id| id <= max_vendor_id);
    }

    pub fn contains(&self, id: u16) -> bool {
        self.ids.contains(&id)
    }

    pub fn insert(&mut self, id: u16) -> bool {
        if id == 0 {
            return false;
        }
        self.max_vendor_id = self.max_vendor_id.max(id);
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: u16) -> bool {
        self.ids.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, u16> {
        self.ids.iter()
    }

    /// Maximal runs of consecutive member ids, in ascending order.
    pub fn runs(&self) -> Runs<'_> {
        Runs {
            ids: self.ids.iter().peekable(),
        }
    }

    /// Maximal runs of ids in `1..=max_vendor_id` which are not members.
    pub fn gaps(&self) -> Vec<RangeInclusive<u16>> {
        let mut gaps = Vec::new();
        let mut next = 1u32;
        for run in self.runs() {
            let start = u32::from(*run.start());
            if start > next {
                gaps.push((next as u16)..=((start - 1) as u16));
            }
            next = u32::from(*run.end()) + 1;
        }
        if next <= u32::from(self.max_vendor_id) {
            gaps.push((next as u16)..=self.max_vendor_id);
        }

        gaps
    }

    /// Size in bits of the vendor payload in the given encoding, leaving out the
    /// max vendor id and the encoding type bit which every encoding shares.
    pub fn encoding_cost(&self, encoding: VendorEncoding) -> u64 {
        match encoding {
            VendorEncoding::BitField => u64::from(self.max_vendor_id),
            VendorEncoding::Range => entries_cost(self.runs()),
            VendorEncoding::RangeWithDefault {
                default_consent: false,
            } => DEFAULT_CONSENT_BITS + entries_cost(self.runs()),
            VendorEncoding::RangeWithDefault {
                default_consent: true,
            } => DEFAULT_CONSENT_BITS + entries_cost(self.gaps()),
        }
    }

    /// The smallest of `candidates`; on equal costs the earliest candidate wins.
    pub fn cheapest_encoding(&self, candidates: &[VendorEncoding]) -> VendorEncoding {
        candidates
            .iter()
            .map(|&e| (e, self.encoding_cost(e)))
            .reduce(|best, next| if next.1 < best.1 { next } else { best })
            .map(|(e, _)| e)
            .unwrap_or(VendorEncoding::BitField)
    }

    fn from_entries<I>(entries: I, max_vendor_id: u16) -> Self
    where
        I: IntoIterator<Item = RangeInclusive<u16>>,
    {
        let mut set = Self::with_max_vendor_id(max_vendor_id);
        for entry in merge_entries(entries) {
            set.extend(entry);
        }

        set
    }

    /// Writes the max vendor id followed by the cheapest of `candidates`, and returns
    /// the encoding used.
    pub(crate) fn write_cheapest(
        &self,
        w: &mut DataWriter,
        candidates: &[VendorEncoding],
    ) -> VendorEncoding {
        let encoding = self.cheapest_encoding(candidates);
        trace!(
            ?encoding,
            max_vendor_id = self.max_vendor_id,
            members = self.len(),
            "encoding vendor set"
        );
        w.append_bits(u64::from(self.max_vendor_id), MAX_VENDOR_ID_BITS);
        self.write_payload(w, encoding);

        encoding
    }

    fn write_payload(&self, w: &mut DataWriter, encoding: VendorEncoding) {
        match encoding {
            VendorEncoding::BitField => {
                w.append_bit(false);
                for id in 1..=self.max_vendor_id {
                    w.append_bit(self.contains(id));
                }
            }
            VendorEncoding::Range => {
                w.append_bit(true);
                write_entries(w, self.runs());
            }
            VendorEncoding::RangeWithDefault { default_consent } => {
                w.append_bit(true);
                w.append_bit(default_consent);
                if default_consent {
                    write_entries(w, self.gaps());
                } else {
                    write_entries(w, self.runs());
                }
            }
        }
    }

    /// Writes the members as a list of entries, without max vendor id nor encoding type.
    pub(crate) fn write_bare_range(&self, w: &mut DataWriter) {
        write_entries(w, self.runs());
    }
}

impl FromDataReader for VendorSet {
    type Err = NotEnoughBits;

    fn from_data_reader(r: &mut DataReader<'_>) -> Result<Self, Self::Err> {
        let max_vendor_id = read_max_vendor_id(r)?;
        if r.read_bit()? {
            Ok(Self::from_entries(read_entries(r)?, max_vendor_id))
        } else {
            read_bitfield(r, max_vendor_id)
        }
    }
}

impl ToDataWriter for VendorSet {
    fn to_data_writer(&self, w: &mut DataWriter) {
        self.write_cheapest(w, &VendorEncoding::TWO_WAY);
    }
}

pub(crate) fn read_max_vendor_id(r: &mut DataReader<'_>) -> Result<u16, NotEnoughBits> {
    Ok(r.read_bits(MAX_VENDOR_ID_BITS)? as u16)
}

pub(crate) fn read_bitfield(
    r: &mut DataReader<'_>,
    max_vendor_id: u16,
) -> Result<VendorSet, NotEnoughBits> {
    let mut set = VendorSet::with_max_vendor_id(max_vendor_id);
    for id in 1..=max_vendor_id {
        if r.read_bit()? {
            set.insert(id);
        }
    }

    Ok(set)
}

/// Reads a default flag and a list of entries toggling it, over `1..=max_vendor_id`.
pub(crate) fn read_range_with_default(
    r: &mut DataReader<'_>,
    max_vendor_id: u16,
) -> Result<VendorSet, NotEnoughBits> {
    let default_consent = r.read_bit()?;
    let listed = VendorSet::from_entries(read_entries(r)?, max_vendor_id);

    let mut set = VendorSet::with_max_vendor_id(max_vendor_id);
    set.extend((1..=max_vendor_id).filter(|&id| default_consent ^ listed.contains(id)));

    Ok(set)
}

/// Reads a list of entries with no max vendor id in front. The max vendor id of the
/// result is its largest member.
pub(crate) fn read_bare_range(r: &mut DataReader<'_>) -> Result<VendorSet, NotEnoughBits> {
    Ok(VendorSet::from_entries(read_entries(r)?, 0))
}

fn read_entries(r: &mut DataReader<'_>) -> Result<Vec<RangeInclusive<u16>>, NotEnoughBits> {
    let n = r.read_bits(NUM_ENTRIES_BITS)?;
    let mut entries = Vec::new();
    for _ in 0..n {
        let is_range = r.read_bit()?;
        let start = r.read_bits(VENDOR_ID_BITS)? as u16;
        let end = if is_range {
            r.read_bits(VENDOR_ID_BITS)? as u16
        } else {
            start
        };
        entries.push(start..=end);
    }

    Ok(entries)
}

/// Sorts entries and merges those which overlap or touch, dropping empty ones and id 0,
/// so that each id is covered at most once.
fn merge_entries<I>(entries: I) -> Vec<RangeInclusive<u16>>
where
    I: IntoIterator<Item = RangeInclusive<u16>>,
{
    let mut entries = entries
        .into_iter()
        .map(|e| (*e.start()).max(1)..=*e.end())
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>();
    entries.sort_unstable_by_key(|e| (*e.start(), *e.end()));

    let mut merged: Vec<RangeInclusive<u16>> = Vec::with_capacity(entries.len());
    for entry in entries {
        match merged.last_mut() {
            Some(last) if u32::from(*entry.start()) <= u32::from(*last.end()) + 1 => {
                if entry.end() > last.end() {
                    *last = *last.start()..=*entry.end();
                }
            }
            _ => merged.push(entry),
        }
    }

    merged
}

fn write_entries<I>(w: &mut DataWriter, entries: I)
where
    I: IntoIterator<Item = RangeInclusive<u16>>,
{
    let entries = entries.into_iter().collect::<Vec<_>>();
    w.append_bits(entries.len() as u64, NUM_ENTRIES_BITS);
    for entry in entries {
        let (start, end) = entry.into_inner();
        if start == end {
            w.append_bit(false);
            w.append_bits(u64::from(start), VENDOR_ID_BITS);
        } else {
            w.append_bit(true);
            w.append_bits(u64::from(start), VENDOR_ID_BITS);
            w.append_bits(u64::from(end), VENDOR_ID_BITS);
        }
    }
}

fn entries_cost<I>(entries: I) -> u64
where
    I: IntoIterator<Item = RangeInclusive<u16>>,
{
    entries
        .into_iter()
        .map(|e| {
            if e.start() == e.end() {
                SINGLE_ENTRY_BITS
            } else {
                RANGE_ENTRY_BITS
            }
        })
        .sum::<u64>()
        + u64::from(NUM_ENTRIES_BITS)
}

/// Iterator over the runs of consecutive ids of a [`VendorSet`].
pub struct Runs<'a> {
    ids: Peekable<btree_set::Iter<'a, u16>>,
}

impl Iterator for Runs<'_> {
    type Item = RangeInclusive<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = *self.ids.next()?;
        let mut end = start;
        while let Some(&&id) = self.ids.peek() {
            if end.checked_add(1) != Some(id) {
                break;
            }
            end = id;
            self.ids.next();
        }

        Some(start..=end)
    }
}

impl FromIterator<u16> for VendorSet {
    fn from_iter<T: IntoIterator<Item = u16>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<u16> for VendorSet {
    fn extend<T: IntoIterator<Item = u16>>(&mut self, iter: T) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl<const N: usize> From<[u16; N]> for VendorSet {
    fn from(ids: [u16; N]) -> Self {
        Self::from_iter(ids)
    }
}

impl<'a> IntoIterator for &'a VendorSet {
    type Item = &'a u16;
    type IntoIter = btree_set::Iter<'a, u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
