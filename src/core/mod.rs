use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use std::iter::repeat_with;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub(crate) mod base64_url;

const CHAR_BITS: u32 = 6;
const DATETIME_BITS: u32 = 36;
const FIRST_CHAR: u8 = b'A';
const FALLBACK_CHAR: char = 'X';
const VEC_WRITE: &str = "write into vec should not fail";

/// Returned when a read asks for more bits than are left in the buffer.
///
/// Reads are all-or-nothing: a failed read does not consume anything.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("not enough bits left (requested {requested}, remaining {remaining})")]
pub struct NotEnoughBits {
    pub requested: u32,
    pub remaining: u64,
}

pub trait FromDataReader: Sized {
    type Err;

    fn from_data_reader(r: &mut DataReader<'_>) -> Result<Self, Self::Err>;
}

pub trait ToDataWriter {
    fn to_data_writer(&self, w: &mut DataWriter);
}

/// MSB-first reader over a fully buffered byte slice.
pub struct DataReader<'a> {
    bit_reader: BitReader<&'a [u8], BigEndian>,
    remaining: u64,
}

impl<'a> DataReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bit_reader: BitReader::endian(bytes, BigEndian),
            remaining: bytes.len() as u64 * 8,
        }
    }

    pub fn parse<F>(&mut self) -> Result<F, <F as FromDataReader>::Err>
    where
        F: FromDataReader,
    {
        FromDataReader::from_data_reader(self)
    }

    pub fn remaining_bits(&self) -> u64 {
        self.remaining
    }

    /// Reads an unsigned big-endian value of 0 to 64 bits.
    pub fn read_bits(&mut self, bits: u32) -> Result<u64, NotEnoughBits> {
        debug_assert!(bits <= u64::BITS);
        let err = NotEnoughBits {
            requested: bits,
            remaining: self.remaining,
        };
        if u64::from(bits) > self.remaining {
            return Err(err);
        }
        if bits == 0 {
            return Ok(0);
        }

        let value = self
            .bit_reader
            .read_unsigned_var::<u64>(bits)
            .map_err(|_| err)?;
        self.remaining -= u64::from(bits);

        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool, NotEnoughBits> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_flags<const N: usize>(&mut self) -> Result<[bool; N], NotEnoughBits> {
        let mut flags = [false; N];
        for flag in flags.iter_mut() {
            *flag = self.read_bit()?;
        }

        Ok(flags)
    }

    pub fn read_bools(&mut self, n: usize) -> Result<Vec<bool>, NotEnoughBits> {
        repeat_with(|| self.read_bit()).take(n).collect()
    }

    /// Reads `chars` letters stored as 6-bit offsets from `'A'`.
    pub fn read_string(&mut self, chars: usize) -> Result<String, NotEnoughBits> {
        repeat_with(|| self.read_bits(CHAR_BITS))
            .take(chars)
            .map(|r| r.map(|n| char::from(n as u8 + FIRST_CHAR)))
            .collect()
    }

    pub fn read_datetime(&mut self) -> Result<OffsetDateTime, NotEnoughBits> {
        Ok(datetime_from_deciseconds(self.read_bits(DATETIME_BITS)?))
    }
}

/// MSB-first writer accumulating into a byte buffer.
///
/// The trailing partial byte is zero-padded by [`into_bytes`](DataWriter::into_bytes).
pub struct DataWriter {
    bit_writer: BitWriter<Vec<u8>, BigEndian>,
}

impl DataWriter {
    pub fn new() -> Self {
        Self {
            bit_writer: BitWriter::endian(Vec::new(), BigEndian),
        }
    }

    pub fn write<T>(&mut self, value: &T)
    where
        T: ToDataWriter + ?Sized,
    {
        value.to_data_writer(self)
    }

    /// Appends the low `bits` bits of `value`, most significant bit first.
    pub fn append_bits(&mut self, value: u64, bits: u32) {
        debug_assert!(bits <= u64::BITS);
        if bits == 0 {
            return;
        }

        let value = if bits >= u64::BITS {
            value
        } else {
            value & ((1 << bits) - 1)
        };
        self.bit_writer
            .write_unsigned_var(bits, value)
            .expect(VEC_WRITE);
    }

    pub fn append_bit(&mut self, bit: bool) {
        self.bit_writer.write_bit(bit).expect(VEC_WRITE);
    }

    pub fn append_flags(&mut self, flags: &[bool]) {
        for &flag in flags {
            self.append_bit(flag);
        }
    }

    /// Appends `chars` 6-bit letters. A string which cannot be represented that way
    /// is replaced by `X`s.
    pub fn append_string(&mut self, s: &str, chars: usize) {
        if is_encodable_string(s, chars) {
            for c in s.chars() {
                self.append_bits(u64::from(c) - u64::from(FIRST_CHAR), CHAR_BITS);
            }
        } else {
            for _ in 0..chars {
                self.append_bits(u64::from(FALLBACK_CHAR) - u64::from(FIRST_CHAR), CHAR_BITS);
            }
        }
    }

    pub fn append_datetime(&mut self, datetime: &OffsetDateTime) {
        self.append_bits(deciseconds(datetime), DATETIME_BITS);
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.bit_writer.byte_align().expect(VEC_WRITE);
        self.bit_writer.into_writer()
    }
}

impl Default for DataWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_encodable_string(s: &str, chars: usize) -> bool {
    s.chars().count() == chars
        && s.chars()
            .all(|c| (u32::from(c)).wrapping_sub(u32::from(FIRST_CHAR)) < 1 << CHAR_BITS)
}

/// Returns `s` if it can be stored as `chars` 6-bit letters, or the fallback otherwise.
pub fn encodable_string(s: &str, chars: usize) -> String {
    if is_encodable_string(s, chars) {
        s.to_string()
    } else {
        repeat_with(|| FALLBACK_CHAR).take(chars).collect()
    }
}

pub fn datetime_from_deciseconds(ds: u64) -> OffsetDateTime {
    // a 36-bit value always fits
    OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(ds as i64 * 100)
}

/// Deciseconds since the Unix epoch, 0 for earlier dates.
pub fn deciseconds(datetime: &OffsetDateTime) -> u64 {
    u64::try_from(datetime.unix_timestamp_nanos() / 100_000_000).unwrap_or(0)
}

/// Current UTC time truncated to the decisecond resolution of the format.
pub fn now() -> OffsetDateTime {
    datetime_from_deciseconds(deciseconds(&OffsetDateTime::now_utc()))
}


#[cfg(test)]
mod tests {
    use super::testing::b;
    use super::*;
    use test_case::test_case;
    use time::macros::datetime;

    fn bits(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{b:08b}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test_case("00000001 00000010 00000011" => vec![1, 2, 3])]
    #[test_case("000000 010000 001000 000011" => vec![1, 2, 3])]
    #[test_case("000000 010000 001000 000011 1000" => vec![1, 2, 3, 128])]
    #[test_case("000000 010000 001000 000011 100" => vec![1, 2, 3, 128])]
    fn bytes(s: &str) -> Vec<u8> {
        b(s)
    }

    #[test]
    fn append_packs_across_bytes() {
        let mut w = DataWriter::new();
        assert!(w.bit_writer.byte_aligned());

        w.append_bits(1, 1);
        w.append_bits(0, 1);
        w.append_bits(9, 2); // only the low bits are kept
        w.append_bits(127, 3);
        w.append_bits(127, 3);
        w.append_bits(255, 8);

        assert_eq!(bits(&w.into_bytes()), "10011111 11111111 11000000");
    }

    #[test]
    fn append_wide_values() {
        let mut w = DataWriter::new();
        w.append_bits(1, 1);
        w.append_bits(256, 9);
        w.append_bits(1, 1);

        assert_eq!(bits(&w.into_bytes()), "11000000 00100000");
    }

    #[test]
    fn empty_writer() {
        assert!(DataWriter::new().into_bytes().is_empty());
    }

    #[test]
    fn read_sequence() {
        let buf = b("11100000 11100000 11100001 11100000");
        let mut r = DataReader::new(&buf);

        assert_eq!(r.read_bits(1), Ok(1));
        assert_eq!(r.read_bits(2), Ok(3));
        assert_eq!(r.read_bits(1), Ok(0));
        assert_eq!(r.read_bits(8), Ok(0b1110));
        assert_eq!(r.read_bits(4), Ok(0));
        assert_eq!(r.read_bits(7), Ok(0b1110000));
        assert_eq!(r.read_bits(8), Ok(0b11110000));
        assert_eq!(r.read_bits(1), Ok(0));
        assert_eq!(r.remaining_bits(), 0);
    }

    #[test]
    fn read_int_spanning_bytes() {
        let buf = b("11100000 11100000 11100000");
        let mut r = DataReader::new(&buf);

        assert_eq!(r.read_bits(1), Ok(1));
        assert_eq!(r.read_bits(16), Ok(0b1100000111000001));
    }

    #[test]
    fn read_past_end_consumes_nothing() {
        let buf = b("10101010");
        let mut r = DataReader::new(&buf);

        assert_eq!(r.read_bits(3), Ok(0b101));
        assert_eq!(
            r.read_bits(6),
            Err(NotEnoughBits {
                requested: 6,
                remaining: 5
            })
        );
        assert_eq!(r.remaining_bits(), 5);
        assert_eq!(r.read_bits(5), Ok(0b01010));
        assert!(r.read_bit().is_err());
    }

    #[test]
    fn read_from_empty() {
        let mut r = DataReader::new(&[]);
        assert_eq!(r.read_bits(0), Ok(0));
        assert!(r.read_bit().is_err());
    }

    #[test]
    fn all_widths_round_trip_at_every_offset() {
        for offset in 0..8 {
            for width in 1..=64u32 {
                let value = 0xA5C3_96F0_0F69_3C5Au64.rotate_left(width);
                let mut w = DataWriter::new();
                w.append_bits(u64::MAX, offset);
                w.append_bits(value, width);
                w.append_bits(0b101, 3);
                let buf = w.into_bytes();

                let mut r = DataReader::new(&buf);
                let mask = if width == 64 {
                    u64::MAX
                } else {
                    (1 << width) - 1
                };
                assert_eq!(r.read_bits(offset), Ok((1 << offset) - 1));
                assert_eq!(r.read_bits(width), Ok(value & mask), "width {width}");
                assert_eq!(r.read_bits(3), Ok(0b101));
            }
        }
    }

    #[test_case("101010", 1 => "k")]
    #[test_case("101010 101011", 2 => "kl")]
    #[test_case("000100 001101", 2 => "EN")]
    fn read_string(s: &str, chars: usize) -> String {
        DataReader::new(&b(s)).read_string(chars).unwrap()
    }

    #[test_case("EN" => "000100 001101")]
    #[test_case("AA" => "000000 000000")]
    #[test_case("E" => "010111 010111" ; "too short")]
    #[test_case("ENG" => "010111 010111" ; "too long")]
    #[test_case("é!" => "010111 010111" ; "out of range")]
    fn append_string(s: &str) -> String {
        let mut w = DataWriter::new();
        w.append_string(s, 2);
        let r = w.into_bytes();
        let all = bits(&r).replace(' ', "");
        format!("{} {}", &all[..6], &all[6..12])
    }

    #[test_case("EN" => "EN")]
    #[test_case("english" => "XX")]
    #[test_case("" => "XX")]
    fn encodable(s: &str) -> String {
        encodable_string(s, 2)
    }

    #[test]
    fn read_flags() {
        let buf = b("1010 1");
        let mut r = DataReader::new(&buf);
        assert_eq!(r.read_flags::<4>(), Ok([true, false, true, false]));
        assert_eq!(r.read_bools(2), Ok(vec![true, false]));
    }

    #[test_case("001110000100000101000100000000110010" => datetime!(2017-11-07 19:15:55.4 UTC) ; "with deciseconds")]
    #[test_case("000000000000000000000000000000000000" => OffsetDateTime::UNIX_EPOCH ; "epoch")]
    fn read_datetime(s: &str) -> OffsetDateTime {
        DataReader::new(&b(s)).read_datetime().unwrap()
    }

    #[test]
    fn datetime_round_trip() {
        let dt = datetime!(2020-01-26 17:01:00.3 UTC);
        let mut w = DataWriter::new();
        w.append_datetime(&dt);
        let buf = w.into_bytes();

        assert_eq!(DataReader::new(&buf).read_datetime(), Ok(dt));
    }

    #[test]
    fn datetime_before_epoch_is_zero() {
        assert_eq!(deciseconds(&datetime!(1969-12-31 23:59:59 UTC)), 0);
    }

    #[test]
    fn now_is_truncated() {
        assert_eq!(now().nanosecond() % 100_000_000, 0);
    }
}
