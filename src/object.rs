//! Object headers and decoded object values.
//!
//! An object header is `group, variation, qualifier` followed by a range or
//! count field. The qualifier packs a prefix code (high nibble) and a range
//! specifier (low nibble):
//!
//! | prefix | meaning | range spec | meaning |
//! |---|---|---|---|
//! | 0 | no prefix | 0/1/2 | start,stop index (8/16/32-bit) |
//! | 1/2/3 | 1/2/4-byte index per object | 3/4/5 | start,stop address |
//! | 4/5/6 | 1/2/4-byte size per object | 6 | all objects, no range field |
//! | | | 7/8/9 | count (8/16/32-bit) |
//! | | | 0xB | count of variable-size objects (8-bit) |

use byteorder::{ByteOrder, LittleEndian};

/// Width of an index, size, range or count field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    One,
    Two,
    Four,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::One => 1,
            Width::Two => 2,
            Width::Four => 4,
        }
    }

    fn from_index(i: u8) -> Self {
        match i {
            0 => Width::One,
            1 => Width::Two,
            _ => Width::Four,
        }
    }

    fn index(self) -> u8 {
        match self {
            Width::One => 0,
            Width::Two => 1,
            Width::Four => 2,
        }
    }

    pub fn max(self) -> u32 {
        match self {
            Width::One => u8::MAX as u32,
            Width::Two => u16::MAX as u32,
            Width::Four => u32::MAX,
        }
    }

    pub(crate) fn write(self, out: &mut Vec<u8>, v: u32) {
        let mut buf = [0u8; 4];
        let n = self.bytes();
        match self {
            Width::One => buf[0] = v as u8,
            Width::Two => LittleEndian::write_u16(&mut buf[..2], v as u16),
            Width::Four => LittleEndian::write_u32(&mut buf, v),
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixCode {
    None,
    Index(Width),
    Size(Width),
}

impl PrefixCode {
    /// Decode prefix codes 0..=6; 7 is reserved.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PrefixCode::None),
            1..=3 => Some(PrefixCode::Index(Width::from_index(code - 1))),
            4..=6 => Some(PrefixCode::Size(Width::from_index(code - 4))),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PrefixCode::None => 0,
            PrefixCode::Index(w) => 1 + w.index(),
            PrefixCode::Size(w) => 4 + w.index(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSpec {
    Index(Width),
    Address(Width),
    All,
    Count(Width),
    /// Count of variable-size objects.
    FreeCount,
}

impl RangeSpec {
    /// Decode range specifiers; 0xA and 0xC..=0xF are reserved.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0..=2 => Some(RangeSpec::Index(Width::from_index(code))),
            3..=5 => Some(RangeSpec::Address(Width::from_index(code - 3))),
            6 => Some(RangeSpec::All),
            7..=9 => Some(RangeSpec::Count(Width::from_index(code - 7))),
            0xB => Some(RangeSpec::FreeCount),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RangeSpec::Index(w) => w.index(),
            RangeSpec::Address(w) => 3 + w.index(),
            RangeSpec::All => 6,
            RangeSpec::Count(w) => 7 + w.index(),
            RangeSpec::FreeCount => 0xB,
        }
    }

    pub fn is_range(self) -> bool {
        matches!(self, RangeSpec::Index(_) | RangeSpec::Address(_))
    }
}

/// Build a qualifier octet.
pub fn qualifier(prefix: PrefixCode, range: RangeSpec) -> u8 {
    prefix.code() << 4 | range.code()
}

/// One object header with its indexes and decoded objects.
///
/// `indexes` and `objects`, when present, always hold exactly `count`
/// entries. Read-style headers carry neither.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBlock {
    pub group: u8,
    pub variation: u8,
    pub prefix: PrefixCode,
    pub range: RangeSpec,
    /// Number of objects; zero for "all objects" headers.
    pub count: u32,
    /// First index/address of a range header.
    pub range_base: Option<u32>,
    pub indexes: Option<Vec<u32>>,
    pub objects: Option<Vec<Object>>,
}

impl ObjectBlock {
    pub fn qualifier(&self) -> u8 {
        qualifier(self.prefix, self.range)
    }

    /// Last index/address of a range header.
    pub fn range_stop(&self) -> Option<u32> {
        let base = self.range_base?;
        base.checked_add(self.count.checked_sub(1)?)
    }

    /// Write group, variation, qualifier and range/count field.
    pub fn encode_header(&self, out: &mut Vec<u8>) {
        out.push(self.group);
        out.push(self.variation);
        out.push(self.qualifier());
        match self.range {
            RangeSpec::Index(w) | RangeSpec::Address(w) => {
                let start = self.range_base.unwrap_or(0);
                w.write(out, start);
                w.write(out, self.range_stop().unwrap_or(start));
            }
            RangeSpec::All => {}
            RangeSpec::Count(w) => w.write(out, self.count),
            RangeSpec::FreeCount => Width::One.write(out, self.count),
        }
    }

    /// Encode the whole block. `write_object` serialises one object; packed
    /// bit objects are packed here and never passed to it.
    pub fn encode_with(&self, out: &mut Vec<u8>, mut write_object: impl FnMut(&Object, &mut Vec<u8>)) {
        self.encode_header(out);
        let objects = self.objects.as_deref().unwrap_or(&[]);
        match self.prefix {
            PrefixCode::None => {
                if let Some(bits) = packed_width(objects) {
                    pack(objects, bits, out);
                } else {
                    for obj in objects {
                        write_object(obj, out);
                    }
                }
            }
            PrefixCode::Index(w) => {
                let indexes = self.indexes.as_deref().unwrap_or(&[]);
                for (i, index) in indexes.iter().enumerate() {
                    w.write(out, *index);
                    if let Some(obj) = objects.get(i) {
                        write_object(obj, out);
                    }
                }
            }
            PrefixCode::Size(w) => {
                let mut buf = Vec::new();
                for obj in objects {
                    buf.clear();
                    write_object(obj, &mut buf);
                    w.write(out, buf.len() as u32);
                    out.extend_from_slice(&buf);
                }
            }
        }
    }
}

fn packed_width(objects: &[Object]) -> Option<u8> {
    match objects.first()? {
        Object::Bit(_) => Some(1),
        Object::DoubleBit(_) => Some(2),
        _ => None,
    }
}

fn pack(objects: &[Object], bits: u8, out: &mut Vec<u8>) {
    let per_byte = (8 / bits) as usize;
    for chunk in objects.chunks(per_byte) {
        let mut byte = 0u8;
        for (i, obj) in chunk.iter().enumerate() {
            let v = match obj {
                Object::Bit(b) => *b as u8,
                Object::DoubleBit(d) => *d as u8,
                _ => 0,
            };
            byte |= v << (i as u8 * bits);
        }
        out.push(byte);
    }
}

/// Two-bit state of a double-bit binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DoubleBit {
    Intermediate = 0,
    Off = 1,
    On = 2,
    Indeterminate = 3,
}

impl DoubleBit {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => DoubleBit::Intermediate,
            1 => DoubleBit::Off,
            2 => DoubleBit::On,
            _ => DoubleBit::Indeterminate,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DoubleBit::Intermediate => "intermediate",
            DoubleBit::Off => "off",
            DoubleBit::On => "on",
            DoubleBit::Indeterminate => "indeterminate",
        }
    }
}

/// Control relay output block (g12v1) / pattern control block (g12v2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crob {
    pub code: u8,
    pub count: u8,
    pub on_time: u32,
    pub off_time: u32,
    pub status: u8,
}

impl Crob {
    pub fn op_type(&self) -> u8 {
        self.code & 0x0F
    }

    pub fn queue(&self) -> bool {
        self.code & 0x10 != 0
    }

    pub fn clear(&self) -> bool {
        self.code & 0x20 != 0
    }

    /// Trip/close code.
    pub fn tcc(&self) -> u8 {
        self.code >> 6
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalogValue {
    Int(i32),
    Float(f64),
}

/// A decoded object. Which variant appears is fixed by (group, variation).
///
/// Times are 48-bit milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Packed single bit (g1v1, g10v1, g12v3, g80v1).
    Bit(bool),
    /// Packed double bit (g3v1).
    DoubleBit(DoubleBit),
    /// Flags octet carrying state (g1v2, g3v2, g10v2, event without time).
    Flags(u8),
    FlagsTime { flags: u8, time: u64 },
    /// Event with time relative to a preceding CTO object.
    FlagsRelTime { flags: u8, time: u16 },
    Counter { flags: Option<u8>, value: u32, time: Option<u64> },
    AnalogInt { flags: Option<u8>, value: i64, time: Option<u64> },
    AnalogFloat { flags: Option<u8>, value: f64, time: Option<u64> },
    Command(Crob),
    /// Analog output command (g41) or command event (g43).
    AnalogOutput { status: u8, value: AnalogValue, time: Option<u64> },
    Time(u64),
    TimeInterval { time: u64, interval: u32, units: Option<u8> },
    /// Delay measurement in milliseconds.
    Delay(u32),
    /// Device attribute (g0).
    Attribute { data_type: u8, value: Vec<u8> },
    /// Aggressive-mode request header (g120v3).
    AggressiveMode { csq: u32, user: u16 },
    Octets(Vec<u8>),
}
