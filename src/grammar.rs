//! Object grammar engine: decodes one object header and its objects.
//!
//! Parsing is split in two phases. **Selection** reads the two-byte
//! group/variation discriminant and looks it up in a [`FunctionGrammar`]; a
//! miss yields the grammar's "unknown" error (normally `OBJ_UNKNOWN`).
//! **Validation** ([`parse_block`]) then decodes everything after the
//! discriminant against the selected [`ObjectSpec`]. Validation has no way to
//! report anything but `PARAM_ERROR`: a selected branch never falls back to a
//! sibling alternative.

use crate::error::ErrorKind;
use crate::object::{DoubleBit, Object, ObjectBlock, PrefixCode, RangeSpec, Width};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::ops::BitOr;

pub type Reader<'a> = Cursor<&'a [u8]>;

/// How the payload of one object is laid out.
#[derive(Clone, Copy)]
pub enum Decoder {
    /// Fixed or self-delimiting layout read from the cursor.
    Fixed(fn(&mut Reader<'_>) -> Result<Object, ErrorKind>),
    /// Octet string of exactly this many bytes.
    Octets(usize),
    /// Bit-packed, LSB first, with this many bits per object (1 or 2).
    Packed(u8),
    /// Free-format object whose length comes from a size prefix.
    Sized(fn(&[u8]) -> Result<Object, ErrorKind>),
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoder::Fixed(_) => f.write_str("Fixed"),
            Decoder::Octets(n) => write!(f, "Octets({})", n),
            Decoder::Packed(bits) => write!(f, "Packed({})", bits),
            Decoder::Sized(_) => f.write_str("Sized"),
        }
    }
}

/// Set of qualifier forms an object accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qualifiers(u8);

impl Qualifiers {
    pub const NONE: Qualifiers = Qualifiers(0);
    /// Prefix 0 with an index or address range (0x00..=0x05).
    pub const RANGE: Qualifiers = Qualifiers(0x01);
    /// Prefix 0, all objects (0x06).
    pub const ALL: Qualifiers = Qualifiers(0x02);
    /// Prefix 0 with a count (0x07..=0x09).
    pub const COUNT: Qualifiers = Qualifiers(0x04);
    /// Index prefix with a count (0x17, 0x28, 0x39, ...).
    pub const INDEXED: Qualifiers = Qualifiers(0x08);
    /// Size prefix with a free-format count (0x4B, 0x5B, 0x6B).
    pub const FREE: Qualifiers = Qualifiers(0x10);
    pub const ANY: Qualifiers = Qualifiers(0x1F);

    pub const fn or(self, other: Qualifiers) -> Qualifiers {
        Qualifiers(self.0 | other.0)
    }

    pub fn contains(self, other: Qualifiers) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether this set admits the given prefix/range combination.
    pub fn allows(self, prefix: PrefixCode, range: RangeSpec) -> bool {
        let form = match (prefix, range) {
            (PrefixCode::None, r) if r.is_range() => Qualifiers::RANGE,
            (PrefixCode::None, RangeSpec::All) => Qualifiers::ALL,
            (PrefixCode::None, RangeSpec::Count(_)) => Qualifiers::COUNT,
            (PrefixCode::Index(_), RangeSpec::Count(_)) => Qualifiers::INDEXED,
            (PrefixCode::Size(_), RangeSpec::FreeCount) => Qualifiers::FREE,
            _ => return false,
        };
        self.contains(form)
    }
}

impl BitOr for Qualifiers {
    type Output = Qualifiers;

    fn bitor(self, rhs: Qualifiers) -> Qualifiers {
        self.or(rhs)
    }
}

/// One catalogue entry: a group/variation, the qualifiers it may appear
/// with, and its payload decoder. No decoder means the header carries no
/// object data (read-style requests).
#[derive(Debug, Clone, Copy)]
pub struct ObjectSpec {
    pub group: u8,
    pub variation: u8,
    pub qualifiers: Qualifiers,
    pub decoder: Option<Decoder>,
}

/// The object grammar of one function code.
#[derive(Debug, Clone)]
pub struct FunctionGrammar {
    objects: HashMap<(u8, u8), ObjectSpec>,
    /// Error for a group/variation this grammar does not know.
    pub unknown: ErrorKind,
    /// Whether the aggressive-mode authentication wrapper may surround the objects.
    pub aggressive: bool,
}

impl FunctionGrammar {
    pub fn new() -> Self {
        FunctionGrammar { objects: HashMap::new(), unknown: ErrorKind::ObjUnknown, aggressive: true }
    }

    pub fn insert(&mut self, spec: ObjectSpec) {
        self.objects.insert((spec.group, spec.variation), spec);
    }

    pub fn lookup(&self, group: u8, variation: u8) -> Option<&ObjectSpec> {
        self.objects.get(&(group, variation))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Select by discriminant, then validate. Errors after selection are final.
    pub fn parse_block(&self, r: &mut Reader<'_>) -> Result<ObjectBlock, ErrorKind> {
        let (group, variation) = read_discriminant(r)?;
        let spec = self.lookup(group, variation).ok_or(self.unknown)?;
        parse_block(spec, r)
    }
}

impl Default for FunctionGrammar {
    fn default() -> Self {
        Self::new()
    }
}

/// Peek at the next discriminant without consuming it.
pub fn peek_discriminant(r: &Reader<'_>) -> Option<(u8, u8)> {
    let rest = remaining(r);
    Some((*rest.first()?, *rest.get(1)?))
}

/// Read group and variation. A lone trailing byte is a truncated header.
pub fn read_discriminant(r: &mut Reader<'_>) -> Result<(u8, u8), ErrorKind> {
    let group = r.read_u8().map_err(|_| ErrorKind::ParamError)?;
    let variation = r.read_u8().map_err(|_| ErrorKind::ParamError)?;
    Ok((group, variation))
}

pub fn remaining<'a>(r: &Reader<'a>) -> &'a [u8] {
    let data: &'a [u8] = *r.get_ref();
    let pos = (r.position() as usize).min(data.len());
    &data[pos..]
}

fn read_width(r: &mut Reader<'_>, w: Width) -> Result<u32, ErrorKind> {
    Ok(match w {
        Width::One => r.read_u8()? as u32,
        Width::Two => r.read_u16::<LittleEndian>()? as u32,
        Width::Four => r.read_u32::<LittleEndian>()?,
    })
}

fn read_count(r: &mut Reader<'_>, w: Width) -> Result<u32, ErrorKind> {
    match read_width(r, w)? {
        0 => Err(ErrorKind::ParamError),
        n => Ok(n),
    }
}

/// Validate and decode everything after the discriminant: qualifier,
/// range/count field, prefixes and objects. Every failure is `PARAM_ERROR`.
pub fn parse_block(spec: &ObjectSpec, r: &mut Reader<'_>) -> Result<ObjectBlock, ErrorKind> {
    let q = r.read_u8()?;
    if q & 0x80 != 0 {
        return Err(ErrorKind::ParamError);
    }
    let prefix = PrefixCode::from_code(q >> 4).ok_or(ErrorKind::ParamError)?;
    let range = RangeSpec::from_code(q & 0x0F).ok_or(ErrorKind::ParamError)?;
    if !spec.qualifiers.allows(prefix, range) {
        return Err(ErrorKind::ParamError);
    }

    let mut block = ObjectBlock {
        group: spec.group,
        variation: spec.variation,
        prefix,
        range,
        count: 0,
        range_base: None,
        indexes: None,
        objects: None,
    };

    match (prefix, range) {
        (PrefixCode::None, RangeSpec::Index(w) | RangeSpec::Address(w)) => {
            let start = read_width(r, w)?;
            let stop = read_width(r, w)?;
            if start > stop {
                return Err(ErrorKind::ParamError);
            }
            // stop - start + 1 overflows only for the full 32-bit range.
            block.count = (stop - start).checked_add(1).ok_or(ErrorKind::ParamError)?;
            block.range_base = Some(start);
            if let Some(d) = spec.decoder {
                block.objects = Some(decode_run(d, block.count, r)?);
            }
        }
        (PrefixCode::None, RangeSpec::All) => {}
        (PrefixCode::None, RangeSpec::Count(w)) => {
            block.count = read_count(r, w)?;
            if let Some(d) = spec.decoder {
                block.objects = Some(decode_run(d, block.count, r)?);
            }
        }
        (PrefixCode::Index(pw), RangeSpec::Count(w)) => {
            block.count = read_count(r, w)?;
            let (indexes, objects) = decode_indexed(spec.decoder, pw, block.count, r)?;
            block.indexes = Some(indexes);
            block.objects = objects;
        }
        (PrefixCode::Size(pw), RangeSpec::FreeCount) => {
            block.count = read_count(r, Width::One)?;
            let d = spec.decoder.ok_or(ErrorKind::ParamError)?;
            block.objects = Some(decode_sized(d, pw, block.count, r)?);
        }
        _ => return Err(ErrorKind::ParamError),
    }
    Ok(block)
}

/// Preallocation bound: never reserve more slots than bytes remain.
fn capacity_hint(count: u32, r: &Reader<'_>) -> usize {
    (count as usize).min(remaining(r).len())
}

/// Decode `count` consecutive objects.
fn decode_run(d: Decoder, count: u32, r: &mut Reader<'_>) -> Result<Vec<Object>, ErrorKind> {
    match d {
        Decoder::Packed(bits) => decode_packed(bits, count, r),
        Decoder::Sized(_) => Err(ErrorKind::ParamError),
        _ => {
            let mut objects = Vec::with_capacity(capacity_hint(count, r));
            for _ in 0..count {
                objects.push(decode_one(d, r)?);
            }
            Ok(objects)
        }
    }
}

fn decode_one(d: Decoder, r: &mut Reader<'_>) -> Result<Object, ErrorKind> {
    match d {
        Decoder::Fixed(f) => f(r),
        Decoder::Octets(n) => {
            if remaining(r).len() < n {
                return Err(ErrorKind::ParamError);
            }
            let mut buf = vec![0u8; n];
            r.read_exact(&mut buf)?;
            Ok(Object::Octets(buf))
        }
        Decoder::Packed(_) | Decoder::Sized(_) => Err(ErrorKind::ParamError),
    }
}

/// Unpack `count` objects of `bits` bits each; unused bits of the last byte
/// must be zero.
fn decode_packed(bits: u8, count: u32, r: &mut Reader<'_>) -> Result<Vec<Object>, ErrorKind> {
    let total_bits = count as u64 * bits as u64;
    let nbytes = ((total_bits + 7) / 8) as usize;
    let rest = remaining(r);
    if rest.len() < nbytes {
        return Err(ErrorKind::ParamError);
    }
    let packed = &rest[..nbytes];
    let used = (total_bits % 8) as u8;
    if used != 0 && packed[nbytes - 1] >> used != 0 {
        return Err(ErrorKind::ParamError);
    }

    let mask = (1u8 << bits) - 1;
    let per_byte = (8 / bits) as usize;
    let objects = (0..count as usize)
        .map(|i| {
            let v = (packed[i / per_byte] >> ((i % per_byte) as u8 * bits)) & mask;
            if bits == 1 {
                Object::Bit(v != 0)
            } else {
                Object::DoubleBit(DoubleBit::from_bits(v))
            }
        })
        .collect();
    r.set_position(r.position() + nbytes as u64);
    Ok(objects)
}

type Indexed = (Vec<u32>, Option<Vec<Object>>);

/// `count` (index, object) pairs; index only when there is no decoder.
fn decode_indexed(d: Option<Decoder>, pw: Width, count: u32, r: &mut Reader<'_>) -> Result<Indexed, ErrorKind> {
    if matches!(d, Some(Decoder::Packed(_)) | Some(Decoder::Sized(_))) {
        return Err(ErrorKind::ParamError);
    }
    let hint = capacity_hint(count, r) / pw.bytes();
    let mut indexes = Vec::with_capacity(hint);
    let mut objects = d.map(|_| Vec::with_capacity(hint));
    for _ in 0..count {
        indexes.push(read_width(r, pw)?);
        if let (Some(d), Some(objects)) = (d, objects.as_mut()) {
            objects.push(decode_one(d, r)?);
        }
    }
    Ok((indexes, objects))
}

/// `count` (size, payload) pairs; each payload must be consumed exactly.
fn decode_sized(d: Decoder, pw: Width, count: u32, r: &mut Reader<'_>) -> Result<Vec<Object>, ErrorKind> {
    let mut objects = Vec::with_capacity(capacity_hint(count, r));
    for _ in 0..count {
        let size = read_width(r, pw)? as usize;
        let rest = remaining(r);
        if rest.len() < size {
            return Err(ErrorKind::ParamError);
        }
        let body = &rest[..size];
        let obj = match d {
            Decoder::Sized(f) => f(body)?,
            Decoder::Octets(n) if n == size => Object::Octets(body.to_vec()),
            Decoder::Fixed(f) => {
                let mut sub = Cursor::new(body);
                let obj = f(&mut sub)?;
                if sub.position() as usize != size {
                    return Err(ErrorKind::ParamError);
                }
                obj
            }
            _ => return Err(ErrorKind::ParamError),
        };
        r.set_position(r.position() + size as u64);
        objects.push(obj);
    }
    Ok(objects)
}
