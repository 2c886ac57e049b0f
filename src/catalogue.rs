//! Object catalogue and per-function grammars.
//!
//! [`layout`] maps every known group/variation to the decoder for its
//! payload. A [`Catalogue`] then assigns each [`FunctionCode`] the set of
//! objects (and qualifier forms) it may carry. The standard catalogue is
//! built once and shared read-only.

use crate::app::{FunctionCode, AGGRESSIVE_MODE, AUTH_MAC};
use crate::config::ConfirmPolicy;
use crate::error::ErrorKind;
use crate::grammar::{Decoder, FunctionGrammar, ObjectSpec, Qualifiers, Reader};
use crate::object::{AnalogValue, Crob, Object};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, OnceLock};

// Reserved bits of the various flag and status octets.
const BI_RESERVED: u8 = 0x40;
const BO_RESERVED: u8 = 0x60;
const COUNTER_RESERVED: u8 = 0x80;
const ANALOG_RESERVED: u8 = 0x80;
const STATUS_RESERVED: u8 = 0x80;

fn flags(r: &mut Reader<'_>, reserved: u8) -> Result<u8, ErrorKind> {
    let f = r.read_u8()?;
    if f & reserved != 0 {
        return Err(ErrorKind::ParamError);
    }
    Ok(f)
}

fn time48(r: &mut Reader<'_>) -> Result<u64, ErrorKind> {
    Ok(r.read_u48::<LittleEndian>()?)
}

fn flags_only(r: &mut Reader<'_>, reserved: u8) -> Result<Object, ErrorKind> {
    Ok(Object::Flags(flags(r, reserved)?))
}

fn flags_time(r: &mut Reader<'_>, reserved: u8) -> Result<Object, ErrorKind> {
    let flags = flags(r, reserved)?;
    Ok(Object::FlagsTime { flags, time: time48(r)? })
}

fn flags_rel_time(r: &mut Reader<'_>, reserved: u8) -> Result<Object, ErrorKind> {
    let flags = flags(r, reserved)?;
    Ok(Object::FlagsRelTime { flags, time: r.read_u16::<LittleEndian>()? })
}

fn counter(r: &mut Reader<'_>, flagged: bool, wide: bool, timed: bool) -> Result<Object, ErrorKind> {
    let flags = if flagged { Some(flags(r, COUNTER_RESERVED)?) } else { None };
    let value = if wide { r.read_u32::<LittleEndian>()? } else { r.read_u16::<LittleEndian>()? as u32 };
    let time = if timed { Some(time48(r)?) } else { None };
    Ok(Object::Counter { flags, value, time })
}

fn analog_int(r: &mut Reader<'_>, flagged: bool, wide: bool, timed: bool) -> Result<Object, ErrorKind> {
    let flags = if flagged { Some(flags(r, ANALOG_RESERVED)?) } else { None };
    let value = if wide { r.read_i32::<LittleEndian>()? as i64 } else { r.read_i16::<LittleEndian>()? as i64 };
    let time = if timed { Some(time48(r)?) } else { None };
    Ok(Object::AnalogInt { flags, value, time })
}

fn analog_float(r: &mut Reader<'_>, flagged: bool, double: bool, timed: bool) -> Result<Object, ErrorKind> {
    let flags = if flagged { Some(flags(r, ANALOG_RESERVED)?) } else { None };
    let value = if double { r.read_f64::<LittleEndian>()? } else { r.read_f32::<LittleEndian>()? as f64 };
    let time = if timed { Some(time48(r)?) } else { None };
    Ok(Object::AnalogFloat { flags, value, time })
}

/// Unsigned deadbands (g34v1, g34v2).
fn deadband(r: &mut Reader<'_>, wide: bool) -> Result<Object, ErrorKind> {
    let value = if wide { r.read_u32::<LittleEndian>()? as i64 } else { r.read_u16::<LittleEndian>()? as i64 };
    Ok(Object::AnalogInt { flags: None, value, time: None })
}

fn crob(r: &mut Reader<'_>) -> Result<Object, ErrorKind> {
    let code = r.read_u8()?;
    let count = r.read_u8()?;
    let on_time = r.read_u32::<LittleEndian>()?;
    let off_time = r.read_u32::<LittleEndian>()?;
    let status = flags(r, STATUS_RESERVED)?;
    Ok(Object::Command(Crob { code, count, on_time, off_time, status }))
}

/// g41 analog output block: value, then status.
fn analog_command(r: &mut Reader<'_>, variation: u8) -> Result<Object, ErrorKind> {
    let value = match variation {
        1 => AnalogValue::Int(r.read_i32::<LittleEndian>()?),
        2 => AnalogValue::Int(r.read_i16::<LittleEndian>()? as i32),
        3 => AnalogValue::Float(r.read_f32::<LittleEndian>()? as f64),
        _ => AnalogValue::Float(r.read_f64::<LittleEndian>()?),
    };
    let status = flags(r, STATUS_RESERVED)?;
    Ok(Object::AnalogOutput { status, value, time: None })
}

/// g43 analog command event: status, value, optional time.
fn analog_command_event(r: &mut Reader<'_>, variation: u8) -> Result<Object, ErrorKind> {
    let status = flags(r, STATUS_RESERVED)?;
    let value = match variation {
        1 | 3 => AnalogValue::Int(r.read_i32::<LittleEndian>()?),
        2 | 4 => AnalogValue::Int(r.read_i16::<LittleEndian>()? as i32),
        5 | 7 => AnalogValue::Float(r.read_f32::<LittleEndian>()? as f64),
        _ => AnalogValue::Float(r.read_f64::<LittleEndian>()?),
    };
    let time = if matches!(variation, 3 | 4 | 7 | 8) { Some(time48(r)?) } else { None };
    Ok(Object::AnalogOutput { status, value, time })
}

fn attribute(r: &mut Reader<'_>) -> Result<Object, ErrorKind> {
    let data_type = r.read_u8()?;
    let len = r.read_u8()? as usize;
    let mut value = vec![0u8; len];
    r.read_exact(&mut value)?;
    Ok(Object::Attribute { data_type, value })
}

fn time_interval(r: &mut Reader<'_>, with_units: bool) -> Result<Object, ErrorKind> {
    let time = time48(r)?;
    let interval = r.read_u32::<LittleEndian>()?;
    let units = if with_units { Some(r.read_u8()?) } else { None };
    Ok(Object::TimeInterval { time, interval, units })
}

fn aggressive_mode(r: &mut Reader<'_>) -> Result<Object, ErrorKind> {
    let csq = r.read_u32::<LittleEndian>()?;
    let user = r.read_u16::<LittleEndian>()?;
    Ok(Object::AggressiveMode { csq, user })
}

fn octets(body: &[u8]) -> Result<Object, ErrorKind> {
    Ok(Object::Octets(body.to_vec()))
}

/// The payload decoder of a group/variation, or `None` if it has no data
/// form (class data, "any variation" requests) or is unknown.
pub fn layout(group: u8, variation: u8) -> Option<Decoder> {
    use Decoder::{Fixed, Octets, Packed, Sized};
    let d = match (group, variation) {
        (0, 209..=255) => Fixed(attribute),

        (1, 1) => Packed(1),
        (1, 2) => Fixed(|r| flags_only(r, BI_RESERVED)),
        (2, 1) => Fixed(|r| flags_only(r, BI_RESERVED)),
        (2, 2) => Fixed(|r| flags_time(r, BI_RESERVED)),
        (2, 3) => Fixed(|r| flags_rel_time(r, BI_RESERVED)),

        (3, 1) => Packed(2),
        (3, 2) | (4, 1) => Fixed(|r| flags_only(r, 0)),
        (4, 2) => Fixed(|r| flags_time(r, 0)),
        (4, 3) => Fixed(|r| flags_rel_time(r, 0)),

        (10, 1) => Packed(1),
        (10, 2) | (11, 1) => Fixed(|r| flags_only(r, BO_RESERVED)),
        (11, 2) => Fixed(|r| flags_time(r, BO_RESERVED)),

        (12, 1) | (12, 2) => Fixed(crob),
        (12, 3) => Packed(1),
        (13, 1) => Fixed(|r| flags_only(r, 0)),
        (13, 2) => Fixed(|r| flags_time(r, 0)),

        (20, 1) | (21, 1) | (22, 1) | (23, 1) => Fixed(|r| counter(r, true, true, false)),
        (20, 2) | (21, 2) | (22, 2) | (23, 2) => Fixed(|r| counter(r, true, false, false)),
        (20, 5) | (21, 9) => Fixed(|r| counter(r, false, true, false)),
        (20, 6) | (21, 10) => Fixed(|r| counter(r, false, false, false)),
        (21, 5) | (22, 5) | (23, 5) => Fixed(|r| counter(r, true, true, true)),
        (21, 6) | (22, 6) | (23, 6) => Fixed(|r| counter(r, true, false, true)),

        (30, 1) | (32, 1) | (40, 1) | (42, 1) => Fixed(|r| analog_int(r, true, true, false)),
        (30, 2) | (32, 2) | (40, 2) | (42, 2) => Fixed(|r| analog_int(r, true, false, false)),
        (30, 3) => Fixed(|r| analog_int(r, false, true, false)),
        (30, 4) => Fixed(|r| analog_int(r, false, false, false)),
        (30, 5) | (32, 5) | (40, 3) | (42, 5) => Fixed(|r| analog_float(r, true, false, false)),
        (30, 6) | (32, 6) | (40, 4) | (42, 6) => Fixed(|r| analog_float(r, true, true, false)),
        (32, 3) | (42, 3) => Fixed(|r| analog_int(r, true, true, true)),
        (32, 4) | (42, 4) => Fixed(|r| analog_int(r, true, false, true)),
        (32, 7) | (42, 7) => Fixed(|r| analog_float(r, true, false, true)),
        (32, 8) | (42, 8) => Fixed(|r| analog_float(r, true, true, true)),

        (34, 1) => Fixed(|r| deadband(r, false)),
        (34, 2) => Fixed(|r| deadband(r, true)),
        (34, 3) => Fixed(|r| analog_float(r, false, false, false)),

        (41, 1) => Fixed(|r| analog_command(r, 1)),
        (41, 2) => Fixed(|r| analog_command(r, 2)),
        (41, 3) => Fixed(|r| analog_command(r, 3)),
        (41, 4) => Fixed(|r| analog_command(r, 4)),
        (43, 1) => Fixed(|r| analog_command_event(r, 1)),
        (43, 2) => Fixed(|r| analog_command_event(r, 2)),
        (43, 3) => Fixed(|r| analog_command_event(r, 3)),
        (43, 4) => Fixed(|r| analog_command_event(r, 4)),
        (43, 5) => Fixed(|r| analog_command_event(r, 5)),
        (43, 6) => Fixed(|r| analog_command_event(r, 6)),
        (43, 7) => Fixed(|r| analog_command_event(r, 7)),
        (43, 8) => Fixed(|r| analog_command_event(r, 8)),

        (50, 1) | (50, 3) | (51, 1) | (51, 2) => Fixed(|r| Ok(Object::Time(time48(r)?))),
        (50, 2) => Fixed(|r| time_interval(r, false)),
        (50, 4) => Fixed(|r| time_interval(r, true)),
        (52, 1) => Fixed(|r| Ok(Object::Delay(r.read_u16::<LittleEndian>()? as u32 * 1000))),
        (52, 2) => Fixed(|r| Ok(Object::Delay(r.read_u16::<LittleEndian>()? as u32))),

        (70, 2..=8) | (90, 1) => Sized(octets),
        (80, 1) => Packed(1),

        // Octet strings and virtual terminal blocks: the variation is the length.
        (110..=113, v @ 1..=255) => Octets(v as usize),

        (120, 3) => Fixed(aggressive_mode),
        (120, 4) => Octets(2),
        (120, 1..=15) => Sized(octets),
        _ => return None,
    };
    Some(d)
}

const DATA: Qualifiers = Qualifiers::RANGE.or(Qualifiers::INDEXED);
const EVENT: Qualifiers = Qualifiers::COUNT.or(Qualifiers::INDEXED);
const REQUEST: Qualifiers = Qualifiers::RANGE.or(Qualifiers::ALL).or(Qualifiers::COUNT).or(Qualifiers::INDEXED);

/// Add `group` at each variation, decoding payloads with [`layout`].
fn with_data(g: &mut FunctionGrammar, group: u8, variations: impl IntoIterator<Item = u8>, qualifiers: Qualifiers) {
    for variation in variations {
        g.insert(ObjectSpec { group, variation, qualifiers, decoder: layout(group, variation) });
    }
}

/// Add `group` at each variation as a header-only (request) object.
fn header_only(g: &mut FunctionGrammar, group: u8, variations: impl IntoIterator<Item = u8>, qualifiers: Qualifiers) {
    for variation in variations {
        g.insert(ObjectSpec { group, variation, qualifiers, decoder: None });
    }
}

/// Data variations a READ may name, including variation 0 ("any").
const READ_VARIATIONS: &[(u8, &[u8])] = &[
    (1, &[0, 1, 2]),
    (2, &[0, 1, 2, 3]),
    (3, &[0, 1, 2]),
    (4, &[0, 1, 2, 3]),
    (10, &[0, 1, 2]),
    (11, &[0, 1, 2]),
    (13, &[0, 1, 2]),
    (20, &[0, 1, 2, 5, 6]),
    (21, &[0, 1, 2, 5, 6, 9, 10]),
    (22, &[0, 1, 2, 5, 6]),
    (23, &[0, 1, 2, 5, 6]),
    (30, &[0, 1, 2, 3, 4, 5, 6]),
    (32, &[0, 1, 2, 3, 4, 5, 6, 7, 8]),
    (34, &[0, 1, 2, 3]),
    (40, &[0, 1, 2, 3, 4]),
    (42, &[0, 1, 2, 3, 4, 5, 6, 7, 8]),
    (43, &[0, 1, 2, 3, 4, 5, 6, 7, 8]),
    (110, &[0]),
    (111, &[0]),
    (113, &[0]),
];

fn read_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    header_only(&mut g, 0, 209..=255, Qualifiers::RANGE | Qualifiers::ALL);
    for &(group, variations) in READ_VARIATIONS {
        header_only(&mut g, group, variations.iter().copied(), REQUEST);
    }
    header_only(&mut g, 50, [1], Qualifiers::COUNT);
    header_only(&mut g, 60, [1], Qualifiers::ALL);
    header_only(&mut g, 60, 2..=4, Qualifiers::ALL | Qualifiers::COUNT);
    header_only(&mut g, 80, [1], Qualifiers::RANGE | Qualifiers::ALL);
    g
}

fn response_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    with_data(&mut g, 0, 209..=255, DATA);
    with_data(&mut g, 1, [1], Qualifiers::RANGE);
    with_data(&mut g, 1, [2], DATA);
    with_data(&mut g, 2, 1..=3, EVENT);
    with_data(&mut g, 3, [1], Qualifiers::RANGE);
    with_data(&mut g, 3, [2], DATA);
    with_data(&mut g, 4, 1..=3, EVENT);
    with_data(&mut g, 10, [1], Qualifiers::RANGE);
    with_data(&mut g, 10, [2], DATA);
    with_data(&mut g, 11, 1..=2, EVENT);
    with_data(&mut g, 12, 1..=2, EVENT);
    with_data(&mut g, 12, [3], Qualifiers::RANGE);
    with_data(&mut g, 13, 1..=2, EVENT);
    with_data(&mut g, 20, [1, 2, 5, 6], DATA);
    with_data(&mut g, 21, [1, 2, 5, 6, 9, 10], DATA);
    with_data(&mut g, 22, [1, 2, 5, 6], EVENT);
    with_data(&mut g, 23, [1, 2, 5, 6], EVENT);
    with_data(&mut g, 30, 1..=6, DATA);
    with_data(&mut g, 32, 1..=8, EVENT);
    with_data(&mut g, 34, 1..=3, DATA);
    with_data(&mut g, 40, 1..=4, DATA);
    with_data(&mut g, 41, 1..=4, EVENT);
    with_data(&mut g, 42, 1..=8, EVENT);
    with_data(&mut g, 43, 1..=8, EVENT);
    with_data(&mut g, 50, [1], Qualifiers::COUNT);
    with_data(&mut g, 50, [4], EVENT);
    with_data(&mut g, 51, 1..=2, Qualifiers::COUNT);
    with_data(&mut g, 52, 1..=2, Qualifiers::COUNT);
    with_data(&mut g, 70, 2..=7, Qualifiers::FREE);
    with_data(&mut g, 80, [1], Qualifiers::RANGE);
    with_data(&mut g, 110, 1..=255, DATA);
    with_data(&mut g, 111, 1..=255, EVENT);
    with_data(&mut g, 113, 1..=255, Qualifiers::INDEXED);
    g
}

fn write_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    with_data(&mut g, 34, 1..=3, DATA);
    with_data(&mut g, 50, [1, 3], Qualifiers::COUNT);
    with_data(&mut g, 50, [4], EVENT);
    with_data(&mut g, 70, [5], Qualifiers::FREE);
    with_data(&mut g, 80, [1], Qualifiers::RANGE);
    with_data(&mut g, 110, 1..=255, DATA);
    with_data(&mut g, 112, 1..=255, Qualifiers::INDEXED);
    g
}

fn control_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    with_data(&mut g, 12, 1..=2, EVENT);
    with_data(&mut g, 12, [3], Qualifiers::RANGE);
    with_data(&mut g, 41, 1..=4, EVENT);
    g
}

fn freeze_grammar(at_time: bool) -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    if at_time {
        with_data(&mut g, 50, [2], Qualifiers::COUNT);
    }
    header_only(&mut g, 20, [0], REQUEST);
    header_only(&mut g, 30, [0], REQUEST);
    g
}

fn application_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    with_data(&mut g, 90, [1], Qualifiers::ALL | Qualifiers::FREE);
    g
}

fn unsolicited_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    header_only(&mut g, 60, 2..=4, Qualifiers::ALL);
    g
}

fn assign_class_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    header_only(&mut g, 60, 1..=4, Qualifiers::ALL);
    for group in [1, 3, 10, 20, 21, 30, 40, 110] {
        header_only(&mut g, group, [0], REQUEST);
    }
    g
}

fn file_grammar(activate: bool) -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    with_data(&mut g, 70, 2..=8, Qualifiers::FREE);
    if activate {
        with_data(&mut g, 110, 1..=255, Qualifiers::FREE);
    }
    g
}

fn auth_objects() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    with_data(&mut g, 120, [3, 4], Qualifiers::COUNT);
    with_data(&mut g, 120, (1..=15).filter(|v| !matches!(*v, 3 | 4)), Qualifiers::FREE);
    g.aggressive = false;
    g
}

fn empty(aggressive: bool) -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    g.aggressive = aggressive;
    g
}

fn grammar_for(function: FunctionCode, policy: ConfirmPolicy) -> FunctionGrammar {
    use FunctionCode::*;
    match function {
        Confirm => {
            let mut g = empty(false);
            g.unknown = policy.error();
            g
        }
        Read => read_grammar(),
        Write => write_grammar(),
        Select | Operate | DirectOperate | DirectOperateNr => control_grammar(),
        ImmedFreeze | ImmedFreezeNr | FreezeClear | FreezeClearNr => freeze_grammar(false),
        FreezeAtTime | FreezeAtTimeNr => freeze_grammar(true),
        ColdRestart | WarmRestart | InitializeData | SaveConfig | DelayMeasure | RecordCurrentTime => empty(true),
        InitializeAppl | StartAppl | StopAppl => application_grammar(),
        EnableUnsolicited | DisableUnsolicited => unsolicited_grammar(),
        AssignClass => assign_class_grammar(),
        OpenFile | CloseFile | DeleteFile | GetFileInfo | AuthenticateFile | AbortFile => file_grammar(false),
        ActivateConfig => file_grammar(true),
        AuthenticateReq | AuthReqNoAck | AuthenticateResp => auth_objects(),
        Response | UnsolicitedResponse => response_grammar(),
    }
}

/// Immutable registry of function grammars.
#[derive(Debug, Clone)]
pub struct Catalogue {
    grammars: HashMap<FunctionCode, FunctionGrammar>,
    auth: FunctionGrammar,
    fallback: FunctionGrammar,
}

impl Catalogue {
    /// A catalogue in which every function accepts no objects.
    pub fn empty() -> Self {
        Catalogue { grammars: HashMap::new(), auth: wrapper_grammar(), fallback: FunctionGrammar::new() }
    }

    /// The full catalogue with the given CONFIRM policy.
    pub fn build(policy: ConfirmPolicy) -> Self {
        let mut c = Self::empty();
        for &function in FunctionCode::ALL {
            c.grammars.insert(function, grammar_for(function, policy));
        }
        c
    }

    /// The shared standard catalogue.
    pub fn standard() -> Arc<Catalogue> {
        static STANDARD: OnceLock<Arc<Catalogue>> = OnceLock::new();
        STANDARD.get_or_init(|| Arc::new(Catalogue::build(ConfirmPolicy::default()))).clone()
    }

    /// Replace the grammar of one function. Intended for building custom
    /// catalogues before they are shared.
    pub fn set(&mut self, function: FunctionCode, grammar: FunctionGrammar) {
        self.grammars.insert(function, grammar);
    }

    pub fn grammar(&self, function: FunctionCode) -> &FunctionGrammar {
        self.grammars.get(&function).unwrap_or(&self.fallback)
    }

    /// Grammar of the aggressive-mode wrapper objects (g120v3, g120v9).
    pub fn auth_grammar(&self) -> &FunctionGrammar {
        &self.auth
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::build(ConfirmPolicy::default())
    }
}

fn wrapper_grammar() -> FunctionGrammar {
    let mut g = FunctionGrammar::new();
    let (group, variation) = AGGRESSIVE_MODE;
    g.insert(ObjectSpec { group, variation, qualifiers: Qualifiers::COUNT, decoder: layout(group, variation) });
    let (group, variation) = AUTH_MAC;
    g.insert(ObjectSpec { group, variation, qualifiers: Qualifiers::FREE, decoder: layout(group, variation) });
    g.aggressive = false;
    g
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_function_has_a_grammar() {
        let c = Catalogue::standard();
        for &f in FunctionCode::ALL {
            let g = c.grammar(f);
            assert_eq!(g.aggressive, !matches!(
                f,
                FunctionCode::Confirm
                    | FunctionCode::AuthenticateReq
                    | FunctionCode::AuthReqNoAck
                    | FunctionCode::AuthenticateResp
            ));
        }
        assert!(c.grammar(FunctionCode::Confirm).is_empty());
        assert!(c.grammar(FunctionCode::ColdRestart).is_empty());
        assert!(c.grammar(FunctionCode::Read).lookup(1, 0).is_some());
        assert!(c.grammar(FunctionCode::Read).lookup(50, 0).is_none());
    }

    #[test]
    fn test_confirm_policy() {
        let c = Catalogue::build(ConfirmPolicy::ParamError);
        assert_eq!(c.grammar(FunctionCode::Confirm).unknown, ErrorKind::ParamError);
        assert_eq!(Catalogue::standard().grammar(FunctionCode::Confirm).unknown, ErrorKind::ObjUnknown);
    }

    #[test]
    fn test_layout_variation_sized_octets() {
        assert!(matches!(layout(110, 5), Some(Decoder::Octets(5))));
        assert!(layout(110, 0).is_none());
        assert!(layout(60, 1).is_none());
        assert!(matches!(layout(120, 3), Some(Decoder::Fixed(_))));
    }

    #[test]
    fn test_standard_is_shared() {
        assert!(Arc::ptr_eq(&Catalogue::standard(), &Catalogue::standard()));
    }
}
