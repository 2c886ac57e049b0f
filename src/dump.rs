//! Human-readable rendering of frames, segments, fragments and objects.
//!
//! The output is deterministic and compact, one line per item:
//!
//! ```text
//! primary frame from master 65519 to 1: TEST_LINK_STATES (fcb=1)
//! [10] (fir) 249 bytes
//! [0] (fir,fin) READ {g1v0 qc=17 #65 #67 #66}
//! [3] (fir,fin) RESPONSE iin=(device_restart) {g30v2 qc=01 #0=12[01] #1=-4[01]}
//! [0] (fir,fin) READ OBJ_UNKNOWN
//! ```

use crate::app::{AppControl, AppHeader, AuthData, Fragment, FunctionCode, Iin};
use crate::link::Frame;
use crate::object::{AnalogValue, Object, ObjectBlock, PrefixCode, RangeSpec};
use crate::transport::Segment;
use std::fmt::{self, Display, Formatter, Write};

fn flag_list(f: &mut Formatter<'_>, flags: &[(bool, &str)]) -> fmt::Result {
    f.write_char('(')?;
    let mut first = true;
    for &(set, name) in flags {
        if set {
            if !first {
                f.write_char(',')?;
            }
            f.write_str(name)?;
            first = false;
        }
    }
    f.write_char(')')
}

/// Lowercase hex, prefixed with `0x`.
pub fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frame from {} {} to {}: ",
            if self.prm() { "primary" } else { "secondary" },
            if self.dir() { "master" } else { "outstation" },
            self.source,
            self.destination,
        )?;
        match self.function() {
            Some(func) => f.write_str(func.name())?,
            None => write!(f, "function {}", self.function_code())?,
        }
        if self.fcv() {
            write!(f, " (fcb={})", self.fcb() as u8)?;
        }
        if self.dfc() {
            f.write_str(" (dfc)")?;
        }
        if let Some(p) = &self.payload {
            write!(f, " {} bytes", p.len())?;
        }
        if self.corrupted {
            f.write_str(" [corrupted]")?;
        }
        Ok(())
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.seq)?;
        flag_list(f, &[(self.fir, "fir"), (self.fin, "fin")])?;
        write!(f, " {} bytes", self.payload.len())
    }
}

impl Display for AppControl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.seq)?;
        flag_list(f, &[(self.fir, "fir"), (self.fin, "fin"), (self.con, "con"), (self.uns, "uns")])
    }
}

impl Display for Iin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let flags: Vec<(bool, &str)> = Iin::NAMES.iter().map(|&(bit, name)| (self.contains(bit), name)).collect();
        flag_list(f, &flags)
    }
}

impl Display for AppHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.control)?;
        match FunctionCode::from_u8(self.function_code) {
            Some(func) => f.write_str(func.name())?,
            None => write!(f, "function 0x{:02x}", self.function_code)?,
        }
        if let Some(iin) = self.iin {
            write!(f, " iin={}", iin)?;
        }
        Ok(())
    }
}

impl Display for AuthData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "auth(csq={},user={},mac={})", self.csq, self.user, hex(&self.mac))
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        if let Some(auth) = &self.auth {
            write!(f, " {}", auth)?;
        }
        for block in &self.blocks {
            write!(f, " {}", block)?;
        }
        Ok(())
    }
}

impl Display for ObjectBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{g{}v{} qc={:02x}", self.group, self.variation, self.qualifier())?;
        let objects = self.objects.as_deref();
        match (self.prefix, self.range) {
            (PrefixCode::None, r) if r.is_range() => {
                let start = self.range_base.unwrap_or(0);
                match objects {
                    Some(objs) => {
                        for (i, obj) in objs.iter().enumerate() {
                            write!(f, " #{}={}", start as u64 + i as u64, obj)?;
                        }
                    }
                    None => write!(f, " #{}..{}", start, self.range_stop().unwrap_or(start))?,
                }
            }
            (PrefixCode::Index(_), _) => {
                let indexes = self.indexes.as_deref().unwrap_or(&[]);
                for (i, index) in indexes.iter().enumerate() {
                    match objects.and_then(|o| o.get(i)) {
                        Some(obj) => write!(f, " #{}={}", index, obj)?,
                        None => write!(f, " #{}", index)?,
                    }
                }
            }
            (_, RangeSpec::All) => {}
            _ => match objects {
                Some(objs) => {
                    for obj in objs {
                        write!(f, " {}", obj)?;
                    }
                }
                None => write!(f, " count={}", self.count)?,
            },
        }
        f.write_char('}')
    }
}

impl Display for AnalogValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AnalogValue::Int(v) => write!(f, "{}", v),
            AnalogValue::Float(v) => write!(f, "{}", v),
        }
    }
}

fn flags_time(f: &mut Formatter<'_>, flags: Option<u8>, time: Option<u64>) -> fmt::Result {
    if let Some(flags) = flags {
        write!(f, "[{:02x}]", flags)?;
    }
    if let Some(time) = time {
        write!(f, "@{}", time)?;
    }
    Ok(())
}

impl Display for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Object::Bit(b) => write!(f, "{}", *b as u8),
            Object::DoubleBit(d) => f.write_str(d.name()),
            Object::Flags(flags) => flags_time(f, Some(*flags), None),
            Object::FlagsTime { flags, time } => flags_time(f, Some(*flags), Some(*time)),
            Object::FlagsRelTime { flags, time } => write!(f, "[{:02x}]@+{}", flags, time),
            Object::Counter { flags, value, time } => {
                write!(f, "{}", value)?;
                flags_time(f, *flags, *time)
            }
            Object::AnalogInt { flags, value, time } => {
                write!(f, "{}", value)?;
                flags_time(f, *flags, *time)
            }
            Object::AnalogFloat { flags, value, time } => {
                write!(f, "{}", value)?;
                flags_time(f, *flags, *time)
            }
            Object::Command(c) => write!(
                f,
                "crob(op={},tcc={},count={},on={},off={},status={})",
                c.op_type(),
                c.tcc(),
                c.count,
                c.on_time,
                c.off_time,
                c.status
            ),
            Object::AnalogOutput { status, value, time } => {
                write!(f, "{}", value)?;
                flags_time(f, Some(*status), *time)
            }
            Object::Time(t) => write!(f, "@{}", t),
            Object::TimeInterval { time, interval, units } => {
                write!(f, "@{}+{}", time, interval)?;
                if let Some(u) = units {
                    write!(f, "u{}", u)?;
                }
                Ok(())
            }
            Object::Delay(ms) => write!(f, "{}ms", ms),
            Object::Attribute { data_type, value } => write!(f, "attr({},{})", data_type, hex(value)),
            Object::AggressiveMode { csq, user } => write!(f, "csq={},user={}", csq, user),
            Object::Octets(bytes) => f.write_str(&hex(bytes)),
        }
    }
}
