//! Transport layer: segment codec and the per-connection reassembly automaton.
//!
//! Each arriving segment is classified into one input symbol relative to the
//! previous segment of the same connection, plus a trailing `Z` when FIN is set:
//!
//! | condition | symbol |
//! |---|---|
//! | FIR set | `A` |
//! | no FIR, no previous segment | `_` |
//! | no FIR, identical to previous segment | `=` |
//! | no FIR, seq = previous seq + 1 (mod 64) | `+` |
//! | no FIR, any other seq | `!` |
//!
//! Runs of the form `A (+|=)* Z` emit the concatenated payloads of all their
//! segments. A run interrupted by any other symbol, or by teardown, is
//! discarded whole. Symbols outside a run are discarded one segment at a time.

pub const FIN: u8 = 0x80;
pub const FIR: u8 = 0x40;
pub const SEQ_MASK: u8 = 0x3F;
/// Largest link user data (250) minus the transport header.
pub const MAX_PAYLOAD: usize = 249;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub fir: bool,
    pub fin: bool,
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Split link user data into header and payload. `None` on empty input.
    pub fn parse(bytes: &[u8]) -> Option<Segment> {
        let (&header, payload) = bytes.split_first()?;
        Some(Segment {
            fir: header & FIR != 0,
            fin: header & FIN != 0,
            seq: header & SEQ_MASK,
            payload: payload.to_vec(),
        })
    }

    pub fn header(&self) -> u8 {
        let mut h = self.seq & SEQ_MASK;
        if self.fir {
            h |= FIR;
        }
        if self.fin {
            h |= FIN;
        }
        h
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Automaton input symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// `A`: FIR set, starts a run.
    First,
    /// `_`: no FIR and nothing seen before on this connection.
    Orphan,
    /// `=`: byte-identical repeat of the previous segment.
    Repeat,
    /// `+`: next sequence number.
    Next,
    /// `!`: sequence mismatch.
    Mismatch,
    /// `Z`: FIN set, appended after the segment's own symbol.
    Final,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::First => 'A',
            Symbol::Orphan => '_',
            Symbol::Repeat => '=',
            Symbol::Next => '+',
            Symbol::Mismatch => '!',
            Symbol::Final => 'Z',
        }
    }
}

/// Classify `new` against the previous segment of the same connection.
pub fn classify(new: &Segment, last: Option<&Segment>) -> Symbol {
    if new.fir {
        return Symbol::First;
    }
    match last {
        None => Symbol::Orphan,
        Some(last) if last == new => Symbol::Repeat,
        Some(last) if new.seq == (last.seq + 1) & SEQ_MASK => Symbol::Next,
        Some(_) => Symbol::Mismatch,
    }
}

/// The symbols a segment contributes: its own, then `Z` if FIN is set.
pub fn symbols(new: &Segment, last: Option<&Segment>) -> (Symbol, Option<Symbol>) {
    (classify(new, last), new.fin.then_some(Symbol::Final))
}

/// Output of one automaton step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A complete run: the reassembled application payload.
    Payload(Vec<u8>),
    /// Payload bytes thrown away, either a lone segment or an aborted run.
    Discard { segments: usize, bytes: usize },
}

/// Accepting the segment would overflow the run buffer; the segment was
/// dropped and the automaton left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub dropped: usize,
    pub capacity: usize,
}

/// Resumable reassembly state for one connection.
#[derive(Debug, Clone)]
pub struct Reassembler {
    capacity: usize,
    last: Option<Segment>,
    /// Payloads of the run in progress, in arrival order; `None` while idle.
    run: Option<Vec<Vec<u8>>>,
    buffered: usize,
}

impl Reassembler {
    pub fn new(capacity: usize) -> Self {
        Reassembler { capacity, last: None, run: None, buffered: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Payload bytes held by the run in progress.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn in_run(&self) -> bool {
        self.run.is_some()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.last.as_ref()
    }

    /// Feed one segment, reporting results through `emit` in order.
    pub fn push(&mut self, segment: Segment, mut emit: impl FnMut(Event)) -> Result<(), Overflow> {
        let symbol = classify(&segment, self.last.as_ref());
        tracing::trace!(
            symbol = %symbol.as_char(),
            fin = segment.fin,
            seq = segment.seq,
            "transport symbol"
        );

        let grows_run = match symbol {
            Symbol::First => true,
            Symbol::Next | Symbol::Repeat => self.in_run(),
            _ => false,
        };
        if grows_run {
            let base = if symbol == Symbol::First { 0 } else { self.buffered };
            if base + segment.payload.len() > self.capacity {
                return Err(Overflow { dropped: segment.payload.len(), capacity: self.capacity });
            }
        }

        match symbol {
            Symbol::First => {
                self.abort(&mut emit);
                self.buffered = segment.payload.len();
                self.run = Some(vec![segment.payload.clone()]);
            }
            Symbol::Next | Symbol::Repeat if grows_run => {
                self.buffered += segment.payload.len();
                if let Some(run) = self.run.as_mut() {
                    run.push(segment.payload.clone());
                }
            }
            _ => {
                self.abort(&mut emit);
                emit(Event::Discard { segments: 1, bytes: segment.payload.len() });
                self.last = Some(segment);
                return Ok(());
            }
        }

        if segment.fin {
            if let Some(run) = self.run.take() {
                self.buffered = 0;
                emit(Event::Payload(run.concat()));
            }
        }
        self.last = Some(segment);
        Ok(())
    }

    /// End of input for this connection: drop any run in progress and forget
    /// the previous segment. Returns the number of payload bytes dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buffered;
        self.run = None;
        self.buffered = 0;
        self.last = None;
        dropped
    }

    fn abort(&mut self, emit: &mut impl FnMut(Event)) {
        if let Some(run) = self.run.take() {
            emit(Event::Discard { segments: run.len(), bytes: self.buffered });
            self.buffered = 0;
        }
    }
}
