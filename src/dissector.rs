//! Stream driver: feeds raw bytes through the link framer, the per-connection
//! transport reassembler and the application parser, reporting each step
//! through [`Callbacks`].

use crate::app::{self, Fragment};
use crate::catalogue::Catalogue;
use crate::config::{Config, ConfirmPolicy};
use crate::context::ContextTable;
use crate::error::{AppError, DissectError};
use crate::link::{self, Frame, Scan};
use crate::transport::{Event, Segment};
use std::sync::Arc;

/// Event hooks. Every method defaults to a no-op, so an implementation only
/// overrides what it needs.
#[allow(unused_variables)]
pub trait Callbacks {
    /// A CRC-clean, semantically valid link frame. `raw` is the frame as it
    /// appeared on the wire.
    fn link_frame(&mut self, frame: &Frame, raw: &[u8]) {}

    /// A corrupted or semantically invalid frame.
    fn link_invalid(&mut self, frame: &Frame, raw: &[u8]) {}

    fn transport_segment(&mut self, frame: &Frame, segment: &Segment) {}

    /// Payload bytes thrown away by the reassembler.
    fn transport_discard(&mut self, frame: &Frame, bytes: usize) {}

    /// A reassembled application payload, before parsing.
    fn transport_payload(&mut self, frame: &Frame, payload: &[u8]) {}

    fn app_fragment(&mut self, frame: &Frame, fragment: &Fragment, payload: &[u8]) {}

    fn app_invalid(&mut self, frame: &Frame, error: &AppError, payload: &[u8]) {}

    fn log_error(&mut self, error: &DissectError) {}
}

impl Callbacks for () {}

/// One byte stream's worth of dissection state.
///
/// Not shareable across threads while in use; run one instance per stream.
pub struct Dissector<C> {
    config: Config,
    catalogue: Arc<Catalogue>,
    contexts: ContextTable,
    buf: Vec<u8>,
    callbacks: C,
    finished: bool,
}

impl<C: Callbacks> Dissector<C> {
    pub fn new(callbacks: C) -> Self {
        Self::with_config(Config::default(), callbacks)
    }

    pub fn with_config(config: Config, callbacks: C) -> Self {
        let catalogue = match config.confirm_objects {
            ConfirmPolicy::ObjUnknown => Catalogue::standard(),
            policy => Arc::new(Catalogue::build(policy)),
        };
        Self::with_catalogue(config, catalogue, callbacks)
    }

    pub fn with_catalogue(config: Config, catalogue: Arc<Catalogue>, callbacks: C) -> Self {
        let contexts = ContextTable::new(config.max_contexts, config.max_message_bytes);
        Dissector { config, catalogue, contexts, buf: Vec::new(), callbacks, finished: false }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    /// Input bytes held back waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume a chunk of the stream. Every complete frame in the buffered
    /// input is processed before this returns.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), DissectError> {
        if self.finished {
            return Err(DissectError::Finished);
        }
        self.buf.extend_from_slice(bytes);

        let buf = std::mem::take(&mut self.buf);
        let mut pos = 0;
        loop {
            match link::scan(&buf[pos..]) {
                Scan::Frame { frame, skipped, consumed } => {
                    if skipped > 0 {
                        tracing::trace!(skipped, "skipped noise before frame");
                    }
                    let raw = &buf[pos + skipped..pos + consumed];
                    pos += consumed;
                    self.on_frame(frame, raw);
                }
                Scan::Incomplete { skipped } => {
                    if skipped > 0 {
                        tracing::trace!(skipped, "skipped noise");
                    }
                    pos += skipped;
                    break;
                }
            }
        }

        self.buf = buf;
        self.buf.drain(..pos);
        Ok(())
    }

    /// Tear down every context, reporting undelivered bytes, and release the
    /// input buffer. The instance rejects further input afterwards.
    pub fn finish(&mut self) -> Result<(), DissectError> {
        if self.finished {
            return Err(DissectError::Finished);
        }
        self.finished = true;
        for e in self.contexts.clear() {
            tracing::debug!(src = e.key.source, dst = e.key.destination, bytes = e.bytes, "context torn down");
            self.callbacks.log_error(&DissectError::TornDown {
                src: e.key.source,
                dst: e.key.destination,
                bytes: e.bytes,
            });
        }
        if !self.buf.is_empty() {
            tracing::debug!(bytes = self.buf.len(), "dropping partial frame at finish");
        }
        self.buf = Vec::new();
        Ok(())
    }

    fn on_frame(&mut self, frame: Frame, raw: &[u8]) {
        if frame.corrupted || !link::validate_frame(&frame) {
            tracing::debug!(
                src = frame.source,
                dst = frame.destination,
                control = frame.control,
                corrupted = frame.corrupted,
                "invalid link frame"
            );
            self.callbacks.link_invalid(&frame, raw);
            return;
        }
        tracing::trace!(src = frame.source, dst = frame.destination, control = frame.control, "link frame");
        self.callbacks.link_frame(&frame, raw);

        let segment = match frame.payload.as_deref().and_then(Segment::parse) {
            Some(s) => s,
            None => return,
        };
        self.callbacks.transport_segment(&frame, &segment);

        let (src, dst) = (frame.source, frame.destination);
        let (ctx, evicted) = self.contexts.lookup_or_create(src, dst);
        let mut events = Vec::new();
        let pushed = ctx.reassembler.push(segment, |e| events.push(e));

        if let Some(e) = evicted.filter(|e| e.bytes > 0) {
            tracing::warn!(src = e.key.source, dst = e.key.destination, bytes = e.bytes, "context evicted");
            self.callbacks.log_error(&DissectError::ContextEvicted {
                src: e.key.source,
                dst: e.key.destination,
                bytes: e.bytes,
            });
        }
        if let Err(o) = pushed {
            tracing::warn!(src, dst, dropped = o.dropped, capacity = o.capacity, "reassembly buffer full");
            self.callbacks.log_error(&DissectError::BufferOverflow {
                src,
                dst,
                dropped: o.dropped,
                capacity: o.capacity,
            });
        }

        for event in events {
            match event {
                Event::Discard { segments, bytes } => {
                    tracing::debug!(src, dst, segments, bytes, "transport discard");
                    self.callbacks.transport_discard(&frame, bytes);
                }
                Event::Payload(payload) => {
                    self.callbacks.transport_payload(&frame, &payload);
                    self.on_payload(&frame, &payload);
                }
            }
        }
    }

    fn on_payload(&mut self, frame: &Frame, payload: &[u8]) {
        match app::parse_fragment(&self.catalogue, payload) {
            Ok(fragment) => {
                tracing::trace!(function = fragment.function.name(), blocks = fragment.blocks.len(), "app fragment");
                self.callbacks.app_fragment(frame, &fragment, payload);
            }
            Err(e) => {
                tracing::debug!(error = %e.kind, "app fragment rejected");
                self.callbacks.app_invalid(frame, &e, payload);
            }
        }
    }
}
