//! Dissector configuration.

use crate::error::ErrorKind;

/// How a CONFIRM fragment that carries object data is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmPolicy {
    #[default]
    ObjUnknown,
    ParamError,
}

impl ConfirmPolicy {
    pub fn error(self) -> ErrorKind {
        match self {
            ConfirmPolicy::ObjUnknown => ErrorKind::ObjUnknown,
            ConfirmPolicy::ParamError => ErrorKind::ParamError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Connection contexts kept before the least recently used is evicted.
    pub max_contexts: usize,
    /// Bound on the payload buffered for one message in progress.
    pub max_message_bytes: usize,
    pub confirm_objects: ConfirmPolicy,
}

impl Config {
    pub const DEFAULT_MAX_CONTEXTS: usize = 1024;
    pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 8192;

    pub fn with_max_contexts(mut self, n: usize) -> Self {
        self.max_contexts = n.max(1);
        self
    }

    pub fn with_max_message_bytes(mut self, n: usize) -> Self {
        self.max_message_bytes = n;
        self
    }

    pub fn with_confirm_objects(mut self, policy: ConfirmPolicy) -> Self {
        self.confirm_objects = policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_contexts: Self::DEFAULT_MAX_CONTEXTS,
            max_message_bytes: Self::DEFAULT_MAX_MESSAGE_BYTES,
            confirm_objects: ConfirmPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_setters() {
        let c = Config::default();
        assert_eq!(c.max_contexts, 1024);
        assert_eq!(c.max_message_bytes, 8192);
        assert_eq!(c.confirm_objects.error(), ErrorKind::ObjUnknown);

        let c = Config::default().with_max_contexts(0).with_confirm_objects(ConfirmPolicy::ParamError);
        assert_eq!(c.max_contexts, 1);
        assert_eq!(c.confirm_objects.error(), ErrorKind::ParamError);
    }
}
