use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{ConnectionIdGenerator, MAX_CID_SIZE};

/// Connection ID settings shared by every session of a listener
///
/// The default configuration negotiates no connection IDs at all; sessions are then routed purely
/// by the peer's address.
#[derive(Clone, Default)]
pub struct Config {
    /// Source of the connection IDs offered to peers
    ///
    /// Its [`cid_len`](ConnectionIdGenerator::cid_len) fixes the connection ID width expected
    /// on every inbound `tls12_cid` record.
    pub(crate) connection_id_generator: Option<Arc<dyn ConnectionIdGenerator>>,
}

impl Config {
    /// Create a default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `generator` to issue connection IDs, or disable them with `None`
    pub fn connection_id_generator(
        &mut self,
        generator: Option<Arc<dyn ConnectionIdGenerator>>,
    ) -> &mut Self {
        self.connection_id_generator = generator;
        self
    }

    /// The configured generator, if any
    pub fn get_connection_id_generator(&self) -> Option<&Arc<dyn ConnectionIdGenerator>> {
        self.connection_id_generator.as_ref()
    }

    /// Width of the connection ID field in inbound `tls12_cid` records, when IDs are in use
    pub fn cid_len(&self) -> Option<usize> {
        self.connection_id_generator.as_ref().map(|g| g.cid_len())
    }

    /// Check that the settings can be put on the wire
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.cid_len() {
            Some(len) if len > MAX_CID_SIZE => Err(ConfigError::ConnectionIdTooLong(len)),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cid_len", &self.cid_len())
            .finish_non_exhaustive()
    }
}

/// Errors in the configuration of a listener
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ConfigError {
    /// The generator issues IDs longer than the extension can encode
    #[error("connection ID length {0} exceeds the 255 byte maximum")]
    ConnectionIdTooLong(usize),
}
