//! Hand-off of finished messages to a transport.

use std::fs;
use std::path::PathBuf;

use crate::assembler::FinalizedMessage;
use crate::error::PublishError;

/// Receives a finished message. A failure leaves the session's values intact.
pub trait Publisher {
    fn publish(&self, event_type: &str, message: &FinalizedMessage) -> Result<(), PublishError>;
}

/// Writes the encoded bytes to a file; the event type is logged only.
#[derive(Debug, Clone)]
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Publisher for FilePublisher {
    fn publish(&self, event_type: &str, message: &FinalizedMessage) -> Result<(), PublishError> {
        fs::write(&self.path, message.bytes())?;
        tracing::info!(
            path = %self.path.display(),
            event_type,
            message = message.full_name(),
            bytes = message.bytes().len(),
            "published"
        );
        Ok(())
    }
}
