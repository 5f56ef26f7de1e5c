//! Batch request and workspace identifiers

use uuid::Uuid;

use crate::{Error, Result};

/// Fresh identifier for a batch request or its workspace directory
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Parse an identifier read back from storage or a client
pub fn parse_id(text: &str) -> Result<Uuid> {
    Uuid::try_parse(text.trim())
        .map_err(|e| Error::InvalidInput(format!("Malformed identifier {:?}: {}", text, e)))
}
