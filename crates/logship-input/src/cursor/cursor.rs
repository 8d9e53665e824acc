//! Read-only cursor view handed to inputs.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::store::Resource;
use crate::error::Result;

/// The input's view over its source's stored progress. All writes go through
/// the publisher; the cursor only reads.
pub struct Cursor {
    resource: Arc<Resource>,
}

impl Cursor {
    pub(crate) fn new(resource: Arc<Resource>) -> Self {
        Self { resource }
    }

    /// True if no progress has ever been recorded for this source.
    pub fn is_new(&self) -> bool {
        self.resource.is_new()
    }

    /// Decode the stored cursor into the input's own shape. Returns `None`
    /// for a new source.
    pub fn unpack_cursor<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.resource.unpack_cursor()
    }
}
