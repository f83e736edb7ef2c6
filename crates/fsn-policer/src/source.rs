use fsn_engine::StorageEngine;
use fsn_types::Address;

use crate::error::PolicerResult;

/// Supplier of locally stored addresses to police.
pub trait ObjectListSource: Send + Sync {
    /// Up to `limit` addresses. Successive calls may return different
    /// samples.
    fn list(&self, limit: usize) -> PolicerResult<Vec<Address>>;
}

/// Local removal of objects whose container is gone.
pub trait ObjectInhumer: Send + Sync {
    fn inhume(&self, addresses: &[Address]) -> PolicerResult<()>;
}

impl ObjectListSource for StorageEngine {
    fn list(&self, limit: usize) -> PolicerResult<Vec<Address>> {
        Ok(StorageEngine::list(self, limit)?)
    }
}

impl ObjectInhumer for StorageEngine {
    fn inhume(&self, addresses: &[Address]) -> PolicerResult<()> {
        Ok(StorageEngine::inhume(self, None, addresses)?)
    }
}
