use async_trait::async_trait;

use crate::error::Result;
use crate::types::AdmissionRecord;

/// Replaces the contents of a named staging destination with one batch.
///
/// Implementations must apply the replacement atomically: on error the
/// destination keeps its previous contents.
#[async_trait]
pub trait StagingSink: Send + Sync {
    async fn replace(&self, destination: &str, batch: &[AdmissionRecord]) -> Result<()>;
}

/// Folds whatever is currently staged into the warehouse as one unit of work.
#[async_trait]
pub trait WarehouseMerger: Send + Sync {
    async fn merge(&self) -> Result<()>;
}
