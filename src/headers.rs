//! Block header lookup for sync. Headers arrive as consensus bytes and are
//! validated and linked by [`FilterSync`](crate::sync::FilterSync), so a
//! source never has to be trusted for proof of work or ancestry.
use async_trait::async_trait;

/// Source of the best header chain, by height.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    /// Current best height.
    async fn tip_height(&self) -> anyhow::Result<u32>;

    /// Consensus-encoded 80-byte header at an exact height.
    async fn header_at_height(&self, height: u32) -> anyhow::Result<Vec<u8>>;
}
