//! Data-volume commit primitive.
//!
//! Changes on the shared project volume only become visible to warm
//! starts on other nodes after an explicit commit. Every successful
//! mutation (generation, apply, restore) must call [`Volume::commit`].

use async_trait::async_trait;

/// The shared project volume.
#[async_trait]
pub trait Volume: Send + Sync {
    /// Publish all pending changes to other mounts of this volume.
    async fn commit(&self);
}

/// A directly attached volume (local disk or a coherent network mount):
/// writes are durable immediately, commit only marks the point in the
/// log.
#[derive(Debug, Default)]
pub struct AttachedVolume;

#[async_trait]
impl Volume for AttachedVolume {
    async fn commit(&self) {
        tracing::debug!("volume commit point");
    }
}

/// Test double that counts commits.
#[derive(Debug, Default)]
pub struct CountingVolume {
    commits: std::sync::atomic::AtomicUsize,
}

impl CountingVolume {
    pub fn commits(&self) -> usize {
        self.commits.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Volume for CountingVolume {
    async fn commit(&self) {
        self.commits
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_volume_counts() {
        let volume = CountingVolume::default();
        volume.commit().await;
        volume.commit().await;
        assert_eq!(volume.commits(), 2);
    }
}
