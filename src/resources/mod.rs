// Resource lifecycle module
//
// Transient preview references for binary image payloads. A reference is
// valid from acquire() until release(); resolving a released reference
// yields None. Release is idempotent: double-release and release of an
// unknown reference are silent no-ops.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Opaque, revocable reference to a payload held by a [`PreviewRegistry`].
///
/// The view layer renders through a reference; it never owns the bytes.
/// References are plain identifiers, so copying one does not extend the
/// payload's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PreviewRef(u64);

impl PreviewRef {
    /// Build a reference from its raw identifier. Test and bookkeeping
    /// helper; references normally only come out of
    /// [`PreviewRegistry::acquire`].
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// Allocates and revokes preview references for image payloads.
///
/// The registry is the only owner of payload bytes. `acquire` is O(1):
/// [`Bytes`] payloads are reference-counted, so registration never copies
/// image data. Every acquire must be paired with exactly one eventual
/// release; the acquired/released counters exist so tests and the metrics
/// summary can verify that pairing.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    entries: Mutex<HashMap<u64, Bytes>>,
    next_id: AtomicU64,

    // Lifetime accounting for leak detection
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload and return a revocable reference to it.
    pub fn acquire(&self, payload: Bytes) -> PreviewRef {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.lock().unwrap().insert(id, payload);
        self.acquired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("acquired preview reference {}", id);
        PreviewRef(id)
    }

    /// Revoke a reference. Revoking an already-revoked or never-issued
    /// reference is a no-op, never an error.
    pub fn release(&self, preview: PreviewRef) {
        let removed = self.entries.lock().unwrap().remove(&preview.0);
        if removed.is_some() {
            self.released.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("released preview reference {}", preview.0);
        } else {
            tracing::trace!("ignoring release of unknown reference {}", preview.0);
        }
    }

    /// Revoke a batch of references, e.g. everything drained from a
    /// workflow reset.
    pub fn release_all(&self, previews: impl IntoIterator<Item = PreviewRef>) {
        for preview in previews {
            self.release(preview);
        }
    }

    /// Look up the payload behind a reference. `None` once released.
    pub fn resolve(&self, preview: PreviewRef) -> Option<Bytes> {
        self.entries.lock().unwrap().get(&preview.0).cloned()
    }

    /// Number of references currently live.
    pub fn active(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Total references handed out over the registry's lifetime.
    pub fn acquired_total(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Total references revoked over the registry's lifetime.
    pub fn released_total(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_acquire_resolve_release() {
        let registry = PreviewRegistry::new();
        let payload = Bytes::from_static(b"png bytes");

        let preview = registry.acquire(payload.clone());
        assert_eq!(registry.active(), 1);
        assert_eq!(registry.resolve(preview), Some(payload));

        registry.release(preview);
        assert_eq!(registry.active(), 0);
        assert_eq!(registry.resolve(preview), None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = PreviewRegistry::new();
        let preview = registry.acquire(Bytes::from_static(b"x"));

        registry.release(preview);
        registry.release(preview);
        registry.release(preview);

        assert_eq!(registry.active(), 0);
        assert_eq!(registry.acquired_total(), 1);
        assert_eq!(registry.released_total(), 1);
    }

    #[test]
    fn test_release_of_unknown_reference_is_noop() {
        let registry = PreviewRegistry::new();
        registry.release(PreviewRef::from_raw(999));
        assert_eq!(registry.released_total(), 0);
    }

    #[test]
    fn test_references_are_unique() {
        let registry = PreviewRegistry::new();
        let a = registry.acquire(Bytes::from_static(b"a"));
        let b = registry.acquire(Bytes::from_static(b"b"));
        assert_ne!(a, b);

        // Releasing one does not touch the other.
        registry.release(a);
        assert_eq!(registry.resolve(b), Some(Bytes::from_static(b"b")));
    }

    #[test]
    fn test_release_all() {
        let registry = PreviewRegistry::new();
        let refs: Vec<_> = (0..5)
            .map(|_| registry.acquire(Bytes::from_static(b"p")))
            .collect();

        registry.release_all(refs);
        assert_eq!(registry.active(), 0);
        assert_eq!(registry.released_total(), 5);
    }

    proptest! {
        // However often each reference is re-released, the books stay
        // balanced: one effective release per acquire, nothing left live.
        #[test]
        fn prop_redundant_releases_never_unbalance_the_books(
            release_counts in proptest::collection::vec(1usize..4, 0..32),
        ) {
            let registry = PreviewRegistry::new();
            let refs: Vec<_> = release_counts
                .iter()
                .map(|_| registry.acquire(Bytes::from_static(b"payload")))
                .collect();

            for (preview, count) in refs.iter().zip(&release_counts) {
                for _ in 0..*count {
                    registry.release(*preview);
                }
            }

            prop_assert_eq!(registry.active(), 0);
            prop_assert_eq!(registry.acquired_total(), release_counts.len());
            prop_assert_eq!(registry.released_total(), release_counts.len());
        }

        // Interleaved acquire/release keeps active == acquired - released.
        #[test]
        fn prop_active_count_tracks_acquires_minus_releases(
            keep_mask in proptest::collection::vec(any::<bool>(), 0..32),
        ) {
            let registry = PreviewRegistry::new();
            for keep in &keep_mask {
                let preview = registry.acquire(Bytes::from_static(b"payload"));
                if !keep {
                    registry.release(preview);
                }
            }

            let kept = keep_mask.iter().filter(|keep| **keep).count();
            prop_assert_eq!(registry.active(), kept);
            prop_assert_eq!(
                registry.acquired_total() - registry.released_total(),
                kept
            );
        }
    }
}
