//! Switch controlling writes to the external index.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Process-wide flag that permits grant writes to reach the index.
///
/// The gate starts closed and is opened by the bootstrap loader once all
/// persisted grants are restored. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct WriteGate(Arc<AtomicBool>);

impl WriteGate {
    /// Block writes to the index.
    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Check if writes to the index are allowed.
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Allow writes to the index.
    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::WriteGate;

    #[test]
    fn starts_closed() {
        let gate = WriteGate::default();
        assert!(!gate.is_open());
    }

    #[test]
    fn clones_share_state() {
        let gate = WriteGate::default();
        let other = gate.clone();
        gate.open();
        assert!(other.is_open());
        other.close();
        assert!(!gate.is_open());
    }
}
