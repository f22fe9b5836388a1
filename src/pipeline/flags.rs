//! Process-wide transformation switches.

use std::sync::atomic::{AtomicBool, Ordering};

/// A transformation that can be switched on and off at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Text rewriting of body and HTML parts.
    Leet,
    /// 180° rotation of embedded images.
    Rotation,
}

/// Feature flags shared by the admin channel and in-flight pipeline jobs.
#[derive(Debug, Default)]
pub struct TransformFlags {
    leet: AtomicBool,
    rotation: AtomicBool,
}

impl TransformFlags {
    pub fn new(leet: bool, rotation: bool) -> Self {
        Self {
            leet: AtomicBool::new(leet),
            rotation: AtomicBool::new(rotation),
        }
    }

    fn flag(&self, feature: Feature) -> &AtomicBool {
        match feature {
            Feature::Leet => &self.leet,
            Feature::Rotation => &self.rotation,
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.flag(feature).load(Ordering::Acquire)
    }

    /// Flip `feature` and return its new state.
    ///
    /// Retries the compare-and-swap until it wins, so concurrent toggles are
    /// never lost.
    pub fn toggle(&self, feature: Feature) -> bool {
        let flag = self.flag(feature);
        let mut current = flag.load(Ordering::Acquire);
        loop {
            match flag.compare_exchange_weak(current, !current, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return !current,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn toggle_returns_new_state() {
        let flags = TransformFlags::default();
        assert!(!flags.is_enabled(Feature::Leet));
        assert!(flags.toggle(Feature::Leet));
        assert!(flags.is_enabled(Feature::Leet));
        assert!(!flags.is_enabled(Feature::Rotation));
        assert!(!flags.toggle(Feature::Leet));
    }

    #[test]
    fn concurrent_toggles_keep_parity() {
        for threads in [7usize, 8] {
            let flags = Arc::new(TransformFlags::default());
            let per_thread = 1001;
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let flags = flags.clone();
                    std::thread::spawn(move || {
                        for _ in 0..per_thread {
                            flags.toggle(Feature::Rotation);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let total = threads * per_thread;
            assert_eq!(flags.is_enabled(Feature::Rotation), total % 2 == 1);
        }
    }
}
