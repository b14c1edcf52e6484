use std::sync::Arc;

use dashmap::DashSet;

use crate::types::WatchTarget;

/// Targets currently being scanned. Advisory, process-local mutual exclusion:
/// correct only while a single pipeline instance runs against the stores.
#[derive(Clone, Default)]
pub struct InFlightTargets {
    set: Arc<DashSet<WatchTarget>>,
}

impl InFlightTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// None if the target is already being scanned.
    pub fn try_acquire(&self, target: &WatchTarget) -> Option<ScanGuard> {
        if self.set.insert(target.clone()) {
            Some(ScanGuard {
                set: Arc::clone(&self.set),
                target: target.clone(),
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn contains(&self, target: &WatchTarget) -> bool {
        self.set.contains(target)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Releases the target on drop, on every exit path of a scan including panics.
pub struct ScanGuard {
    set: Arc<DashSet<WatchTarget>>,
    target: WatchTarget,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.set.remove(&self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Marketplace;

    fn target(id: &str) -> WatchTarget {
        WatchTarget::category(Marketplace::new("wb"), id)
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let in_flight = InFlightTargets::new();
        let guard = in_flight.try_acquire(&target("a")).expect("first acquire");
        assert!(in_flight.try_acquire(&target("a")).is_none());
        assert!(in_flight.try_acquire(&target("b")).is_some());
        assert!(in_flight.contains(&target("a")));

        drop(guard);
        assert!(!in_flight.contains(&target("a")));
        assert!(in_flight.try_acquire(&target("a")).is_some());
    }

    #[test]
    fn same_id_different_kind_is_a_different_target() {
        let in_flight = InFlightTargets::new();
        let wb = Marketplace::new("wb");
        let _c = in_flight.try_acquire(&WatchTarget::category(wb.clone(), "1")).unwrap();
        assert!(in_flight.try_acquire(&WatchTarget::product(wb, "1")).is_some());
    }

    #[test]
    fn guard_releases_on_panic() {
        let in_flight = InFlightTargets::new();
        let cloned = in_flight.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire(&target("a")).unwrap();
            panic!("scan blew up");
        }));
        assert!(result.is_err());
        assert!(in_flight.is_empty());
    }

    #[test]
    fn separate_instances_do_not_share_state() {
        let a = InFlightTargets::new();
        let b = InFlightTargets::new();
        let _g = a.try_acquire(&target("x")).unwrap();
        assert!(b.try_acquire(&target("x")).is_some());
    }
}
