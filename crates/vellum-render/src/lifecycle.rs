//! Device ownership and the lost/reset protocol.
//!
//! A [`DeviceLifecycleManager`] is shared (via `Arc`) by the renderer, its
//! state caches and every object that owns device resources. It holds the
//! device, the current [`DeviceStatus`], and a registry of
//! [`DeviceResource`] owners that are told to release their hardware objects
//! when the device is lost and to rebuild them after a reset.
//!
//! ```text
//! NoDevice -> Ready <-> Lost -> Resetting -> Ready
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use vellum_device::{CooperativeLevel, DeviceCaps, RenderDevice};

/// Where the device is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    NoDevice,
    Ready,
    Lost,
    Resetting,
}

/// An object owning hardware resources that must follow the device lifecycle.
///
/// Both callbacks may run while the registry is being modified by other
/// resources; the manager always notifies over a snapshot.
pub trait DeviceResource: Send + Sync {
    /// Release every hardware object. The device is no longer usable.
    fn device_lost(&self, device: &dyn RenderDevice);

    /// Recreate hardware objects on the freshly reset device.
    fn device_reset(&self, device: &dyn RenderDevice);
}

/// Token returned by [`DeviceLifecycleManager::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct DeviceSlot {
    device: Option<Arc<dyn RenderDevice>>,
    caps: DeviceCaps,
    status: DeviceStatus,
}

pub struct DeviceLifecycleManager {
    slot: RwLock<DeviceSlot>,
    registrants: Mutex<Vec<(RegistrationId, Weak<dyn DeviceResource>)>>,
    next_id: AtomicU64,
}

impl DeviceLifecycleManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: RwLock::new(DeviceSlot {
                device: None,
                caps: DeviceCaps::default(),
                status: DeviceStatus::NoDevice,
            }),
            registrants: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Install `device` and move to `Ready`. Replaces any previous device.
    pub fn attach_device(&self, device: Arc<dyn RenderDevice>) {
        let caps = device.caps();
        let mut slot = self.slot.write();
        slot.device = Some(device);
        slot.caps = caps;
        slot.status = DeviceStatus::Ready;
        tracing::info!(
            scissor = caps.supports_scissor_test,
            stages = caps.max_texture_stages,
            "Render device attached"
        );
    }

    /// Drop the device and return to `NoDevice`.
    pub fn detach_device(&self) {
        let mut slot = self.slot.write();
        slot.device = None;
        slot.status = DeviceStatus::NoDevice;
    }

    #[inline]
    pub fn status(&self) -> DeviceStatus {
        self.slot.read().status
    }

    pub fn caps(&self) -> DeviceCaps {
        self.slot.read().caps
    }

    /// The device, whatever its status.
    pub fn device(&self) -> Option<Arc<dyn RenderDevice>> {
        self.slot.read().device.clone()
    }

    /// The device, only while it may be written to.
    pub fn usable_device(&self) -> Option<Arc<dyn RenderDevice>> {
        let slot = self.slot.read();
        match slot.status {
            DeviceStatus::Ready => slot.device.clone(),
            _ => None,
        }
    }

    #[inline]
    pub fn is_usable(&self) -> bool {
        self.status() == DeviceStatus::Ready
    }

    pub fn register(&self, resource: Weak<dyn DeviceResource>) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrants.lock().push((id, resource));
        id
    }

    pub fn unregister(&self, id: RegistrationId) {
        self.registrants.lock().retain(|(rid, _)| *rid != id);
    }

    /// Number of registered resources that are still alive.
    pub fn registrant_count(&self) -> usize {
        self.registrants
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Poll the device and perform the `Ready -> Lost` transition if needed.
    ///
    /// Returns the cooperative level reported by the device, or `None`
    /// without a device.
    pub fn probe(&self) -> Option<CooperativeLevel> {
        let device = self.device()?;
        let level = device.check_cooperative_level();
        if level != CooperativeLevel::Ok && self.status() == DeviceStatus::Ready {
            self.mark_lost();
        }
        Some(level)
    }

    /// Transition to `Lost` and tell every registrant to release its resources.
    ///
    /// Returns `false` if the device was not `Ready` (already lost, or absent).
    pub fn mark_lost(&self) -> bool {
        let device = {
            let mut slot = self.slot.write();
            if slot.status != DeviceStatus::Ready {
                return false;
            }
            slot.status = DeviceStatus::Lost;
            slot.device.clone()
        };

        tracing::info!("Render device lost");
        if let Some(device) = device {
            for resource in self.snapshot() {
                resource.device_lost(device.as_ref());
            }
        }
        true
    }

    /// `Lost -> Resetting`. Returns `false` from any other state.
    pub fn begin_reset(&self) -> bool {
        let mut slot = self.slot.write();
        if slot.status != DeviceStatus::Lost {
            return false;
        }
        slot.status = DeviceStatus::Resetting;
        true
    }

    /// `Resetting -> Ready`, then tell every registrant to rebuild.
    pub fn complete_reset(&self) -> bool {
        let device = {
            let mut slot = self.slot.write();
            if slot.status != DeviceStatus::Resetting {
                return false;
            }
            let Some(device) = slot.device.clone() else {
                return false;
            };
            slot.caps = device.caps();
            slot.status = DeviceStatus::Ready;
            device
        };

        for resource in self.snapshot() {
            resource.device_reset(device.as_ref());
        }
        tracing::info!("Render device reset");
        true
    }

    /// Live registrants in registration order. Dead entries are pruned.
    fn snapshot(&self) -> Vec<Arc<dyn DeviceResource>> {
        let mut registrants = self.registrants.lock();
        registrants.retain(|(_, weak)| weak.strong_count() > 0);
        registrants
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_device::MockRenderDevice;

    #[derive(Default)]
    struct Counter {
        lost: Mutex<usize>,
        reset: Mutex<usize>,
    }

    impl DeviceResource for Counter {
        fn device_lost(&self, _device: &dyn RenderDevice) {
            *self.lost.lock() += 1;
        }

        fn device_reset(&self, _device: &dyn RenderDevice) {
            *self.reset.lock() += 1;
        }
    }

    /// Registers a new resource from inside the lost callback.
    struct Spawner {
        manager: Arc<DeviceLifecycleManager>,
        spawned: Mutex<Vec<Arc<Counter>>>,
    }

    impl DeviceResource for Spawner {
        fn device_lost(&self, _device: &dyn RenderDevice) {
            let child = Arc::new(Counter::default());
            let weak: Weak<dyn DeviceResource> = Arc::downgrade(&child) as _;
            self.manager.register(weak);
            self.spawned.lock().push(child);
        }

        fn device_reset(&self, _device: &dyn RenderDevice) {}
    }

    fn ready_manager() -> (Arc<DeviceLifecycleManager>, Arc<MockRenderDevice>) {
        let manager = DeviceLifecycleManager::new();
        let mock = Arc::new(MockRenderDevice::new());
        manager.attach_device(mock.clone());
        (manager, mock)
    }

    #[test]
    fn starts_without_device() {
        let manager = DeviceLifecycleManager::new();
        assert_eq!(manager.status(), DeviceStatus::NoDevice);
        assert!(manager.usable_device().is_none());
        assert!(manager.probe().is_none());
        assert!(!manager.mark_lost());
    }

    #[test]
    fn full_cycle_notifies_registrants() {
        let (manager, _mock) = ready_manager();
        let counter = Arc::new(Counter::default());
        let weak: Weak<dyn DeviceResource> = Arc::downgrade(&counter) as _;
        manager.register(weak);

        assert!(manager.mark_lost());
        assert_eq!(manager.status(), DeviceStatus::Lost);
        assert!(manager.usable_device().is_none());
        assert!(manager.device().is_some());
        assert_eq!(*counter.lost.lock(), 1);

        // Losing twice is a no-op.
        assert!(!manager.mark_lost());
        assert_eq!(*counter.lost.lock(), 1);

        assert!(manager.begin_reset());
        assert_eq!(manager.status(), DeviceStatus::Resetting);
        assert!(manager.complete_reset());
        assert_eq!(manager.status(), DeviceStatus::Ready);
        assert_eq!(*counter.reset.lock(), 1);
    }

    #[test]
    fn reset_requires_lost_state() {
        let (manager, _mock) = ready_manager();
        assert!(!manager.begin_reset());
        assert!(!manager.complete_reset());
        assert_eq!(manager.status(), DeviceStatus::Ready);
    }

    #[test]
    fn probe_detects_lost_device() {
        let (manager, mock) = ready_manager();
        assert_eq!(manager.probe(), Some(CooperativeLevel::Ok));
        assert!(manager.is_usable());

        mock.set_cooperative_level(CooperativeLevel::Lost);
        assert_eq!(manager.probe(), Some(CooperativeLevel::Lost));
        assert_eq!(manager.status(), DeviceStatus::Lost);
    }

    #[test]
    fn dropped_and_unregistered_resources_are_skipped() {
        let (manager, _mock) = ready_manager();
        let kept = Arc::new(Counter::default());
        let dropped = Arc::new(Counter::default());
        let removed = Arc::new(Counter::default());

        manager.register(Arc::downgrade(&kept) as Weak<dyn DeviceResource>);
        manager.register(Arc::downgrade(&dropped) as Weak<dyn DeviceResource>);
        let id = manager.register(Arc::downgrade(&removed) as Weak<dyn DeviceResource>);

        drop(dropped);
        manager.unregister(id);
        assert_eq!(manager.registrant_count(), 1);

        manager.mark_lost();
        assert_eq!(*kept.lost.lock(), 1);
        assert_eq!(*removed.lost.lock(), 0);
    }

    #[test]
    fn registration_during_notification_is_safe() {
        let (manager, _mock) = ready_manager();
        let spawner = Arc::new(Spawner {
            manager: manager.clone(),
            spawned: Mutex::new(Vec::new()),
        });
        manager.register(Arc::downgrade(&spawner) as Weak<dyn DeviceResource>);

        manager.mark_lost();

        // The child joined after the snapshot was taken.
        let spawned = spawner.spawned.lock();
        assert_eq!(spawned.len(), 1);
        assert_eq!(*spawned[0].lost.lock(), 0);
        assert_eq!(manager.registrant_count(), 2);
    }
}
