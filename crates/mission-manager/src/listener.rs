use std::sync::Arc;

use crate::collaborators::MissionListener;

/// Fan-out over registered mission listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn MissionListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns false when `listener` was already registered.
    pub fn register(&mut self, listener: Arc<dyn MissionListener>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    pub fn unregister(&mut self, listener: &Arc<dyn MissionListener>) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|existing| !Arc::ptr_eq(existing, listener));
        self.listeners.len() != before
    }

    fn contains(&self, listener: &Arc<dyn MissionListener>) -> bool {
        self.listeners
            .iter()
            .any(|existing| Arc::ptr_eq(existing, listener))
    }

    pub fn notify_created(&self, mission_id: i32) {
        tracing::debug!(mission_id, "mission created");
        for listener in &self.listeners {
            listener.on_mission_created(mission_id);
        }
    }

    pub fn notify_destroyed(&self, mission_id: i32) {
        tracing::debug!(mission_id, "mission destroyed");
        for listener in &self.listeners {
            listener.on_mission_destroyed(mission_id);
        }
    }

    pub fn notify_snapshot_changed(&self, mission_id: i32) {
        for listener in &self.listeners {
            listener.on_mission_snapshot_changed(mission_id);
        }
    }

    pub fn notify_moved_to_front(&self, mission_id: i32) {
        tracing::debug!(mission_id, "mission moved to front");
        for listener in &self.listeners {
            listener.on_mission_moved_to_front(mission_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CountingListener {
        created: Mutex<Vec<i32>>,
    }

    impl MissionListener for CountingListener {
        fn on_mission_created(&self, mission_id: i32) {
            self.created.lock().expect("lock").push(mission_id);
        }
        fn on_mission_destroyed(&self, _mission_id: i32) {}
        fn on_mission_snapshot_changed(&self, _mission_id: i32) {}
        fn on_mission_moved_to_front(&self, _mission_id: i32) {}
    }

    #[test]
    fn unit_duplicate_registration_notifies_once() {
        let listener = Arc::new(CountingListener::default());
        let handle: Arc<dyn MissionListener> = listener.clone();
        let mut registry = ListenerRegistry::new();
        assert!(registry.register(handle.clone()));
        assert!(!registry.register(handle.clone()));
        registry.notify_created(3);
        assert_eq!(*listener.created.lock().expect("lock"), vec![3]);

        assert!(registry.unregister(&handle));
        assert!(registry.is_empty());
        registry.notify_created(4);
        assert_eq!(listener.created.lock().expect("lock").len(), 1);
    }
}
