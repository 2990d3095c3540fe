//! Controller (§3 "Controller (process-wide singleton)"): owns the group
//! table, the connection-slot table, and lazily-started dispatcher and
//! interpolator tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use motion_common::config::LoadedConfig;

use crate::dispatcher::{DispatchInputs, RealtimeDispatcher};
use crate::group::ControlGroup;
use crate::handler::Timeouts;
use crate::interpolator;
use crate::primitives::MotionPrimitives;

/// Process-global motion controller. Created once at startup and shared
/// via `Arc` with every connection reader task (§3 "Lifecycle").
pub struct Controller {
    pub groups: Arc<Mutex<Vec<ControlGroup>>>,
    pub primitives: Arc<dyn MotionPrimitives>,
    pub stop_motion: Arc<AtomicBool>,
    pub period_ms: u32,
    pub timeouts: Timeouts,

    slots: Mutex<Vec<bool>>,
    tasks_running: Arc<AtomicBool>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    interpolator_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(config: &LoadedConfig, primitives: Arc<dyn MotionPrimitives>) -> Self {
        let groups = config
            .groups
            .iter()
            .map(|g| ControlGroup::new(g, config.server.queue_capacity))
            .collect();
        Self {
            groups: Arc::new(Mutex::new(groups)),
            primitives,
            stop_motion: Arc::new(AtomicBool::new(false)),
            period_ms: config.server.interpolation_period_ms,
            timeouts: Timeouts {
                motion_start_timeout_ms: config.server.motion_start_timeout_ms,
                motion_start_check_period_ms: config.server.motion_start_check_period_ms,
                motion_stop_timeout_ms: config.server.motion_stop_timeout_ms,
            },
            slots: Mutex::new(vec![false; config.server.max_connections]),
            tasks_running: Arc::new(AtomicBool::new(false)),
            dispatcher_handle: Mutex::new(None),
            interpolator_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn num_groups(&self) -> usize {
        self.groups.lock().unwrap().len()
    }

    pub fn is_motion_ready(&self) -> bool {
        self.primitives.status_update().is_motion_ready()
    }

    /// Number of currently occupied connection slots (§4.G "connected" I/O state).
    pub fn connections_in_use(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|&&occupied| occupied).count()
    }

    /// §4.G step 1: find a free slot; if this is the first live connection,
    /// lazily start the Dispatcher and per-group Interpolator tasks.
    pub fn acquire_connection_slot(&self) -> Option<usize> {
        let mut slots = self.slots.lock().unwrap();
        let idx = slots.iter().position(|&occupied| !occupied)?;
        let was_empty = slots.iter().all(|&occupied| !occupied);
        slots[idx] = true;
        if was_empty {
            self.start_realtime_tasks();
        }
        Some(idx)
    }

    /// §9 Open Question O1: scan every slot `i`, never the slot that was
    /// just released, and tear the shared tasks down only when *all*
    /// slots are free.
    pub fn release_connection_slot(&self, idx: usize) {
        let mut slots = self.slots.lock().unwrap();
        if idx < slots.len() {
            slots[idx] = false;
        }
        let all_free = slots.iter().all(|&occupied| !occupied);
        if all_free {
            self.stop_realtime_tasks();
        }
    }

    fn start_realtime_tasks(&self) {
        self.tasks_running.store(true, Ordering::SeqCst);

        let inputs = DispatchInputs {
            groups: Arc::clone(&self.groups),
            primitives: Arc::clone(&self.primitives),
            stop_motion: Arc::clone(&self.stop_motion),
            running: Arc::clone(&self.tasks_running),
        };
        let period_ms = self.period_ms;
        let handle = std::thread::spawn(move || {
            let mut dispatcher = RealtimeDispatcher::new(period_ms);
            dispatcher.run(&inputs);
        });
        *self.dispatcher_handle.lock().unwrap() = Some(handle);

        let num_groups = self.num_groups();
        let mut handles = self.interpolator_handles.lock().unwrap();
        for idx in 0..num_groups {
            let groups = Arc::clone(&self.groups);
            let primitives = Arc::clone(&self.primitives);
            let stop_motion = Arc::clone(&self.stop_motion);
            let running = Arc::clone(&self.tasks_running);
            let period_ms = self.period_ms as i64;
            handles.push(std::thread::spawn(move || {
                interpolator::run_loop(idx, groups, period_ms, primitives, stop_motion, running);
            }));
        }
    }

    fn stop_realtime_tasks(&self) {
        self.tasks_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        let handles = std::mem::take(&mut *self.interpolator_handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::SimulatedPrimitives;
    use motion_common::config::{GroupConfig, ServerConfig};
    use motion_common::consts::MAX_AXES_PER_GROUP;

    fn sample_config(max_connections: usize) -> LoadedConfig {
        LoadedConfig {
            server: ServerConfig {
                listen_address: "127.0.0.1:0".into(),
                interpolation_period_ms: 4,
                queue_capacity: 10,
                max_connections,
                queue_lock_timeout_ms: 100,
                motion_start_timeout_ms: 10,
                motion_start_check_period_ms: 1,
                motion_stop_timeout_ms: 10,
            },
            groups: vec![GroupConfig {
                group_no: 0,
                name: "Arm".into(),
                num_axes: 2,
                max_increment: [1000; MAX_AXES_PER_GROUP],
                max_speed: [2.0; MAX_AXES_PER_GROUP],
                pulse_per_radian: [10000.0; MAX_AXES_PER_GROUP],
                b_axis_slave: false,
            }],
        }
    }

    #[test]
    fn acquire_and_release_slot_roundtrip() {
        let controller = Controller::new(&sample_config(2), Arc::new(SimulatedPrimitives::new(1)));
        let a = controller.acquire_connection_slot().unwrap();
        let b = controller.acquire_connection_slot().unwrap();
        assert_ne!(a, b);
        assert!(controller.acquire_connection_slot().is_none());
        controller.release_connection_slot(a);
        assert!(controller.acquire_connection_slot().is_some());
        controller.release_connection_slot(b);
    }

    #[test]
    fn teardown_only_fires_once_all_slots_free() {
        let controller = Controller::new(&sample_config(2), Arc::new(SimulatedPrimitives::new(1)));
        let a = controller.acquire_connection_slot().unwrap();
        let b = controller.acquire_connection_slot().unwrap();
        assert!(controller.tasks_running.load(Ordering::SeqCst));
        controller.release_connection_slot(a);
        assert!(controller.tasks_running.load(Ordering::SeqCst), "must stay up while b is live");
        controller.release_connection_slot(b);
        assert!(!controller.tasks_running.load(Ordering::SeqCst));
    }
}
