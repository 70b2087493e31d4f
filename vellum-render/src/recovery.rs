//! Device-loss recovery.
//!
//! The device is observed once per frame. Loss moves it to `Lost`; while
//! lost, the cooperative level is polled with short sleeps until the
//! backend is ready again, then every live resource is restored.
//!
//! ```text
//!            level != Ok or back buffer lost
//!   Active ───────────────────────────────────► Lost
//!     ▲                                          │ poll (≤ max_polls, sleep)
//!     │        back buffer survived              │
//!     ├──────────────────────────────────────────┤
//!     │   restore surfaces → canvases → meshes   │
//!     └──────── → evict textures ◄───────────────┘
//!                                          WrongMode ─► fatal error
//! ```

use std::thread;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{Backend, BackendError, CooperativeLevel};
use crate::canvas::Canvas;
use crate::handle::HandleTable;
use crate::mesh::Mesh;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("Display mode changed; the device cannot be recovered")]
    WrongDisplayMode,
    #[error("Restore failed: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Active,
    Lost,
}

/// Polling parameters while the device is lost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Sleep between cooperative-level polls.
    pub poll_interval_ms: u64,
    /// Polls per frame before handing control back to the caller.
    pub max_polls_per_frame: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_polls_per_frame: 50,
        }
    }
}

/// Outcome of one wait on the cooperative level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Waiting,
}

/// Counts of resources brought back by one restore cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub canvases: usize,
    pub meshes: usize,
}

/// Tracks the Active/Lost state across frames.
#[derive(Debug)]
pub struct RecoveryController {
    state: DeviceState,
    config: RecoveryConfig,
    recoveries: u64,
    restore_pending: bool,
}

impl RecoveryController {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: DeviceState::Active,
            config,
            recoveries: 0,
            restore_pending: false,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Completed restore cycles.
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn mark_lost(&mut self) {
        self.state = DeviceState::Lost;
    }

    pub fn mark_active(&mut self) {
        if self.state == DeviceState::Lost {
            self.recoveries += 1;
        }
        self.state = DeviceState::Active;
        self.restore_pending = false;
    }

    /// A restore started and has not completed yet.
    ///
    /// Stays set across a failed attempt: by then the primary chain may
    /// already be back, so the back buffer no longer reports the loss.
    pub fn restore_pending(&self) -> bool {
        self.restore_pending
    }

    pub fn begin_restore(&mut self) {
        self.restore_pending = true;
    }

    /// Poll the cooperative level until it reports `Ok`, at most
    /// `max_polls_per_frame` times.
    pub fn wait_for_device(&self, backend: &dyn Backend) -> Result<Readiness, RecoveryError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        for poll in 0..self.config.max_polls_per_frame.max(1) {
            match backend.cooperative_level() {
                CooperativeLevel::Ok => return Ok(Readiness::Ready),
                CooperativeLevel::WrongMode => return Err(RecoveryError::WrongDisplayMode),
                CooperativeLevel::Lost => {
                    if poll + 1 < self.config.max_polls_per_frame && !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
            }
        }
        debug!("device still lost after {} polls", self.config.max_polls_per_frame);
        Ok(Readiness::Waiting)
    }
}

/// Bring back every live canvas and mesh after device loss.
///
/// The order matters: primary surfaces first, then canvases (which may
/// reference the primary chain), then meshes, then texture bindings.
pub fn restore_resources(
    backend: &mut dyn Backend,
    canvases: &mut HandleTable<Canvas>,
    meshes: &mut HandleTable<Mesh>,
) -> Result<RestoreReport, BackendError> {
    backend.restore_all_surfaces();
    let mut report = RestoreReport::default();
    for (_, canvas) in canvases.iter_mut() {
        canvas.restore(backend)?;
        report.canvases += 1;
    }
    for (_, mesh) in meshes.iter_mut() {
        mesh.restore(backend)?;
        report.meshes += 1;
    }
    backend.evict_managed_textures();
    for (_, canvas) in canvases.iter_mut() {
        canvas.evict_texture();
    }
    info!(
        "restored {} canvases and {} meshes",
        report.canvases, report.meshes
    );
    Ok(report)
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::canvas::CanvasUsage;
    use crate::format::PixelFormat;

    fn quick() -> RecoveryConfig {
        RecoveryConfig {
            poll_interval_ms: 0,
            max_polls_per_frame: 3,
        }
    }

    #[test]
    fn test_wait_ready_immediately() {
        let backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let controller = RecoveryController::new(quick());
        assert_eq!(controller.wait_for_device(&backend), Ok(Readiness::Ready));
    }

    #[test]
    fn test_wait_gives_up_while_lost() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        backend.lose_device();
        let controller = RecoveryController::new(quick());
        assert_eq!(controller.wait_for_device(&backend), Ok(Readiness::Waiting));
    }

    #[test]
    fn test_wrong_mode_is_fatal() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        backend.set_cooperative_level(CooperativeLevel::WrongMode);
        let controller = RecoveryController::new(quick());
        assert_eq!(
            controller.wait_for_device(&backend),
            Err(RecoveryError::WrongDisplayMode)
        );
    }

    #[test]
    fn test_mark_active_counts_recoveries() {
        let mut controller = RecoveryController::new(quick());
        controller.mark_active();
        assert_eq!(controller.recoveries(), 0);
        controller.mark_lost();
        assert_eq!(controller.state(), DeviceState::Lost);
        controller.mark_active();
        assert_eq!(controller.recoveries(), 1);
    }

    #[test]
    fn test_restore_pending_until_active() {
        let mut controller = RecoveryController::new(quick());
        controller.mark_lost();
        controller.begin_restore();
        assert!(controller.restore_pending());
        assert_eq!(controller.state(), DeviceState::Lost);
        controller.mark_active();
        assert!(!controller.restore_pending());
    }

    #[test]
    fn test_restore_resources_restores_and_evicts() {
        let mut backend = SoftwareBackend::new(PixelFormat::XRGB8888);
        let mut canvases = HandleTable::new();
        let mut meshes = HandleTable::new();
        let mut canvas =
            Canvas::allocate(&mut backend, 2, 2, PixelFormat::XRGB8888, CanvasUsage::Surface, false)
                .unwrap();
        canvas.bind_texture();
        let c = canvases.insert(canvas);
        meshes.insert(Mesh::allocate(&mut backend, 3, 1).unwrap());

        backend.lose_device();
        backend.set_cooperative_level(CooperativeLevel::Ok);
        let report = restore_resources(&mut backend, &mut canvases, &mut meshes).unwrap();

        assert_eq!(report, RestoreReport { canvases: 1, meshes: 1 });
        assert_eq!(backend.evictions(), 1);
        assert_eq!(backend.live_resources(), 2);
        let canvas = canvases.get(c).unwrap();
        assert!(!canvas.is_texture_bound());
        assert!(!backend.is_lost(canvas.surface()));
    }
}
