//! The 3D scene: one per device.

use crate::backend::{DeviceKind, ResourceId};

/// Pick the best device kind on offer.
///
/// Returns `None` when only software rasterisation is available, since a
/// scene needs at least a hardware device.
pub fn pick_device_kind(kinds: &[DeviceKind]) -> Option<DeviceKind> {
    kinds
        .iter()
        .copied()
        .max()
        .filter(|&kind| kind > DeviceKind::Software)
}

/// Active 3D context. The Z-buffer it owns is attached to the back canvas.
#[derive(Debug)]
pub struct Scene {
    device_kind: DeviceKind,
    depth_bits: u32,
    pub(crate) context: ResourceId,
}

impl Scene {
    pub(crate) fn new(device_kind: DeviceKind, depth_bits: u32, context: ResourceId) -> Self {
        Self {
            device_kind,
            depth_bits,
            context,
        }
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    pub fn depth_bits(&self) -> u32 {
        self.depth_bits
    }
}

// ===================================================================
// Tests
// ===================================================================
