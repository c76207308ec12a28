//! Application-facing display service surface.
//!
//! The outer request/response marshalling framework is out of scope; these
//! are the typed operations it would dispatch into. Operations the real
//! service only acknowledges are kept acknowledge-only here, with the same
//! log-and-succeed shape.

use lumen_display::{DisplayRegistry, EventHandle};
use lumen_parcel::payloads::NativeWindow;
use lumen_parcel::Parcel;
use tracing::{debug, error, warn};

use crate::error::{Result, ServiceError};
use crate::gate::{check_service_access, Permission, Policy};
use crate::router::TransactionRouter;

/// Fixed resolution reported for every display.
pub const DISPLAY_WIDTH: u64 = 1280;
pub const DISPLAY_HEIGHT: u64 = 720;

/// One record returned by [`DisplayService::list_displays`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub name: String,
    pub has_limited_layers: bool,
    pub max_layers: u64,
    pub width: u64,
    pub height: u64,
}

/// Scaling mode as requested over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestScalingMode {
    None = 0,
    Freeze = 1,
    ScaleToWindow = 2,
    ScaleAndCrop = 3,
    PreserveAspectRatio = 4,
}

impl GuestScalingMode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::None,
            1 => Self::Freeze,
            2 => Self::ScaleToWindow,
            3 => Self::ScaleAndCrop,
            4 => Self::PreserveAspectRatio,
            _ => return None,
        })
    }
}

/// Scaling mode in the service's internal numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertedScalingMode {
    Freeze = 0,
    ScaleToWindow = 1,
    ScaleAndCrop = 2,
    None = 3,
    PreserveAspectRatio = 4,
}

/// Maps the wire numbering onto the internal one; total over the recognized
/// modes, `OperationFailed` past them.
pub fn convert_scaling_mode(raw: u32) -> Result<ConvertedScalingMode> {
    match GuestScalingMode::from_raw(raw) {
        Some(GuestScalingMode::None) => Ok(ConvertedScalingMode::None),
        Some(GuestScalingMode::Freeze) => Ok(ConvertedScalingMode::Freeze),
        Some(GuestScalingMode::ScaleToWindow) => Ok(ConvertedScalingMode::ScaleToWindow),
        Some(GuestScalingMode::ScaleAndCrop) => Ok(ConvertedScalingMode::ScaleAndCrop),
        Some(GuestScalingMode::PreserveAspectRatio) => {
            Ok(ConvertedScalingMode::PreserveAspectRatio)
        }
        None => Err(ServiceError::OperationFailed),
    }
}

/// The display service handed to a caller that passed the access gate.
#[derive(Debug, Default)]
pub struct DisplayService {
    router: TransactionRouter,
}

impl DisplayService {
    /// Gate entry point: checks the caller class against the requested
    /// policy before handing out the service.
    pub fn open(permission: Permission, policy: Policy) -> Result<Self> {
        check_service_access(permission, policy)?;
        Ok(Self {
            router: TransactionRouter::new(DisplayRegistry::new()),
        })
    }

    /// Relay surface for parcel transactions.
    pub fn router(&mut self) -> &mut TransactionRouter {
        &mut self.router
    }

    pub fn registry(&self) -> &DisplayRegistry {
        self.router.registry()
    }

    pub fn registry_mut(&mut self) -> &mut DisplayRegistry {
        self.router.registry_mut()
    }

    /// Opens a display by name. Names arrive NUL-padded from the guest, so
    /// everything from the first NUL is ignored.
    pub fn open_display(&mut self, name: &str) -> Result<u64> {
        let name = name.split('\0').next().unwrap_or_default();
        debug!(name, "open_display");
        self.router
            .registry_mut()
            .open_display(name)
            .ok_or(ServiceError::NotFound)
    }

    pub fn open_default_display(&mut self) -> Result<u64> {
        self.open_display(lumen_display::DEFAULT_DISPLAY_NAME)
    }

    /// Acknowledge-only: the service keeps displays open for its lifetime.
    pub fn close_display(&mut self, display_id: u64) {
        warn!(display_id, "close_display acknowledged without effect");
    }

    /// Acknowledge-only, regardless of the input.
    pub fn set_display_enabled(&mut self, enabled: bool) {
        debug!(enabled, "set_display_enabled");
    }

    pub fn get_display_resolution(&mut self, display_id: u64) -> (u64, u64) {
        debug!(display_id, "get_display_resolution");
        (DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }

    pub fn list_displays(&self) -> Vec<DisplayInfo> {
        self.registry()
            .displays()
            .map(|display| DisplayInfo {
                name: display.name().to_owned(),
                has_limited_layers: true,
                max_layers: 1,
                width: 1920,
                height: 1080,
            })
            .collect()
    }

    /// Creates a layer (and its backing queue) on `display_id`, returning
    /// the layer id and the serialized native-window parcel addressing the
    /// queue.
    pub fn create_stray_layer(&mut self, flags: u32, display_id: u64) -> Result<(u64, Vec<u8>)> {
        debug!(flags, display_id, "create_stray_layer");
        let registry = self.router.registry_mut();
        let layer_id = registry
            .create_layer(display_id)
            .ok_or(ServiceError::NotFound)?;
        let queue_id = registry
            .find_buffer_queue_id(display_id, layer_id)
            .ok_or(ServiceError::NotFound)?;
        Ok((layer_id, Parcel::serialize(&NativeWindow { queue_id })))
    }

    /// Acknowledge-only: no layer destroy path is exposed.
    pub fn destroy_stray_layer(&mut self, layer_id: u64) {
        warn!(layer_id, "destroy_stray_layer acknowledged without effect");
    }

    /// Acknowledge-only: layers stay open for the service's lifetime.
    pub fn close_layer(&mut self, layer_id: u64) {
        warn!(layer_id, "close_layer acknowledged without effect");
    }

    /// Resolves an existing layer to its native-window parcel.
    pub fn open_layer(&mut self, display_name: &str, layer_id: u64) -> Result<Vec<u8>> {
        let display_id = self.open_display(display_name)?;
        let queue_id = self
            .registry()
            .find_buffer_queue_id(display_id, layer_id)
            .ok_or(ServiceError::NotFound)?;
        debug!(display_id, layer_id, queue_id, "open_layer");
        Ok(Parcel::serialize(&NativeWindow { queue_id }))
    }

    pub fn get_display_vsync_event(&self, display_id: u64) -> Result<EventHandle> {
        self.registry()
            .find_vsync_event(display_id)
            .ok_or(ServiceError::NotFound)
    }

    /// Accepts only the scaling modes the compositor implements; a mode past
    /// the wire range fails outright, a recognized-but-unimplemented one is
    /// distinctly unsupported.
    pub fn set_layer_scaling_mode(&mut self, raw_mode: u32, layer_id: u64) -> Result<()> {
        debug!(raw_mode, layer_id, "set_layer_scaling_mode");
        let Some(mode) = GuestScalingMode::from_raw(raw_mode) else {
            error!(raw_mode, "invalid scaling mode");
            return Err(ServiceError::OperationFailed);
        };
        if mode != GuestScalingMode::ScaleToWindow && mode != GuestScalingMode::PreserveAspectRatio
        {
            error!(?mode, "unsupported scaling mode");
            return Err(ServiceError::Unsupported);
        }
        Ok(())
    }
}
