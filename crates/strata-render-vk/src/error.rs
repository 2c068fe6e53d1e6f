// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Every failure names the Vulkan entry point (or step) that produced it.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{op} failed: instance creation ({code:?})")]
    InstanceCreationFailed { op: &'static str, code: vk::Result },

    #[error("{op} failed: surface creation ({code:?})")]
    SurfaceCreationFailed { op: &'static str, code: vk::Result },

    #[error("{op}: no GPUs found on the system")]
    NoGpuFound { op: &'static str },

    #[error("{op}: required extension {name} is not available")]
    MissingExtension { op: &'static str, name: String },

    #[error("{op}: no surface format in {{B8G8R8A8_UNORM, R8G8B8A8_UNORM}} ({available} offered)")]
    NoSuitableFormat { op: &'static str, available: usize },

    #[error("{op}: surface has zero area ({width}x{height})")]
    SurfaceUnavailable {
        op: &'static str,
        width: u32,
        height: u32,
    },

    #[error("{op} failed: device lost")]
    DeviceLost { op: &'static str },

    #[error("{op}: swapchain out of date ({code:?})")]
    SwapchainOutOfDate { op: &'static str, code: vk::Result },

    #[error("{op}: timed out")]
    SyncTimeout { op: &'static str },

    #[error("{op}: shader {name} unavailable: {source}")]
    ShaderUnavailable {
        op: &'static str,
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} failed with {code:?}")]
    Call { op: &'static str, code: vk::Result },
}

impl RenderError {
    /// Classifies a raw status from `op`.
    pub fn from_vk(op: &'static str, code: vk::Result) -> Self {
        match code {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost { op },
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => {
                Self::SwapchainOutOfDate { op, code }
            }
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::SyncTimeout { op },
            _ => Self::Call { op, code },
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::InstanceCreationFailed { op, .. }
            | Self::SurfaceCreationFailed { op, .. }
            | Self::NoGpuFound { op }
            | Self::MissingExtension { op, .. }
            | Self::NoSuitableFormat { op, .. }
            | Self::SurfaceUnavailable { op, .. }
            | Self::DeviceLost { op }
            | Self::SwapchainOutOfDate { op, .. }
            | Self::SyncTimeout { op }
            | Self::ShaderUnavailable { op, .. }
            | Self::Call { op, .. } => op,
        }
    }

    /// Underlying status code, when the failure came from a Vulkan call.
    pub fn code(&self) -> Option<vk::Result> {
        match self {
            Self::InstanceCreationFailed { code, .. }
            | Self::SurfaceCreationFailed { code, .. }
            | Self::SwapchainOutOfDate { code, .. }
            | Self::Call { code, .. } => Some(*code),
            Self::DeviceLost { .. } => Some(vk::Result::ERROR_DEVICE_LOST),
            Self::SyncTimeout { .. } => Some(vk::Result::TIMEOUT),
            Self::NoGpuFound { .. }
            | Self::MissingExtension { .. }
            | Self::NoSuitableFormat { .. }
            | Self::SurfaceUnavailable { .. }
            | Self::ShaderUnavailable { .. } => None,
        }
    }

    /// Steady-state failures the frame loop absorbs instead of terminating.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SwapchainOutOfDate { .. } | Self::SyncTimeout { .. } | Self::SurfaceUnavailable { .. }
        )
    }
}

/// `.call("vkFoo")` on a raw ash result, in the spirit of `anyhow::Context`.
pub trait CallExt<T> {
    fn call(self, op: &'static str) -> Result<T>;
}

impl<T> CallExt<T> for std::result::Result<T, vk::Result> {
    fn call(self, op: &'static str) -> Result<T> {
        self.map_err(|code| RenderError::from_vk(op, code))
    }
}
