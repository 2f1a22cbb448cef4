//! Vulkan rendering backend: device selection, presentation chain, render
//! pass, command buffers and per-frame synchronization, driven by a small
//! front-end `Renderer`.

pub mod backend;
pub mod config;
pub mod error;
pub mod platform;
pub mod renderer;

pub use backend::{BackendSettings, VulkanBackend};
pub use config::Config;
pub use error::{BackendError, Result};
pub use renderer::{RenderPacket, Renderer, RendererBackend};
