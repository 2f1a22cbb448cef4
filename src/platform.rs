// Platform glue
//
// The backend needs two things from the windowing layer: the native handles
// to build a surface from, and the instance extensions that surface type
// requires. Anything that exposes raw-window-handle handles (a winit window,
// for instance) qualifies.

use crate::error::{BackendError, Result};
use ash::extensions::khr;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use std::ptr;

/// Native handles the backend builds its presentation surface from.
pub trait PlatformSurface {
    fn native_display_handle(&self) -> Result<RawDisplayHandle>;
    fn native_window_handle(&self) -> Result<RawWindowHandle>;
}

impl<T> PlatformSurface for T
where
    T: HasDisplayHandle + HasWindowHandle,
{
    fn native_display_handle(&self) -> Result<RawDisplayHandle> {
        self.display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| BackendError::Platform(format!("display handle unavailable: {}", e)))
    }

    fn native_window_handle(&self) -> Result<RawWindowHandle> {
        self.window_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| BackendError::Platform(format!("window handle unavailable: {}", e)))
    }
}

/// Instance extensions needed to present on `display`, surface extension included.
pub fn required_instance_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => {
            return Err(BackendError::Platform(format!(
                "unsupported display handle: {:?}",
                other
            )))
        }
    };
    Ok(vec![khr::Surface::name(), platform])
}

/// Create a presentation surface for the given native handles.
///
/// # Safety
/// The handles must stay valid until the returned surface is destroyed.
pub unsafe fn create_surface(
    entry: &Entry,
    instance: &Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let surface = match (display, window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map_or(0, |h| h.get());
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance as _)
                .hwnd(handle.hwnd.get() as _);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display.display.map_or(ptr::null_mut(), |d| d.as_ptr());
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy as _)
                .window(handle.window as _);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display.connection.map_or(ptr::null_mut(), |c| c.as_ptr());
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection as _)
                .window(handle.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr() as _)
                .surface(handle.surface.as_ptr() as _);
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)
        }
        (display, window) => {
            return Err(BackendError::Platform(format!(
                "unsupported handle pair: {:?} / {:?}",
                display, window
            )))
        }
    };

    surface.map_err(BackendError::SurfaceCreation)
}
