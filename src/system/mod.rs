//! Idle-time readings from the desktop environments stint runs on.
//! [GenericIdleProbe] is the main artifact of this module, it picks the
//! implementation the binary was built with.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;

/// Contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait IdleProbe: Send {
    /// Milliseconds since the user last pressed a key or moved the mouse.
    fn idle_millis(&mut self) -> Result<u64>;
}

/// Cross-compatible [IdleProbe] implementation.
pub struct GenericIdleProbe {
    inner: Box<dyn IdleProbe>,
}

impl GenericIdleProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsIdleProbe;
                Ok(Self {
                    inner: Box::new(WindowsIdleProbe),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11IdleProbe;
                Ok(Self {
                    inner: Box::new(X11IdleProbe::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No idle probe was specified")
            }
        }
    }
}

impl IdleProbe for GenericIdleProbe {
    fn idle_millis(&mut self) -> Result<u64> {
        self.inner.idle_millis()
    }
}
