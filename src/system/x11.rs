use anyhow::Result;
use tracing::instrument;
use xcb::{
    Connection,
    screensaver::{QueryInfo, QueryInfoReply},
    x::Drawable,
};

use super::IdleProbe;

pub struct X11IdleProbe {
    connection: Connection,
    preferred_screen: i32,
}

impl X11IdleProbe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        Ok(Self {
            connection,
            preferred_screen,
        })
    }
}

impl IdleProbe for X11IdleProbe {
    #[instrument(skip(self))]
    fn idle_millis(&mut self) -> Result<u64> {
        let setup = self.connection.get_setup();
        // Currently the application only supports 1 x11 screen.
        let window = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .expect("The preferred screen should exist")
            .root();
        let cookie = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(window),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(cookie)?;
        Ok(reply.ms_since_user_input() as u64)
    }
}
