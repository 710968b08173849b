//! Allow-listed application launch inside the graphical session

use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Programs a client may launch with the `spawn` control message
const ALLOWED_APPS: &[&str] = &[
    "gnome-calculator",
    "weston-terminal",
    "gedit",
    "mousepad",
    "xclock",
    "xeyes",
    "xfce4-terminal",
];

pub fn is_allowed(command: &str) -> bool {
    ALLOWED_APPS.contains(&command)
}

/// Launch an allow-listed program on the given display.
///
/// Anything not on the list is silently rejected; spawn failures are
/// logged and otherwise ignored.
pub fn spawn_app(command: &str, display: &str) {
    if !is_allowed(command) {
        return;
    }
    info!("spawning app: {}", command);
    match Command::new(command)
        .env("DISPLAY", display)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(mut child) => {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => warn!("failed to spawn app {}: {}", command, e),
    }
}
