//! Headless X11 session bring-up
//!
//! Starts Xvfb and an XFCE session on the configured display, disables
//! blanking and compositing, and sets a wallpaper. The session children
//! are killed in reverse start order on shutdown.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{AppError, Result};

const X_SERVER_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_SETTLE: Duration = Duration::from_secs(3);

const DEFAULT_WALLPAPER: &str = "/usr/share/backgrounds/xfce/xfce-shapes.svg";

/// Running X11 session (Xvfb plus the desktop session)
pub struct X11Session {
    children: Vec<(&'static str, Child)>,
    lock_path: String,
    socket_path: String,
}

impl X11Session {
    /// Start Xvfb and xfce4-session on `:<display_num>` and configure the
    /// desktop for capture.
    pub async fn start(display_num: &str) -> Result<Self> {
        let display_str = format!(":{}", display_num);
        info!("starting Xvfb on {}", display_str);

        // Clean up stale locks from a previous run
        let lock_path = format!("/tmp/.X{}-lock", display_num);
        let socket_path = format!("/tmp/.X11-unix/X{}", display_num);
        let _ = std::fs::remove_file(&lock_path);
        let _ = std::fs::remove_file(&socket_path);

        let xvfb = Command::new("Xvfb")
            .args([
                display_str.as_str(),
                "-screen",
                "0",
                "1920x1080x24",
                "-nolisten",
                "tcp",
                "-ac",
                "+extension",
                "RANDR",
            ])
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Session(format!("failed to start Xvfb: {}", e)))?;

        let mut session = Self {
            children: vec![("Xvfb", xvfb)],
            lock_path,
            socket_path: socket_path.clone(),
        };

        wait_for_x_server(&socket_path, X_SERVER_TIMEOUT).await?;
        info!("Xvfb is ready");

        configure_blanking(&display_str).await;

        info!("starting xfce4-session");
        let desktop = Command::new("dbus-run-session")
            .arg("xfce4-session")
            .env("DISPLAY", &display_str)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Session(format!("failed to start xfce4-session: {}", e)))?;
        session.children.push(("xfce4-session", desktop));

        tokio::time::sleep(SESSION_SETTLE).await;

        // The session manager re-enables blanking, so run xset again
        configure_blanking(&display_str).await;
        let _ = run_with_display(
            "xfconf-query",
            &["-c", "xfwm4", "-p", "/general/use_compositing", "-s", "false"],
            &display_str,
        )
        .await;

        set_wallpaper(&display_str).await;

        Ok(session)
    }

    /// Kill the session children in reverse start order, then unlink the
    /// X server's lock file and socket.
    pub async fn shutdown(&mut self) {
        for (name, child) in self.children.iter_mut().rev() {
            info!("killing {}", name);
            if let Err(e) = child.start_kill() {
                warn!("failed to kill {}: {}", name, e);
            }
            let _ = child.wait().await;
        }
        self.children.clear();

        let _ = std::fs::remove_file(&self.lock_path);
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Resize the display, trying `xrandr -s` then `xrandr --fb`.
pub async fn resize_display(display_str: &str, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(AppError::Session(format!(
            "invalid resize: {}x{}",
            width, height
        )));
    }
    let mode = format!("{}x{}", width, height);
    info!("resizing display {} to {}", display_str, mode);

    if run_with_display("xrandr", &["-s", &mode], display_str)
        .await
        .is_ok()
    {
        return Ok(());
    }
    run_with_display("xrandr", &["--fb", &mode], display_str)
        .await
        .map_err(|e| AppError::Session(format!("xrandr --fb failed: {}", e)))?;
    Ok(())
}

async fn wait_for_x_server(socket_path: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if std::path::Path::new(socket_path).exists() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(AppError::Session("timed out waiting for X server".into()))
}

async fn configure_blanking(display_str: &str) {
    let _ = run_with_display("xset", &["s", "off"], display_str).await;
    let _ = run_with_display("xset", &["-dpms"], display_str).await;
    let _ = run_with_display("xset", &["s", "noblank"], display_str).await;
}

/// Find the session D-Bus address through the running xfconfd.
async fn session_dbus_address() -> Option<String> {
    let output = Command::new("pgrep")
        .args(["-x", "xfconfd"])
        .output()
        .await
        .ok()?;
    let pids = String::from_utf8_lossy(&output.stdout);
    let pid = pids.split_whitespace().next()?.to_string();

    let environ = tokio::fs::read(format!("/proc/{}/environ", pid))
        .await
        .ok()?;
    String::from_utf8_lossy(&environ)
        .split('\0')
        .find_map(|entry| {
            entry
                .strip_prefix("DBUS_SESSION_BUS_ADDRESS=")
                .map(str::to_string)
        })
}

/// Set the wallpaper on every monitor/workspace image property.
async fn set_wallpaper(display_str: &str) {
    let Some(dbus_addr) = session_dbus_address().await else {
        warn!("could not find session bus address; wallpaper not set");
        return;
    };

    let wallpaper =
        std::env::var("WALLPAPER").unwrap_or_else(|_| DEFAULT_WALLPAPER.to_string());

    let listing = Command::new("xfconf-query")
        .args(["-c", "xfce4-desktop", "-l"])
        .env("DISPLAY", display_str)
        .env("DBUS_SESSION_BUS_ADDRESS", &dbus_addr)
        .output()
        .await;
    let Ok(listing) = listing else { return };

    let props = String::from_utf8_lossy(&listing.stdout);
    let image_props: Vec<&str> = props
        .lines()
        .map(str::trim)
        .filter(|p| p.ends_with("/last-image"))
        .collect();

    for prop in &image_props {
        let _ = Command::new("xfconf-query")
            .args(["-c", "xfce4-desktop", "-p", prop, "-s", &wallpaper])
            .env("DISPLAY", display_str)
            .env("DBUS_SESSION_BUS_ADDRESS", &dbus_addr)
            .status()
            .await;
        let style_prop = format!("{}/image-style", prop.trim_end_matches("/last-image"));
        let _ = Command::new("xfconf-query")
            .args(["-c", "xfce4-desktop", "-p", &style_prop, "-s", "5"])
            .env("DISPLAY", display_str)
            .env("DBUS_SESSION_BUS_ADDRESS", &dbus_addr)
            .status()
            .await;
    }

    if !image_props.is_empty() {
        let _ = Command::new("xfdesktop")
            .arg("--reload")
            .env("DISPLAY", display_str)
            .env("DBUS_SESSION_BUS_ADDRESS", &dbus_addr)
            .status()
            .await;
        info!("wallpaper set to {}", wallpaper);
    }
}

async fn run_with_display(
    program: &str,
    args: &[&str],
    display_str: &str,
) -> std::io::Result<std::process::ExitStatus> {
    let status = Command::new(program)
        .args(args)
        .env("DISPLAY", display_str)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(status)
    } else {
        Err(std::io::Error::other(format!(
            "{} exited with {}",
            program, status
        )))
    }
}
