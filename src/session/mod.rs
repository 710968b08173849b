//! Graphical session management
//!
//! Brings up the headless X11 session (Xvfb + XFCE) the encoder captures,
//! resizes it on request, and launches allow-listed applications inside it.

pub mod apps;
pub mod x11;

pub use apps::{is_allowed, spawn_app};
pub use x11::{resize_display, X11Session};
