//! Input event handling
//!
//! Client key and pointer events are serialized through a bounded queue,
//! coalesced, and injected into the X session with xdotool.

pub mod coalescer;
pub mod keymap;

pub use coalescer::{InputAction, InputCoalescer, InputExecutor, InputTask, XdotoolExecutor};
