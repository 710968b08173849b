//! Input event serialization and coalescing
//!
//! `submit` never blocks: tasks land in a bounded queue (newest dropped on
//! overflow) and a single worker drains them in order. Contiguous runs of
//! pointer moves collapse to their latest position, dispatched at most
//! every 8 ms, while key and button events keep their order relative to
//! each other and to the move that preceded them.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::keymap;
use crate::config::ConfigRegistry;

const QUEUE_CAPACITY: usize = 2000;

/// Pointer moves dispatch at most every 8 ms (125 Hz), matching the
/// client-side throttle
const MOVE_INTERVAL: Duration = Duration::from_millis(8);

/// Raw input event as received from a client
#[derive(Debug, Clone)]
pub enum InputTask {
    Key { key: String, down: bool },
    Move { nx: f64, ny: f64 },
    Button { button: u8, down: bool },
}

/// Injection action after key mapping and coordinate scaling
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Key { keysym: String, down: bool },
    MoveTo { x: i32, y: i32 },
    Button { button: u8, down: bool },
}

/// Seam between the coalescing worker and the injection tool
pub trait InputExecutor: Send {
    fn execute(&mut self, action: InputAction);
}

/// Executor invoking xdotool against the graphical session
pub struct XdotoolExecutor {
    display: String,
}

impl XdotoolExecutor {
    pub fn new(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
        }
    }

    fn run(&self, args: &[&str]) {
        match Command::new("xdotool")
            .args(args)
            .env("DISPLAY", &self.display)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut child) => {
                // Reap in the background; injection never back-pressures
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!("xdotool spawn failed: {}", e),
        }
    }
}

impl InputExecutor for XdotoolExecutor {
    fn execute(&mut self, action: InputAction) {
        match action {
            InputAction::Key { keysym, down } => {
                let mode = if down { "keydown" } else { "keyup" };
                self.run(&[mode, &keysym]);
            }
            InputAction::MoveTo { x, y } => {
                self.run(&["mousemove", &x.to_string(), &y.to_string()]);
            }
            InputAction::Button { button, down } => {
                // Web buttons 0/1/2 are X buttons 1/2/3
                let xbutton = match button {
                    1 => "2",
                    2 => "3",
                    _ => "1",
                };
                let mode = if down { "mousedown" } else { "mouseup" };
                self.run(&[mode, xbutton]);
            }
        }
    }
}

/// Handle for submitting input events to the worker
#[derive(Clone)]
pub struct InputCoalescer {
    tx: mpsc::Sender<InputTask>,
}

impl InputCoalescer {
    /// Spawn the worker draining the queue into the executor.
    pub fn spawn(executor: Box<dyn InputExecutor>, registry: Arc<ConfigRegistry>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(worker(rx, executor, registry));
        Self { tx }
    }

    /// Enqueue a task without blocking; dropped when the queue is full.
    pub fn submit(&self, task: InputTask) {
        if self.tx.try_send(task).is_err() {
            debug!("input queue full, dropping event");
        }
    }
}

async fn worker(
    mut rx: mpsc::Receiver<InputTask>,
    mut executor: Box<dyn InputExecutor>,
    registry: Arc<ConfigRegistry>,
) {
    let mut last_move: Option<Instant> = None;

    while let Some(task) = rx.recv().await {
        match task {
            InputTask::Move { nx, ny } => {
                let mut pending = (nx, ny);
                // Collapse every queued move into the latest position; a
                // key or button event ends the run and executes after the
                // move that preceded it.
                loop {
                    match rx.try_recv() {
                        Ok(InputTask::Move { nx, ny }) => pending = (nx, ny),
                        Ok(other) => {
                            flush_move(pending, &mut last_move, &mut *executor, &registry);
                            dispatch(other, &mut *executor);
                            break;
                        }
                        Err(_) => {
                            flush_move(pending, &mut last_move, &mut *executor, &registry);
                            break;
                        }
                    }
                }
            }
            other => dispatch(other, &mut *executor),
        }
    }
}

/// Dispatch the coalesced move unless the 125 Hz cap suppresses it.
fn flush_move(
    (nx, ny): (f64, f64),
    last_move: &mut Option<Instant>,
    executor: &mut dyn InputExecutor,
    registry: &ConfigRegistry,
) {
    let allowed = last_move.map_or(true, |at| at.elapsed() >= MOVE_INTERVAL);
    if !allowed {
        return;
    }
    let (width, height) = registry.screen_size();
    executor.execute(InputAction::MoveTo {
        x: (nx * f64::from(width)).round() as i32,
        y: (ny * f64::from(height)).round() as i32,
    });
    *last_move = Some(Instant::now());
}

fn dispatch(task: InputTask, executor: &mut dyn InputExecutor) {
    match task {
        InputTask::Key { key, down } => {
            // Unknown key symbols are silently rejected
            if let Some(keysym) = keymap::map_key(&key) {
                executor.execute(InputAction::Key {
                    keysym: keysym.to_string(),
                    down,
                });
            }
        }
        InputTask::Button { button, down } => {
            executor.execute(InputAction::Button { button, down });
        }
        InputTask::Move { .. } => unreachable!("moves are coalesced before dispatch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<InputAction>>>);

    impl Recorder {
        fn actions(&self) -> Vec<InputAction> {
            self.0.lock().unwrap().clone()
        }
    }

    impl InputExecutor for Recorder {
        fn execute(&mut self, action: InputAction) {
            self.0.lock().unwrap().push(action);
        }
    }

    fn registry_1280x720() -> Arc<ConfigRegistry> {
        let (registry, _rx) = ConfigRegistry::new(30);
        registry.set_screen_size(1280, 720);
        registry
    }

    async fn run_worker(tasks: Vec<InputTask>, registry: Arc<ConfigRegistry>) -> Vec<InputAction> {
        let recorder = Recorder::default();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        for task in tasks {
            tx.try_send(task).unwrap();
        }
        drop(tx);
        worker(rx, Box::new(recorder.clone()), registry).await;
        recorder.actions()
    }

    #[tokio::test(start_paused = true)]
    async fn move_run_collapses_to_its_last_position() {
        let mut tasks: Vec<InputTask> = (0..100)
            .map(|i| InputTask::Move {
                nx: i as f64 / 100.0,
                ny: 0.5,
            })
            .collect();
        tasks.push(InputTask::Key {
            key: "a".into(),
            down: true,
        });

        let actions = run_worker(tasks, registry_1280x720()).await;

        assert_eq!(
            actions,
            vec![
                InputAction::MoveTo { x: 1267, y: 360 },
                InputAction::Key {
                    keysym: "a".into(),
                    down: true
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_move_run_is_rate_limited() {
        let mut tasks: Vec<InputTask> = (0..10)
            .map(|_| InputTask::Move { nx: 0.1, ny: 0.1 })
            .collect();
        tasks.push(InputTask::Button {
            button: 0,
            down: true,
        });
        tasks.extend((0..10).map(|_| InputTask::Move { nx: 0.9, ny: 0.9 }));

        // Time never advances, so the second run falls inside the 8 ms cap
        let actions = run_worker(tasks, registry_1280x720()).await;

        assert_eq!(
            actions,
            vec![
                InputAction::MoveTo { x: 128, y: 72 },
                InputAction::Button {
                    button: 0,
                    down: true
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn keys_and_buttons_keep_their_order() {
        let tasks = vec![
            InputTask::Key {
                key: "Shift".into(),
                down: true,
            },
            InputTask::Key {
                key: "a".into(),
                down: true,
            },
            InputTask::Key {
                key: "a".into(),
                down: false,
            },
            InputTask::Key {
                key: "Shift".into(),
                down: false,
            },
        ];

        let actions = run_worker(tasks, registry_1280x720()).await;

        assert_eq!(
            actions,
            vec![
                InputAction::Key {
                    keysym: "Shift_L".into(),
                    down: true
                },
                InputAction::Key {
                    keysym: "a".into(),
                    down: true
                },
                InputAction::Key {
                    keysym: "a".into(),
                    down: false
                },
                InputAction::Key {
                    keysym: "Shift_L".into(),
                    down: false
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_key_names_are_silently_dropped() {
        let tasks = vec![
            InputTask::Key {
                key: "not a key".into(),
                down: true,
            },
            InputTask::Key {
                key: "Enter".into(),
                down: true,
            },
        ];

        let actions = run_worker(tasks, registry_1280x720()).await;

        assert_eq!(
            actions,
            vec![InputAction::Key {
                keysym: "Return".into(),
                down: true
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn moves_scale_to_the_current_screen_size() {
        let (registry, _rx) = ConfigRegistry::new(30);
        registry.set_screen_size(1920, 1080);

        let actions = run_worker(vec![InputTask::Move { nx: 0.5, ny: 0.5 }], registry).await;

        assert_eq!(actions, vec![InputAction::MoveTo { x: 960, y: 540 }]);
    }
}
