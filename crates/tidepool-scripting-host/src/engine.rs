//! The single Lua VM and the queue that serializes every access to it.
//!
//! The VM lives on a dedicated thread for its whole life. Gateway tasks, the
//! timer thread and the host itself never touch it directly: they hand the
//! engine a closure over `&Lua` and the engine runs those closures one at a
//! time, in submission order. Two handlers therefore never execute at once.

use mlua::{HookTriggers, Lua, MultiValue, VmState};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, trace, warn};

use crate::error::EngineError;
use crate::handler::{self, HandlerRef};

type Task = Box<dyn FnOnce(&Lua) + Send>;

/// Instructions between checks for a stop request from inside running Lua
const STOP_CHECK_INSTRUCTIONS: u32 = 10_000;

/// How long shutdown waits for the VM thread before leaving it behind
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

enum EngineMessage {
    Run { label: String, task: Task },
    Shutdown,
}

/// Options fixed at engine start
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// How long a blocking caller waits for its task before giving up.
    /// `None` waits indefinitely.
    pub invoke_timeout: Option<Duration>,
}

/// Cloneable submission handle for the engine
///
/// Routers and the timer thread hold one of these. Dropping every handle does
/// not stop the engine; only [`ScriptEngine::shutdown`] (or dropping the
/// engine) does.
#[derive(Clone)]
pub struct EngineHandle {
    tx: UnboundedSender<EngineMessage>,
    alive: Arc<AtomicBool>,
    engine_thread: ThreadId,
    invoke_timeout: Option<Duration>,
}

impl EngineHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// True when called from the engine's own thread
    pub fn is_engine_thread(&self) -> bool {
        thread::current().id() == self.engine_thread
    }

    /// Queue `task` on the engine.
    ///
    /// With `wait` the caller blocks until the task finishes and receives its
    /// error, if any. Without it the call returns as soon as the task is
    /// queued and failures are only logged.
    pub fn submit<F>(&self, label: &str, task: F, wait: bool) -> Result<(), EngineError>
    where
        F: FnOnce(&Lua) -> mlua::Result<()> + Send + 'static,
    {
        if wait {
            return self.execute(label, task);
        }

        let owned = label.to_string();
        self.enqueue(
            label,
            Box::new(move |lua| {
                if let Err(e) = task(lua) {
                    error!(target: "scripting", "Handler '{}' failed: {}", owned, e);
                }
            }),
        )
    }

    /// Run `task` on the engine and hand its result back to the caller
    pub fn execute<T, F>(&self, label: &str, task: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Lua) -> mlua::Result<T> + Send + 'static,
    {
        if self.is_engine_thread() {
            return Err(EngineError::Reentrant {
                label: label.to_string(),
            });
        }

        let (reply_tx, reply_rx) = sync_channel(1);
        let owned = label.to_string();
        self.enqueue(
            label,
            Box::new(move |lua| {
                let result = task(lua).map_err(|e| {
                    error!(target: "scripting", "Handler '{}' failed: {}", owned, e);
                    EngineError::handler(&owned, e)
                });
                let _ = reply_tx.send(result);
            }),
        )?;

        self.wait(label, reply_rx)
    }

    /// Call a bound handler with arguments built inside the VM
    pub fn invoke<F>(&self, handler: &HandlerRef, build_args: F) -> Result<(), EngineError>
    where
        F: FnOnce(&Lua) -> mlua::Result<MultiValue> + Send + 'static,
    {
        let target = handler.clone();
        self.execute(handler.as_str(), move |lua| {
            let args = build_args(lua)?;
            handler::call(lua, &target, args)
        })
    }

    fn enqueue(&self, label: &str, task: Task) -> Result<(), EngineError> {
        if !self.is_alive() {
            return Err(EngineError::Stopped);
        }
        self.tx
            .send(EngineMessage::Run {
                label: label.to_string(),
                task,
            })
            .map_err(|_| EngineError::Stopped)
    }

    fn wait<T>(
        &self,
        label: &str,
        reply_rx: Receiver<Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let received = match self.invoke_timeout {
            Some(after) => match reply_rx.recv_timeout(after) {
                Ok(result) => Some(result),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        target: "scripting",
                        "Handler '{}' still running after {:?}; caller gave up waiting",
                        label,
                        after
                    );
                    return Err(EngineError::Timeout {
                        label: label.to_string(),
                        after,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => reply_rx.recv().ok(),
        };

        match received {
            Some(result) => result,
            // The reply sender was dropped without a send: either the engine
            // discarded the task on shutdown or the task panicked.
            None if !self.is_alive() => Err(EngineError::Stopped),
            None => Err(EngineError::handler(label, "handler panicked")),
        }
    }

    fn request_shutdown(&self) -> bool {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(EngineMessage::Shutdown);
        true
    }
}

/// Owner of the VM thread
pub struct ScriptEngine {
    handle: EngineHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptEngine {
    /// Create the VM on a new thread and start draining the queue
    pub fn start(options: EngineOptions) -> Result<Self, EngineError> {
        let (tx, rx) = unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let worker_alive = alive.clone();
        let thread = thread::Builder::new()
            .name("tidepool-lua".to_string())
            .spawn(move || run_engine(rx, worker_alive))
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        let handle = EngineHandle {
            tx,
            alive,
            engine_thread: thread.thread().id(),
            invoke_timeout: options.invoke_timeout,
        };

        debug!(target: "scripting", "Script engine started");

        Ok(Self {
            handle,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// Stop the engine. Tasks still queued are discarded and blocked callers
    /// receive [`EngineError::Stopped`].
    pub fn shutdown(&self) {
        if !self.handle.request_shutdown() {
            return;
        }

        if self.handle.is_engine_thread() {
            return;
        }

        let Some(thread) = self.thread.lock().take() else {
            return;
        };

        // Running Lua is interrupted by the stop hook, but a task blocked in
        // host code is not; don't let it hold shutdown hostage.
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                error!(
                    target: "scripting",
                    "Script engine thread still busy after {:?}; leaving it detached",
                    SHUTDOWN_GRACE
                );
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }

        if thread.join().is_err() {
            error!(target: "scripting", "Script engine thread panicked during shutdown");
        }
        debug!(target: "scripting", "Script engine stopped");
    }
}

impl std::ops::Deref for ScriptEngine {
    type Target = EngineHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_engine(mut rx: UnboundedReceiver<EngineMessage>, alive: Arc<AtomicBool>) {
    let lua = Lua::new();

    let hook_alive = alive.clone();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(STOP_CHECK_INSTRUCTIONS),
        move |_lua, _debug| {
            if hook_alive.load(Ordering::Relaxed) {
                Ok(VmState::Continue)
            } else {
                Err(mlua::Error::RuntimeError(
                    "script engine is shutting down".to_string(),
                ))
            }
        },
    );

    while let Some(message) = rx.blocking_recv() {
        let EngineMessage::Run { label, task } = message else {
            break;
        };

        if !alive.load(Ordering::SeqCst) {
            break;
        }

        trace!(target: "scripting", "Running '{}'", label);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task(&lua))) {
            error!(
                target: "scripting",
                "Handler '{}' panicked: {}",
                label,
                panic_message(panic.as_ref())
            );
        }
    }

    alive.store(false, Ordering::SeqCst);
    rx.close();
    while rx.try_recv().is_ok() {}
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn start() -> ScriptEngine {
        ScriptEngine::start(EngineOptions::default()).unwrap()
    }

    #[test]
    fn test_execute_returns_value() {
        let engine = start();
        let n: i64 = engine
            .execute("eval", |lua| lua.load("return 40 + 2").eval())
            .unwrap();
        assert_eq!(n, 42);
    }

    #[test]
    fn test_tasks_run_in_submission_order() {
        let engine = start();
        engine
            .execute("init", |lua| lua.load("order = {}").exec())
            .unwrap();

        for i in 0..10 {
            engine
                .submit(
                    "push",
                    move |lua| lua.load(format!("table.insert(order, {})", i)).exec(),
                    false,
                )
                .unwrap();
        }

        let joined: String = engine
            .execute("read", |lua| lua.load("return table.concat(order, ',')").eval())
            .unwrap();
        assert_eq!(joined, "0,1,2,3,4,5,6,7,8,9");
    }

    #[test]
    fn test_script_error_is_isolated() {
        let engine = start();
        let err = engine
            .execute("boom", |lua| lua.load("error('bad')").exec())
            .unwrap_err();
        assert!(matches!(err, EngineError::Handler { ref label, .. } if label == "boom"));

        // Later tasks still run
        let ok: bool = engine
            .execute("after", |lua| lua.load("return true").eval())
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_panic_is_caught() {
        let engine = start();
        let err = engine
            .execute::<(), _>("panics", |_| panic!("kaboom"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Handler { .. }));
        assert!(engine.is_alive());
    }

    #[test]
    fn test_timeout_returns_to_caller() {
        let engine = ScriptEngine::start(EngineOptions {
            invoke_timeout: Some(Duration::from_millis(50)),
        })
        .unwrap();

        let started = Instant::now();
        let err = engine
            .execute("slow", |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_shutdown_interrupts_runaway_script() {
        let engine = ScriptEngine::start(EngineOptions {
            invoke_timeout: Some(Duration::from_millis(50)),
        })
        .unwrap();

        let err = engine
            .execute("spin", |lua| lua.load("while true do end").exec())
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            engine.shutdown();
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());
    }

    #[test]
    fn test_reentrant_wait_is_refused() {
        let engine = start();
        let handle = engine.handle();
        let inner: Result<(), EngineError> = engine
            .execute("outer", move |_| Ok(handle.execute("inner", |_| Ok(()))))
            .unwrap();
        assert!(matches!(inner, Err(EngineError::Reentrant { .. })));
    }

    #[test]
    fn test_submit_after_shutdown() {
        let engine = start();
        let handle = engine.handle();
        engine.shutdown();
        assert!(!handle.is_alive());
        assert_eq!(
            handle.submit("late", |_| Ok(()), false),
            Err(EngineError::Stopped)
        );
    }

    #[test]
    fn test_handlers_never_overlap() {
        let engine = start();
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handle = engine.handle();
                let running = running.clone();
                let overlaps = overlaps.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let running = running.clone();
                        let overlaps = overlaps.clone();
                        handle
                            .execute("work", move |_| {
                                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                                    overlaps.fetch_add(1, Ordering::SeqCst);
                                }
                                std::thread::sleep(Duration::from_micros(200));
                                running.fetch_sub(1, Ordering::SeqCst);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
