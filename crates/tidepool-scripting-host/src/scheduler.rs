use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::engine::EngineHandle;
use crate::error::{EngineError, ValidationError};
use crate::handler::{self, HandlerRef};

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct PendingTimer {
    handler: HandlerRef,
    fire_at: Instant,
}

/// Pending timers ordered by nothing in particular; `tick` sorts what fires
#[derive(Debug, Default)]
struct TimerQueue {
    timers: HashMap<TimerId, PendingTimer>,
    next_id: u64,
    stopped: bool,
}

impl TimerQueue {
    fn schedule(&mut self, fire_at: Instant, handler: HandlerRef) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(id, PendingTimer { handler, fire_at });
        id
    }

    fn cancel(&mut self, id: TimerId) -> Option<HandlerRef> {
        self.timers.remove(&id).map(|t| t.handler)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fire_at).min()
    }

    /// Remove and return every timer due at `now`, earliest first
    fn tick(&mut self, now: Instant) -> Vec<(TimerId, HandlerRef)> {
        let mut due: Vec<_> = self
            .timers
            .iter()
            .filter(|(_, t)| now >= t.fire_at)
            .map(|(id, t)| (t.fire_at, *id))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, id)| self.timers.remove(&id).map(|t| (id, t.handler)))
            .collect()
    }
}

struct Shared {
    queue: Mutex<TimerQueue>,
    wake: Condvar,
}

/// Runs script callbacks after a delay
///
/// A single timer thread sleeps until the earliest deadline and then queues
/// the callback on the script engine without waiting for it. Each callback's
/// handler is released once it has run.
pub struct DeferredTaskScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredTaskScheduler {
    pub fn start(engine: EngineHandle) -> Result<Self, EngineError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TimerQueue::default()),
            wake: Condvar::new(),
        });

        let worker = shared.clone();
        let thread = thread::Builder::new()
            .name("tidepool-timers".to_string())
            .spawn(move || run_timers(worker, engine))
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Reject delays a timer can never honour
    pub fn validate_delay(delay_secs: f64) -> Result<Duration, ValidationError> {
        if !delay_secs.is_finite() {
            return Err(ValidationError::new("delay must be a finite number"));
        }
        if delay_secs < 0.0 {
            return Err(ValidationError::new("delay cannot be negative"));
        }
        Duration::try_from_secs_f64(delay_secs)
            .ok()
            .filter(|delay| Instant::now().checked_add(*delay).is_some())
            .ok_or_else(|| ValidationError::new(format!("delay of {} seconds is too large", delay_secs)))
    }

    /// Fire `handler` once, `delay_secs` from now
    pub fn schedule_after(
        &self,
        handler: HandlerRef,
        delay_secs: f64,
    ) -> Result<TimerId, ValidationError> {
        let delay = Self::validate_delay(delay_secs)?;

        let mut queue = self.shared.queue.lock();
        if queue.stopped {
            return Err(ValidationError::new("scheduler is shut down"));
        }
        let fire_at = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| ValidationError::new("delay is too large"))?;
        let id = queue.schedule(fire_at, handler);
        drop(queue);

        self.shared.wake.notify_one();
        debug!(target: "scripting", "Scheduled timer {:?} in {:?}", id, delay);
        Ok(id)
    }

    /// Remove a pending timer and hand back its handler so the caller can
    /// release it. Returns `None` if the timer already fired or was cancelled.
    pub fn cancel(&self, id: TimerId) -> Option<HandlerRef> {
        let handler = self.shared.queue.lock().cancel(id);
        if handler.is_some() {
            self.shared.wake.notify_one();
        }
        handler
    }

    pub fn active_count(&self) -> usize {
        self.shared.queue.lock().timers.len()
    }

    /// Drop every pending timer and stop the timer thread
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.stopped {
                return;
            }
            queue.stopped = true;
            let dropped = queue.timers.len();
            queue.timers.clear();
            if dropped > 0 {
                debug!(target: "scripting", "Dropped {} pending timer(s) at shutdown", dropped);
            }
        }
        self.shared.wake.notify_all();

        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                error!(target: "scripting", "Timer thread panicked");
            }
        }
    }
}

impl Drop for DeferredTaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timers(shared: Arc<Shared>, engine: EngineHandle) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.stopped {
            break;
        }

        let due = queue.tick(Instant::now());
        if !due.is_empty() {
            parking_lot::MutexGuard::unlocked(&mut queue, || {
                for (id, handler) in due {
                    fire(&engine, id, handler);
                }
            });
            continue;
        }

        match queue.next_deadline() {
            Some(at) => {
                shared.wake.wait_until(&mut queue, at);
            }
            None => shared.wake.wait(&mut queue),
        }
    }
}

fn fire(engine: &EngineHandle, id: TimerId, handler: HandlerRef) {
    if !engine.is_alive() {
        debug!(target: "scripting", "Engine stopped; dropping timer {:?}", id);
        return;
    }

    let label = handler.to_string();
    let submitted = engine.submit(
        &label,
        move |lua| {
            let result = handler::call(lua, &handler, ());
            handler::release(lua, &handler)?;
            result
        },
        false,
    );

    if let Err(e) = submitted {
        debug!(target: "scripting", "Timer {:?} not run: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOptions, ScriptEngine};
    use mlua::Function;

    #[test]
    fn test_tick_returns_due_in_order() {
        let mut queue = TimerQueue::default();
        let t0 = Instant::now();
        let late = queue.schedule(t0 + Duration::from_millis(20), HandlerRef::scoped("late"));
        let early = queue.schedule(t0 + Duration::from_millis(10), HandlerRef::scoped("early"));
        queue.schedule(t0 + Duration::from_secs(10), HandlerRef::scoped("later"));

        assert!(queue.tick(t0).is_empty());

        let fired = queue.tick(t0 + Duration::from_millis(30));
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].0, early);
        assert_eq!(fired[1].0, late);
        assert_eq!(queue.timers.len(), 1);
    }

    #[test]
    fn test_cancel_timer() {
        let mut queue = TimerQueue::default();
        let id = queue.schedule(Instant::now(), HandlerRef::scoped("x"));
        assert_eq!(queue.cancel(id), Some(HandlerRef::scoped("x")));
        assert_eq!(queue.cancel(id), None);
    }

    #[test]
    fn test_validate_delay() {
        assert!(DeferredTaskScheduler::validate_delay(-1.0).is_err());
        assert!(DeferredTaskScheduler::validate_delay(f64::NAN).is_err());
        assert!(DeferredTaskScheduler::validate_delay(f64::INFINITY).is_err());
        assert!(DeferredTaskScheduler::validate_delay(1e20).is_err());
        assert!(DeferredTaskScheduler::validate_delay(1e19).is_err());
        assert_eq!(
            DeferredTaskScheduler::validate_delay(0.0).unwrap(),
            Duration::ZERO
        );
    }

    fn bind(engine: &ScriptEngine, id: &str, source: &'static str) -> HandlerRef {
        let handler = HandlerRef::scoped(id);
        let h = handler.clone();
        engine
            .execute("bind", move |lua| {
                let func: Function = lua.load(source).eval()?;
                handler::bind(lua, &h, func)
            })
            .unwrap();
        handler
    }

    #[test]
    fn test_timer_fires_and_releases_handler() {
        let engine = ScriptEngine::start(EngineOptions::default()).unwrap();
        let scheduler = DeferredTaskScheduler::start(engine.handle()).unwrap();
        let h = bind(&engine, "tick", "return function() fired = true end");

        scheduler.schedule_after(h.clone(), 0.02).unwrap();
        thread::sleep(Duration::from_millis(150));

        let (fired, bound) = engine
            .execute("check", move |lua| {
                let fired: Option<bool> = lua.globals().get("fired")?;
                Ok((fired, handler::is_bound(lua, &h)?))
            })
            .unwrap();
        assert_eq!(fired, Some(true));
        assert!(!bound);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let engine = ScriptEngine::start(EngineOptions::default()).unwrap();
        let scheduler = DeferredTaskScheduler::start(engine.handle()).unwrap();
        let h = bind(&engine, "never", "return function() fired = true end");

        let id = scheduler.schedule_after(h.clone(), 0.05).unwrap();
        assert_eq!(scheduler.cancel(id), Some(h));
        thread::sleep(Duration::from_millis(120));

        let fired: Option<bool> = engine
            .execute("check", |lua| lua.globals().get("fired"))
            .unwrap();
        assert_eq!(fired, None);
    }

    #[test]
    fn test_shutdown_drops_pending() {
        let engine = ScriptEngine::start(EngineOptions::default()).unwrap();
        let scheduler = DeferredTaskScheduler::start(engine.handle()).unwrap();
        scheduler
            .schedule_after(HandlerRef::scoped("a"), 30.0)
            .unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler
            .schedule_after(HandlerRef::scoped("b"), 1.0)
            .is_err());
    }
}
