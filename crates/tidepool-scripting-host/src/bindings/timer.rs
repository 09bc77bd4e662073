use mlua::{Function, Lua, MetaMethod, UserData, UserDataMethods};
use std::sync::Arc;

use crate::handler::{self, HandlerRef};
use crate::registry::Binding;
use crate::scheduler::{DeferredTaskScheduler, TimerId};

/// `timer.run_after(fn, seconds)`; returns a handle with `cancel()`
pub struct RunAfter {
    scheduler: Arc<DeferredTaskScheduler>,
}

impl RunAfter {
    pub fn new(scheduler: Arc<DeferredTaskScheduler>) -> Self {
        Self { scheduler }
    }
}

impl Binding for RunAfter {
    fn name(&self) -> &'static str {
        "run_after"
    }

    fn register(&self, lua: &Lua) -> mlua::Result<Function> {
        let scheduler = self.scheduler.clone();
        lua.create_function(move |lua, (func, delay): (Function, f64)| {
            DeferredTaskScheduler::validate_delay(delay)?;

            let h = HandlerRef::unique("timer");
            handler::bind(lua, &h, func)?;

            match scheduler.schedule_after(h.clone(), delay) {
                Ok(id) => Ok(TimerHandle {
                    id,
                    scheduler: scheduler.clone(),
                }),
                Err(e) => {
                    handler::release(lua, &h)?;
                    Err(e.into())
                }
            }
        })
    }
}

/// Script-side handle for a pending timer
pub struct TimerHandle {
    id: TimerId,
    scheduler: Arc<DeferredTaskScheduler>,
}

impl UserData for TimerHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        // true if the timer was still pending
        methods.add_method("cancel", |lua, this, ()| {
            match this.scheduler.cancel(this.id) {
                Some(h) => {
                    handler::release(lua, &h)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("timer({:?})", this.id))
        });
    }
}
