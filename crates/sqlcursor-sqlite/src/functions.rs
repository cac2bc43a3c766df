//! User-defined SQL functions and aggregates.
//!
//! The engine calls back into Rust from its own stack. Every trampoline
//! reads its arguments as plain primitives, runs the user code inside a
//! span with unwinding caught, adapts the result through the connection's
//! registry and reports any failure to the engine as a generic SQL error.

#![allow(clippy::cast_possible_truncation)]

use crate::connection::{Connection, SharedRegistry, registry_snapshot};
use crate::error::from_db;
use crate::ffi;
use crate::types;
use sqlcursor_core::{Error, Result, Value};
use std::any::Any;
use std::collections::HashMap;
use std::ffi::{CString, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};

const FUNCTION_FAILED: &str = "user-defined function raised exception";
const STEP_FAILED: &str = "user-defined aggregate's 'step' method raised error";
const FINALIZE_FAILED: &str = "user-defined aggregate's 'finalize' method raised error";

/// Accumulator for a user-defined aggregate.
///
/// A fresh accumulator is made for every group of every query and dropped
/// once that group is finalized.
pub trait Aggregate: Send {
    fn step(&mut self, args: &[Value]) -> Result<()>;
    fn finalize(&mut self) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Same inputs always give the same output; lets the planner use the
    /// function in indexes and constant folding.
    pub deterministic: bool,
}

impl FunctionFlags {
    fn text_rep(self) -> c_int {
        if self.deterministic {
            ffi::SQLITE_UTF8 | ffi::SQLITE_DETERMINISTIC
        } else {
            ffi::SQLITE_UTF8
        }
    }
}

type ScalarFn = Box<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
type AggregateFactory = Box<dyn Fn() -> Box<dyn Aggregate> + Send + Sync>;

struct ScalarSlot {
    name: String,
    func: ScalarFn,
    registry: SharedRegistry,
}

struct AggregateSlot {
    name: String,
    factory: AggregateFactory,
    registry: SharedRegistry,
    /// Live accumulators keyed by the engine's per-group context address.
    live: Mutex<HashMap<usize, Box<dyn Aggregate>>>,
}

impl Connection {
    /// Register a scalar SQL function. `n_args == -1` accepts any number
    /// of arguments. Registering a name again replaces the function.
    pub fn create_function<F>(&self, name: &str, n_args: i32, func: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.create_function_with_flags(name, n_args, FunctionFlags::default(), func)
    }

    pub fn create_function_with_flags<F>(
        &self,
        name: &str,
        n_args: i32,
        flags: FunctionFlags,
        func: F,
    ) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let slot = Box::new(ScalarSlot {
            name: name.to_string(),
            func: Box::new(func),
            registry: self.shared_registry(),
        });
        self.install(
            name,
            n_args,
            flags,
            Box::into_raw(slot).cast(),
            Callbacks {
                func: Some(call_scalar),
                step: None,
                finalize: None,
                destroy: destroy_slot::<ScalarSlot>,
            },
        )
    }

    /// Register an aggregate built from `factory` once per group.
    pub fn create_aggregate<A, F>(&self, name: &str, n_args: i32, factory: F) -> Result<()>
    where
        A: Aggregate + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let slot = Box::new(AggregateSlot {
            name: name.to_string(),
            factory: Box::new(move || Box::new(factory()) as Box<dyn Aggregate>),
            registry: self.shared_registry(),
            live: Mutex::new(HashMap::new()),
        });
        self.install(
            name,
            n_args,
            FunctionFlags::default(),
            Box::into_raw(slot).cast(),
            Callbacks {
                func: None,
                step: Some(aggregate_step),
                finalize: Some(aggregate_final),
                destroy: destroy_slot::<AggregateSlot>,
            },
        )
    }

    /// Hand `slot` to the engine, which owns it from here on and releases
    /// it through `destroy` (also when registration fails).
    fn install(
        &self,
        name: &str,
        n_args: i32,
        flags: FunctionFlags,
        slot: *mut c_void,
        callbacks: Callbacks,
    ) -> Result<()> {
        let checked = self.check().and_then(|db| {
            if !(-1..=127).contains(&n_args) {
                return Err(Error::programming(format!(
                    "Function {name} declares {n_args} arguments; expected -1 to 127."
                )));
            }
            let c_name = CString::new(name)
                .map_err(|_| Error::programming("Function name contains a null byte."))?;
            Ok((db, c_name))
        });
        let (db, c_name) = match checked {
            Ok(ok) => ok,
            Err(e) => {
                // SAFETY: the engine never saw `slot`; release it here
                unsafe { (callbacks.destroy)(slot) };
                return Err(e);
            }
        };

        // SAFETY: db is live; slot matches the callbacks' expected type
        let rc = unsafe {
            ffi::sqlite3_create_function_v2(
                db,
                c_name.as_ptr(),
                n_args,
                flags.text_rep(),
                slot,
                callbacks.func,
                callbacks.step,
                callbacks.finalize,
                Some(callbacks.destroy),
            )
        };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is live
            return Err(unsafe { from_db(db, rc) });
        }
        tracing::debug!(name, n_args, aggregate = callbacks.step.is_some(), "Registered function");
        Ok(())
    }
}

struct Callbacks {
    func: ffi::sqlite3_func_callback,
    step: ffi::sqlite3_func_callback,
    finalize: ffi::sqlite3_final_callback,
    destroy: unsafe extern "C" fn(*mut c_void),
}

/// Run user code inside a span with unwinding stopped. Errors and panics
/// are logged and reported as `None`.
fn guarded<T>(name: &str, stage: &'static str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    let _scope = tracing::debug_span!("user_callback", name, stage).entered();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "User callback failed");
            None
        }
        Err(payload) => {
            tracing::warn!(panic = panic_message(payload.as_ref()), "User callback panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn adapt_result(registry: &SharedRegistry, value: Value) -> Result<Value> {
    Ok(registry_snapshot(registry).adapt(&value)?.into_owned())
}

/// # Safety
/// `argv` must point to `argc` argument values of the running callback.
unsafe fn read_arguments(argc: c_int, argv: *mut *mut ffi::sqlite3_value) -> Vec<Value> {
    if argv.is_null() || argc <= 0 {
        return Vec::new();
    }
    // SAFETY: forwarded from caller
    unsafe {
        std::slice::from_raw_parts(argv, argc as usize)
            .iter()
            .map(|&value| types::read_argument(value))
            .collect()
    }
}

unsafe extern "C" fn call_scalar(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    // SAFETY: user data is the ScalarSlot installed with this callback and
    // stays alive until the engine calls its destructor.
    let slot = unsafe { &*ffi::sqlite3_user_data(ctx).cast::<ScalarSlot>() };
    // SAFETY: engine-provided argument array
    let args = unsafe { read_arguments(argc, argv) };

    let outcome = guarded(&slot.name, "call", || {
        let value = (slot.func)(&args)?;
        adapt_result(&slot.registry, value)
    });
    // SAFETY: ctx is the running callback's context
    unsafe {
        match outcome {
            Some(value) => types::set_result(ctx, &value),
            None => types::set_error(ctx, FUNCTION_FAILED),
        }
    }
}

unsafe extern "C" fn aggregate_step(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    // SAFETY: user data is the AggregateSlot installed with this callback
    let slot = unsafe { &*ffi::sqlite3_user_data(ctx).cast::<AggregateSlot>() };
    // SAFETY: a one-byte zeroed slot whose address identifies this group
    // until the engine calls the finalizer.
    let key = unsafe { ffi::sqlite3_aggregate_context(ctx, 1) };
    if key.is_null() {
        // SAFETY: ctx is the running callback's context
        unsafe { types::set_error(ctx, "out of memory") };
        return;
    }
    let key = key as usize;
    // SAFETY: engine-provided argument array
    let args = unsafe { read_arguments(argc, argv) };

    // The accumulator is taken out while user code runs so a nested query
    // using the same aggregate never waits on this lock.
    let existing = lock_live(slot).remove(&key);
    let stepped = guarded(&slot.name, "step", || {
        let mut accumulator = existing.unwrap_or_else(|| (slot.factory)());
        let result = accumulator.step(&args);
        lock_live(slot).insert(key, accumulator);
        result
    });
    if stepped.is_none() {
        // SAFETY: ctx is the running callback's context
        unsafe { types::set_error(ctx, STEP_FAILED) };
    }
}

unsafe extern "C" fn aggregate_final(ctx: *mut ffi::sqlite3_context) {
    // SAFETY: user data is the AggregateSlot installed with this callback
    let slot = unsafe { &*ffi::sqlite3_user_data(ctx).cast::<AggregateSlot>() };
    // SAFETY: size 0 never allocates; null means step never ran
    let key = unsafe { ffi::sqlite3_aggregate_context(ctx, 0) };
    let accumulator = if key.is_null() {
        None
    } else {
        lock_live(slot).remove(&(key as usize))
    };

    let Some(mut accumulator) = accumulator else {
        // No row reached the aggregate.
        // SAFETY: ctx is the running callback's context
        unsafe { ffi::sqlite3_result_null(ctx) };
        return;
    };

    let outcome = guarded(&slot.name, "finalize", || {
        let value = accumulator.finalize()?;
        adapt_result(&slot.registry, value)
    });
    drop(accumulator);
    // SAFETY: ctx is the running callback's context
    unsafe {
        match outcome {
            Some(value) => types::set_result(ctx, &value),
            None => types::set_error(ctx, FINALIZE_FAILED),
        }
    }
}

fn lock_live(slot: &AggregateSlot) -> MutexGuard<'_, HashMap<usize, Box<dyn Aggregate>>> {
    slot.live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// `ptr` must come from `Box::<T>::into_raw` and not be used afterwards.
unsafe extern "C" fn destroy_slot<T>(ptr: *mut c_void) {
    if !ptr.is_null() {
        // SAFETY: forwarded from caller
        drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
    }
}
