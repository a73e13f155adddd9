//! Calling conventions
//!
//! Three ways for native code to run script code, all synchronous:
//!
//! 1. [`Bridge::execute_string`]: compile and run source text
//! 2. [`Bridge::execute_global_function`]: call a global by name with no
//!    arguments
//! 3. [`Bridge::execute_function_by_handle`]: call a registered callable
//!    with arguments already pushed on the evaluation stack
//!
//! Every entry into the engine holds a depth guard for exactly the duration
//! of the engine call, so the reentrancy depth is restored on every exit
//! path, including script errors and nested calls from native bindings.
//!
//! Failures never escape as Rust errors: they are logged with a
//! `[LUA ERROR]` prefix and reported as `0`.
//!
//! # Traceback handler
//!
//! When a global function named by `BridgeConfig::traceback_handler`
//! (default `__G__TRACKBACK__`) exists, handle calls run with it as the
//! message handler. The handler sees the error while the failing frame is
//! still live, so it can collect a traceback; the bridge then stays quiet
//! and leaves the reporting to the handler.

use crate::bridge::Bridge;
use crate::error::BridgeError;
use mlua::{Function, Lua, MultiValue, Value};
use tracing::{debug, error};

const CALL_WITH_HANDLER: &str = "lunabridge.call_with_handler";

// Resolves xpcall once, at helper creation, so later global tampering
// cannot change how handler calls are made
const CALL_WITH_HANDLER_SRC: &str = r#"
local xpcall = xpcall
return function(handler, fn, ...)
    return xpcall(fn, handler, ...)
end
"#;

enum CallOutcome {
    Returned(Value),
    /// Failed inside a traceback handler call; the handler reported it
    Handled,
    Failed(mlua::Error),
}

impl Bridge {
    /// Compile and run `code` as a chunk
    ///
    /// A full garbage-collection cycle runs afterwards (unless disabled in
    /// the config) to bound peak memory after top-level script loads.
    /// Returns 1 on success, 0 on a compile or runtime error.
    pub fn execute_string(&self, code: &str) -> i32 {
        let Some(lua) = self.live_engine() else {
            return 0;
        };
        let result = {
            let _guard = self.inner.depth.enter();
            lua.load(code).set_name(code).exec()
        };

        if self.inner.config.collect_after_execute {
            if let Err(e) = lua.gc_collect() {
                error!("[LUA ERROR] garbage collection failed: {}", e);
            }
        }

        match result {
            Ok(()) => 1,
            Err(e) => {
                error!("[LUA ERROR] {}", BridgeError::from(e));
                0
            }
        }
    }

    /// Run a script file resolved through the file utilities
    ///
    /// Same contract as [`Bridge::execute_string`] without the GC cycle.
    pub fn execute_script_file(&self, filename: &str) -> i32 {
        let Some(lua) = self.live_engine() else {
            return 0;
        };
        let path = self.inner.files.full_path_for(filename);
        let source = match self.inner.files.read_file(&path) {
            Ok(source) => source,
            Err(e) => {
                error!("[LUA ERROR] cannot open {}: {}", path.display(), e);
                return 0;
            }
        };

        let result = {
            let _guard = self.inner.depth.enter();
            lua.load(source)
                .set_name(format!("@{}", path.display()))
                .exec()
        };

        match result {
            Ok(()) => 1,
            Err(e) => {
                error!("[LUA ERROR] {}", BridgeError::from(e));
                0
            }
        }
    }

    /// Call the global function `name` with no arguments
    ///
    /// Returns the first result coerced to an integer when it is a number
    /// (or numeric string); any other result, a missing function, or an
    /// error yields 0. The evaluation stack is not touched.
    pub fn execute_global_function(&self, name: &str) -> i64 {
        // Held for the whole call so the state outlives the function
        let Some(_lua) = self.live_engine() else {
            return 0;
        };
        let Some(function) = self.global_function(name) else {
            error!(
                "[LUA ERROR] {}",
                BridgeError::NotCallable(format!("global '{}'", name))
            );
            return 0;
        };

        let result = {
            let _guard = self.inner.depth.enter();
            function.call::<Value>(())
        };

        match result {
            Ok(value) => number_to_integer(&value).unwrap_or(0),
            Err(e) => {
                error!("[LUA ERROR] {}", BridgeError::from(e));
                0
            }
        }
    }

    /// Push the callable registered under `handle`
    ///
    /// Stack effect: ( -- Function ), or nothing when the handle does not
    /// resolve (logged, returns false).
    pub fn push_function_by_handle(&self, handle: i32) -> bool {
        match self.resolve_function(handle) {
            Some(function) => {
                self.push_value(Value::Function(function));
                true
            }
            None => {
                error!("[LUA ERROR] {}", BridgeError::HandleInvalid(handle));
                false
            }
        }
    }

    /// Call the function sitting under `num_args` arguments
    ///
    /// Stack effect: ( Function arg1 .. argN -- )
    ///
    /// The whole frame is consumed whatever happens. Returns the first
    /// result coerced to an integer (numbers truncate, booleans become
    /// 0/1, anything else 0), or 0 on failure.
    pub fn execute_function(&self, num_args: usize) -> i64 {
        let mut frame = self.take_frame(num_args + 1);
        if frame.len() != num_args + 1 {
            error!(
                "[LUA ERROR] stack holds {} values, call needs {}",
                frame.len(),
                num_args + 1
            );
            return 0;
        }

        let function = match frame.remove(0) {
            Value::Function(function) => function,
            other => {
                error!(
                    "[LUA ERROR] value at stack [{}] is not function (got {})",
                    -(num_args as i64 + 1),
                    other.type_name()
                );
                return 0;
            }
        };
        let Some(lua) = self.live_engine() else {
            return 0;
        };
        let args: MultiValue = frame.into_iter().collect();
        let handler = self.global_function(&self.inner.config.traceback_handler);

        let outcome = {
            let _guard = self.inner.depth.enter();
            match &handler {
                Some(handler) => call_with_handler(&lua, handler, function, args),
                None => match function.call::<Value>(args) {
                    Ok(value) => CallOutcome::Returned(value),
                    Err(e) => CallOutcome::Failed(e),
                },
            }
        };

        match outcome {
            CallOutcome::Returned(value) => return_code(&value),
            CallOutcome::Handled => {
                debug!("call failed, reported by traceback handler");
                0
            }
            CallOutcome::Failed(e) => {
                error!("[LUA ERROR] {}", BridgeError::from(e));
                0
            }
        }
    }

    /// Call the callable registered under `handle` with the top `num_args`
    /// stack values as arguments
    ///
    /// Stack effect: ( arg1 .. argN -- )
    ///
    /// When the handle does not resolve the arguments are discarded and 0
    /// is returned.
    pub fn execute_function_by_handle(&self, handle: i32, num_args: usize) -> i64 {
        if !self.push_function_by_handle(handle) {
            self.discard(num_args);
            return 0;
        }
        self.sink_top(num_args);
        self.execute_function(num_args)
    }

    /// Escalate a failed native assertion into the running script
    ///
    /// With `condition` false while a script is on the call stack (depth
    /// > 0), returns an error carrying `message`. The calling binding
    /// propagates it with `?`, which raises it in the script and control
    /// does not return normally. At depth 0, or when the condition holds,
    /// returns `Ok(false)` and nothing is raised.
    ///
    /// ```rust,no_run
    /// use lunabridge::Bridge;
    ///
    /// let bridge = Bridge::create().unwrap();
    /// let lua = bridge.lua().unwrap();
    /// let check = lua.create_function(|lua, n: i64| {
    ///     let bridge = Bridge::current(lua).unwrap();
    ///     bridge.execute_assert(n >= 0, "n must be non-negative")?;
    ///     Ok(n * 2)
    /// }).unwrap();
    /// lua.globals().set("double", check).unwrap();
    /// ```
    pub fn execute_assert(&self, condition: bool, message: &str) -> mlua::Result<bool> {
        if condition {
            return Ok(false);
        }
        if !self.inner.depth.in_script() {
            debug!("assert outside script call ignored: {}", message);
            return Ok(false);
        }

        let message = if message.is_empty() { "unknown" } else { message };
        Err(mlua::Error::runtime(format!(
            "ASSERT FAILED ON LUA EXECUTE: {}",
            message
        )))
    }
}

fn call_with_handler(lua: &Lua, handler: &Function, function: Function, args: MultiValue) -> CallOutcome {
    let helper = match handler_helper(lua) {
        Ok(helper) => helper,
        Err(e) => return CallOutcome::Failed(e),
    };

    let mut call_args = Vec::with_capacity(args.len() + 2);
    call_args.push(Value::Function(handler.clone()));
    call_args.push(Value::Function(function));
    call_args.extend(args);

    match helper.call::<MultiValue>(call_args.into_iter().collect::<MultiValue>()) {
        Ok(results) => {
            let mut results = results.into_iter();
            match results.next() {
                Some(Value::Boolean(true)) => {
                    CallOutcome::Returned(results.next().unwrap_or(Value::Nil))
                }
                _ => CallOutcome::Handled,
            }
        }
        Err(e) => CallOutcome::Failed(e),
    }
}

fn handler_helper(lua: &Lua) -> mlua::Result<Function> {
    if let Value::Function(helper) = lua.named_registry_value::<Value>(CALL_WITH_HANDLER)? {
        return Ok(helper);
    }
    let helper = lua
        .load(CALL_WITH_HANDLER_SRC)
        .set_name("=lunabridge")
        .eval::<Function>()?;
    lua.set_named_registry_value(CALL_WITH_HANDLER, helper.clone())?;
    Ok(helper)
}

/// Integer view of a numeric result (numbers truncate, numeric strings parse)
pub(crate) fn number_to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::Number(f) => Some(*f as i64),
        Value::String(s) => {
            let text = s.to_string_lossy();
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Result code of a handle call: numbers as integers, booleans as 0/1
fn return_code(value: &Value) -> i64 {
    match value {
        Value::Boolean(b) => i64::from(*b),
        other => number_to_integer(other).unwrap_or(0),
    }
}
