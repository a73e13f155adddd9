//! Evaluation stack and marshaling pushes
//!
//! Native code stages arguments here before invoking one of the calling
//! conventions. Every push adds exactly one slot: scalars push directly,
//! dictionaries and arrays push a single freshly built table, native
//! objects push their script proxy.
//!
//! Tables are built completely before they are pushed, so a push that fails
//! halfway leaves the stack exactly as it was.
//!
//! # Example
//!
//! ```rust,no_run
//! use lunabridge::{Bridge, TaggedValue};
//!
//! let bridge = Bridge::create().unwrap();
//! bridge.push_int(7);                                  // ( -- Int )
//! bridge.push_string("hi").unwrap();                   // ( -- Int String )
//! bridge.push_tagged_value(&TaggedValue::Array(vec![1.into(), 2.into()])).unwrap();
//! assert_eq!(bridge.stack_depth(), 3);
//! ```

use crate::bridge::Bridge;
use crate::error::Result;
use lunabridge_core::{ScriptObject, TaggedDict, TaggedValue};
use mlua::{Lua, Value};
use std::rc::Rc;
use tracing::debug;

impl Bridge {
    /// Stack effect: ( -- Int )
    pub fn push_int(&self, value: i64) {
        self.push_value(Value::Integer(value));
    }

    /// Stack effect: ( -- Float )
    pub fn push_float(&self, value: f64) {
        self.push_value(Value::Number(value));
    }

    /// Stack effect: ( -- Bool )
    pub fn push_boolean(&self, value: bool) {
        self.push_value(Value::Boolean(value));
    }

    /// Stack effect: ( -- String )
    pub fn push_string(&self, value: &str) -> Result<()> {
        self.push_bytes(value.as_bytes())
    }

    /// Push a byte buffer as a string, embedded NULs included
    ///
    /// Stack effect: ( -- String )
    pub fn push_bytes(&self, bytes: &[u8]) -> Result<()> {
        let string = self.engine()?.create_string(bytes)?;
        self.push_value(Value::String(string));
        Ok(())
    }

    /// Stack effect: ( -- nil )
    pub fn push_nil(&self) {
        self.push_value(Value::Nil);
    }

    /// Push an engine value as-is
    pub fn push_value(&self, value: Value) {
        self.inner.stack.borrow_mut().push(value);
    }

    /// Push the script proxy for a native object
    ///
    /// Assigns the object a script handle on first use and reuses it after
    /// that. The proxy does not keep the object alive.
    ///
    /// Stack effect: ( -- Userdata )
    pub fn push_native_object(&self, object: Rc<dyn ScriptObject>, type_name: &str) -> Result<()> {
        let proxy = self.object_proxy(&object, type_name)?;
        self.push_value(proxy);
        Ok(())
    }

    /// Push any tagged value; containers become one table
    ///
    /// Stack effect: ( -- Value )
    pub fn push_tagged_value(&self, value: &TaggedValue) -> Result<()> {
        if !value.is_scalar() {
            debug!(
                "push {}: {} values in {} slot",
                value.type_name(),
                value.total_values(),
                value.logical_size()
            );
        }
        let converted = self.tagged_to_lua(&self.engine()?, value)?;
        self.push_value(converted);
        Ok(())
    }

    /// Push a dictionary as one table with string keys
    ///
    /// Stack effect: ( -- Table )
    pub fn push_tagged_dict(&self, dict: &TaggedDict) -> Result<()> {
        let table = self.dict_to_table(&self.engine()?, dict)?;
        self.push_value(table);
        Ok(())
    }

    /// Push an array as one table indexed from 1
    ///
    /// Stack effect: ( -- Table )
    pub fn push_tagged_array(&self, array: &[TaggedValue]) -> Result<()> {
        let table = self.array_to_table(&self.engine()?, array)?;
        self.push_value(table);
        Ok(())
    }

    fn tagged_to_lua(&self, lua: &Lua, value: &TaggedValue) -> Result<Value> {
        let converted = match value {
            TaggedValue::Integer(n) => Value::Integer(*n),
            TaggedValue::Float(f) => Value::Number(*f),
            TaggedValue::Boolean(b) => Value::Boolean(*b),
            TaggedValue::String(s) => Value::String(lua.create_string(s)?),
            TaggedValue::Dict(dict) => self.dict_to_table(lua, dict)?,
            TaggedValue::Array(items) => self.array_to_table(lua, items)?,
            TaggedValue::Object(object) => {
                self.object_proxy(&object.object, &object.type_name)?
            }
        };
        Ok(converted)
    }

    fn dict_to_table(&self, lua: &Lua, dict: &TaggedDict) -> Result<Value> {
        let table = lua.create_table()?;
        for (key, value) in dict {
            table.raw_set(key.as_str(), self.tagged_to_lua(lua, value)?)?;
        }
        Ok(Value::Table(table))
    }

    fn array_to_table(&self, lua: &Lua, items: &[TaggedValue]) -> Result<Value> {
        let table = lua.create_table()?;
        for (index, value) in items.iter().enumerate() {
            table.raw_set(index + 1, self.tagged_to_lua(lua, value)?)?;
        }
        Ok(Value::Table(table))
    }

    /// Number of values currently on the evaluation stack
    pub fn stack_depth(&self) -> usize {
        self.inner.stack.borrow().len()
    }

    /// Copy of the top value, if any
    pub fn top(&self) -> Option<Value> {
        self.inner.stack.borrow().last().cloned()
    }

    /// Stack effect: ( Value -- )
    pub fn pop(&self) -> Option<Value> {
        self.inner.stack.borrow_mut().pop()
    }

    /// Drop every value on the evaluation stack
    pub fn clean(&self) {
        self.inner.stack.borrow_mut().clear();
    }

    /// Remove up to `count` values from the top of the stack
    pub fn discard(&self, count: usize) {
        let mut stack = self.inner.stack.borrow_mut();
        let keep = stack.len().saturating_sub(count);
        stack.truncate(keep);
    }

    /// Take the top `count` values, bottom first
    ///
    /// Returns fewer values when the stack is shallower than `count`.
    pub(crate) fn take_frame(&self, count: usize) -> Vec<Value> {
        let mut stack = self.inner.stack.borrow_mut();
        let start = stack.len().saturating_sub(count);
        stack.split_off(start)
    }

    /// Move the top value down below the `below` values under it
    pub(crate) fn sink_top(&self, below: usize) {
        let mut stack = self.inner.stack.borrow_mut();
        if below == 0 || stack.len() <= below {
            return;
        }
        if let Some(top) = stack.pop() {
            let at = stack.len() - below;
            stack.insert(at, top);
        }
    }
}
