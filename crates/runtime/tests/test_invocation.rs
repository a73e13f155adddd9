//! Integration tests for the three calling conventions
//!
//! Every test also checks the evaluation stack afterwards: a call consumes
//! exactly its own frame, whether it succeeds or fails.

use lunabridge::mlua::Function;
use lunabridge::{Bridge, BridgeConfig};
use std::fs;
use tempfile::tempdir;

fn handle_for(bridge: &Bridge, source: &str) -> i32 {
    let function: Function = bridge.lua().unwrap().load(source).eval().unwrap();
    bridge.register_function(function).unwrap()
}

#[test]
fn test_execute_string() {
    let bridge = Bridge::create().unwrap();
    assert_eq!(bridge.execute_string("counter = 41"), 1);
    assert_eq!(bridge.execute_string("counter = counter + 1"), 1);
    let counter: i64 = bridge.lua().unwrap().globals().get("counter").unwrap();
    assert_eq!(counter, 42);
}

#[test]
fn test_execute_string_failures_return_zero() {
    let bridge = Bridge::create().unwrap();
    assert_eq!(bridge.execute_string("this is not lua"), 0);
    assert_eq!(bridge.execute_string("error('boom')"), 0);
    assert_eq!(bridge.depth(), 0);

    // The state is still usable afterwards
    assert_eq!(bridge.execute_string("ok = true"), 1);
}

#[test]
fn test_execute_string_with_gc_disabled() {
    let config = BridgeConfig {
        collect_after_execute: false,
        ..BridgeConfig::default()
    };
    let bridge = Bridge::create_with(config).unwrap();
    assert_eq!(bridge.execute_string("local t = {} for i = 1, 100 do t[i] = {} end"), 1);
}

#[test]
fn test_execute_script_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.lua"), "loaded_from_file = 'yes'").unwrap();
    fs::write(dir.path().join("broken.lua"), "error('broken file')").unwrap();

    let bridge = Bridge::create_with(BridgeConfig::default().with_resource_root(dir.path())).unwrap();
    assert_eq!(bridge.execute_script_file("main.lua"), 1);
    let loaded: String = bridge.lua().unwrap().globals().get("loaded_from_file").unwrap();
    assert_eq!(loaded, "yes");

    assert_eq!(bridge.execute_script_file("broken.lua"), 0);
    assert_eq!(bridge.execute_script_file("missing.lua"), 0);
}

#[test]
fn test_execute_global_function() {
    let bridge = Bridge::create().unwrap();
    bridge.execute_string(
        r#"
        function answer() return 42 end
        function fraction() return 7.9 end
        function numeric_text() return "12" end
        function words() return "twelve" end
        function nothing() end
        function fails() error("nope") end
        "#,
    );

    assert_eq!(bridge.execute_global_function("answer"), 42);
    assert_eq!(bridge.execute_global_function("fraction"), 7);
    assert_eq!(bridge.execute_global_function("numeric_text"), 12);
    assert_eq!(bridge.execute_global_function("words"), 0);
    assert_eq!(bridge.execute_global_function("nothing"), 0);
    assert_eq!(bridge.execute_global_function("fails"), 0);
}

#[test]
fn test_global_function_leaves_stack_alone() {
    let bridge = Bridge::create().unwrap();
    bridge.execute_string("not_a_function = 5");
    bridge.push_int(99);

    assert_eq!(bridge.execute_global_function("not_a_function"), 0);
    assert_eq!(bridge.execute_global_function("undefined_name"), 0);
    assert_eq!(bridge.stack_depth(), 1);
}

#[test]
fn test_execute_function_by_handle() {
    let bridge = Bridge::create().unwrap();
    let add = handle_for(&bridge, "return function(a, b) return a + b end");

    bridge.push_int(2);
    bridge.push_int(3);
    assert_eq!(bridge.execute_function_by_handle(add, 2), 5);
    assert_eq!(bridge.stack_depth(), 0);

    // Values below the frame are untouched
    bridge.push_string("below").unwrap();
    bridge.push_int(10);
    bridge.push_int(20);
    assert_eq!(bridge.execute_function_by_handle(add, 2), 30);
    assert_eq!(bridge.stack_depth(), 1);
}

#[test]
fn test_handle_call_argument_order() {
    let bridge = Bridge::create().unwrap();
    let digits = handle_for(&bridge, "return function(a, b, c) return a * 100 + b * 10 + c end");

    bridge.push_int(1);
    bridge.push_int(2);
    bridge.push_int(3);
    assert_eq!(bridge.execute_function_by_handle(digits, 3), 123);
}

#[test]
fn test_boolean_results_coerce() {
    let bridge = Bridge::create().unwrap();
    let is_even = handle_for(&bridge, "return function(n) return n % 2 == 0 end");

    bridge.push_int(4);
    assert_eq!(bridge.execute_function_by_handle(is_even, 1), 1);
    bridge.push_int(5);
    assert_eq!(bridge.execute_function_by_handle(is_even, 1), 0);
}

#[test]
fn test_removed_handle_discards_arguments() {
    let bridge = Bridge::create().unwrap();
    let add = handle_for(&bridge, "return function(a, b) return a + b end");
    assert!(bridge.remove_function_handle(add));
    assert!(!bridge.remove_function_handle(add));

    bridge.push_string("below").unwrap();
    bridge.push_int(1);
    bridge.push_int(2);
    assert_eq!(bridge.execute_function_by_handle(add, 2), 0);
    assert_eq!(bridge.stack_depth(), 1);

    assert_eq!(bridge.execute_function_by_handle(12345, 0), 0);
    assert_eq!(bridge.stack_depth(), 1);
}

#[test]
fn test_handles_from_scripts() {
    let bridge = Bridge::create().unwrap();
    bridge.execute_string("callback_id = bridge.ref_function(function(x) return x * 3 end)");
    let handle: i32 = bridge.lua().unwrap().globals().get("callback_id").unwrap();

    bridge.push_int(5);
    assert_eq!(bridge.execute_function_by_handle(handle, 1), 15);

    bridge.execute_string("bridge.remove_function(callback_id)");
    assert!(bridge.resolve_function(handle).is_none());
}

#[test]
fn test_execute_function_rejects_non_function() {
    let bridge = Bridge::create().unwrap();
    bridge.push_int(1);
    bridge.push_int(2);
    assert_eq!(bridge.execute_function(1), 0);
    assert_eq!(bridge.stack_depth(), 0);
}

#[test]
fn test_error_without_traceback_handler() {
    let bridge = Bridge::create().unwrap();
    let fails = handle_for(&bridge, "return function() error('boom') end");

    bridge.push_int(1);
    assert_eq!(bridge.execute_function_by_handle(fails, 1), 0);
    assert_eq!(bridge.stack_depth(), 0);
    assert_eq!(bridge.depth(), 0);
}

#[test]
fn test_traceback_handler_sees_errors() {
    let bridge = Bridge::create().unwrap();
    bridge.execute_string(
        r#"
        handled = {}
        function __G__TRACKBACK__(msg)
            handled[#handled + 1] = tostring(msg)
            return msg
        end
        "#,
    );
    let fails = handle_for(&bridge, "return function(what) error('boom: ' .. what) end");
    let fine = handle_for(&bridge, "return function() return 8 end");

    bridge.push_string("first").unwrap();
    assert_eq!(bridge.execute_function_by_handle(fails, 1), 0);
    assert_eq!(bridge.execute_function_by_handle(fine, 0), 8);
    assert_eq!(bridge.stack_depth(), 0);

    let handled: Vec<String> = bridge.lua().unwrap().load("return handled").eval().unwrap();
    assert_eq!(handled.len(), 1);
    assert!(handled[0].contains("boom: first"));
}

#[test]
fn test_custom_traceback_handler_name() {
    let config = BridgeConfig {
        traceback_handler: "on_script_error".to_string(),
        ..BridgeConfig::default()
    };
    let bridge = Bridge::create_with(config).unwrap();
    bridge.execute_string("seen = 0 function on_script_error(msg) seen = seen + 1 return msg end");
    let fails = handle_for(&bridge, "return function() error('x') end");

    assert_eq!(bridge.execute_function_by_handle(fails, 0), 0);
    let seen: i64 = bridge.lua().unwrap().globals().get("seen").unwrap();
    assert_eq!(seen, 1);
}

#[test]
fn test_push_function_by_handle() {
    let bridge = Bridge::create().unwrap();
    let double = handle_for(&bridge, "return function(n) return n * 2 end");

    assert!(bridge.push_function_by_handle(double));
    bridge.push_int(21);
    assert_eq!(bridge.execute_function(1), 42);

    assert!(!bridge.push_function_by_handle(-1));
    assert_eq!(bridge.stack_depth(), 0);
}
