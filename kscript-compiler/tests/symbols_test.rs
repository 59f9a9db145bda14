// kscript-compiler - Function, lock and trigger tests for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;
use common::*;

fn compile_in(script: &mut Script, src: &str, context: &str) -> Vec<CodePart> {
    script
        .compile("test.ks", 1, src, context, &CompilerOptions::new())
        .unwrap_or_else(|e| panic!("compile failed for {:?}: {}", src, e))
}

fn main_instructions(parts: &[CodePart]) -> Vec<&Instruction> {
    main_part(parts).main.iter().collect()
}

/// Destination of the first delegate push in the main section.
fn delegate_target(parts: &[CodePart]) -> String {
    main_part(parts)
        .main
        .iter()
        .find(|i| matches!(i.op, OpCode::PushDelegateRelocateLater { .. }))
        .map(|i| i.dest_label.clone())
        .expect("no delegate push")
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_function_part_and_pointer() {
    let parts = compile("function f { return 1. }");
    assert_eq!(parts.len(), 2);

    let func = &parts[0];
    assert!(!func.functions.is_empty());
    let init: Vec<&OpCode> = func.initialization.iter().map(|i| &i.op).collect();
    assert!(matches!(
        init[0],
        OpCode::PushDelegateRelocateLater { with_closure: true }
    ));
    assert_eq!(init[1], &OpCode::StoreGlobal("f`0*".into()));
    assert_eq!(func.initialization[0].dest_label, func.functions[0].label);
}

#[test]
fn test_forward_function_reference() {
    let parts = compile("print f(). function f { return 1. }");
    let main = main_instructions(&parts);
    assert!(position(&main, |op| *op == OpCode::Call("f`0*".into())).is_some());
    assert!(
        parts[0]
            .initialization
            .iter()
            .any(|i| i.op == OpCode::StoreGlobal("f`0*".into()))
    );
}

#[test]
fn test_function_address_of_user_function() {
    let ops = main_ops("function f { return 1. } set g to f@.");
    assert!(ops.contains(&OpCode::Push(Value::identifier("f`0*"))));
}

#[test]
fn test_function_body_returns_zero() {
    let parts = compile("function f { print 1. }");
    let body: Vec<&OpCode> = parts[0].functions.iter().map(|i| &i.op).collect();
    assert!(matches!(body[0], OpCode::PushScope { .. }));
    let n = body.len();
    assert_eq!(body[n - 2], &OpCode::Push(Value::Int(0)));
    assert_eq!(body[n - 1], &OpCode::Return(1));
}

#[test]
fn test_nested_function_is_local() {
    let parts = compile("function outer { function inner { return 1. } return inner(). }");
    // outer and inner each get a part, and neither inner's pointer nor its
    // store leaks to file level
    assert_eq!(parts.len(), 3);
    let stores_inner_globally = all_instructions(&parts).iter().any(|i| {
        matches!(&i.op, OpCode::StoreGlobal(name) if name.starts_with("inner`"))
    });
    assert!(!stores_inner_globally);

    let outer = parts
        .iter()
        .find(|p| {
            p.initialization
                .iter()
                .any(|i| i.op == OpCode::StoreGlobal("outer`0*".into()))
        })
        .expect("outer part");
    assert!(outer.functions.iter().any(|i| {
        matches!(&i.op, OpCode::StoreLocal(name) if name.starts_with("inner`") && name.ends_with('*'))
    }));
}

#[test]
fn test_function_memoized_in_context() {
    let mut script = Script::new();
    let first = compile_in(&mut script, "function f { return 1. }", "repl");
    assert_eq!(first.len(), 2);

    let again = compile_in(&mut script, "function f { return 1. }", "repl");
    assert_eq!(again.len(), 1);
}

#[test]
fn test_function_redefinition_repoints() {
    let mut script = Script::new();
    let first = compile_in(&mut script, "function f { return 1. }", "repl");
    let old_label = first[0].functions[0].label.clone();

    let second = compile_in(&mut script, "function f { return 2. }", "repl");
    assert_eq!(second.len(), 2);
    let part = &second[0];
    let new_label = part.functions[0].label.clone();
    assert_ne!(new_label, old_label);
    assert_eq!(part.initialization[0].dest_label, new_label);
    assert_eq!(
        part.initialization[1].op,
        OpCode::StoreGlobal("f`0*".into())
    );
}

#[test]
fn test_function_reverting_to_earlier_body() {
    let mut script = Script::new();
    let first = compile_in(&mut script, "function f { return 1. }", "repl");
    let one = first[0].functions[0].label.clone();
    compile_in(&mut script, "function f { return 2. }", "repl");

    // Back to the first body: no new code, but the pointer must move
    let third = compile_in(&mut script, "function f { return 1. }", "repl");
    assert_eq!(third.len(), 2);
    let part = &third[0];
    assert!(part.functions.is_empty());
    assert_eq!(part.initialization[0].dest_label, one);
    assert_eq!(
        part.initialization[1].op,
        OpCode::StoreGlobal("f`0*".into())
    );

    let again = compile_in(&mut script, "function f { return 1. }", "repl");
    assert_eq!(again.len(), 1);
}

#[test]
fn test_lambda_ships_with_main() {
    let parts = compile("set f to { return 1. }.");
    assert_eq!(parts.len(), 1);
    let main = main_part(&parts);
    assert!(!main.functions.is_empty());
    assert_eq!(delegate_target(&parts), main.functions[0].label);
}

// ============================================================================
// Locks
// ============================================================================

#[test]
fn test_lock_default_and_body() {
    let parts = compile("lock x to 1 + 2.");
    assert_eq!(parts.len(), 2);

    let lock = &parts[0];
    assert_eq!(lock.functions[0].label, "x`0-default");
    assert!(
        lock.functions
            .iter()
            .any(|i| i.op == OpCode::Push(Value::identifier("x")))
    );
    assert_eq!(lock.initialization[0].dest_label, "x`0-default");
    assert_eq!(
        lock.initialization[1].op,
        OpCode::StoreGlobal("x`0*".into())
    );

    // The lock statement points x at the compiled body
    let target = delegate_target(&parts);
    assert_ne!(target, "x`0-default");
    let entry = find_label(&parts, &target).expect("lock body");
    assert!(matches!(entry.op, OpCode::PushScope { .. }));
}

#[test]
fn test_reading_a_lock_calls_it() {
    let ops = main_ops("lock x to 1. print x.");
    let call = ops
        .iter()
        .position(|op| *op == OpCode::Call("x`0*".into()))
        .expect("lock call");
    assert_eq!(ops[call - 1], OpCode::Push(Value::ArgMarker));
}

#[test]
fn test_lock_memoized_in_context() {
    let mut script = Script::new();
    let first = compile_in(&mut script, "lock x to 1.", "repl");
    let label = delegate_target(&first);

    let again = compile_in(&mut script, "lock x to 1.", "repl");
    assert_eq!(again.len(), 1);
    assert_eq!(delegate_target(&again), label);
}

#[test]
fn test_relocking_adds_one_fragment() {
    let mut script = Script::new();
    compile_in(&mut script, "lock x to 1.", "repl");
    let second = compile_in(&mut script, "lock x to 2.", "repl");
    assert_eq!(second.len(), 2);
    assert!(second[0].initialization.is_empty());
    assert_eq!(second[0].functions[0].label, delegate_target(&second));
}

#[test]
fn test_relocking_sees_token_boundaries() {
    let mut script = Script::new();
    let first = compile_in(&mut script, "lock y to notx.", "repl");
    let second = compile_in(&mut script, "lock y to not x.", "repl");
    assert_eq!(second.len(), 2);

    let target = delegate_target(&second);
    assert_ne!(target, delegate_target(&first));
    assert_eq!(second[0].functions[0].label, target);
    assert!(second[0].functions.iter().any(|i| i.op == OpCode::Not));
}

#[test]
fn test_set_releases_lock() {
    let ops = main_ops("lock x to 1. set x to 2. print x.");
    let store = ops
        .iter()
        .position(|op| *op == OpCode::Store("x".into()))
        .expect("store to x");
    let resets: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| **op == OpCode::StoreGlobal("x`0*".into()))
        .map(|(i, _)| i)
        .collect();
    // The lock statement, then the reset just before the value is stored
    assert_eq!(resets.len(), 2);
    assert!(resets[1] < store);
    assert_eq!(ops[resets[1] + 1], OpCode::Push(Value::Int(2)));

    let parts = compile("lock x to 1. set x to 2.");
    let main = main_instructions(&parts);
    let reset = main
        .iter()
        .rposition(|i| i.op == OpCode::StoreGlobal("x`0*".into()))
        .expect("reset");
    assert_eq!(main[reset - 1].dest_label, "x`0-default");
}

#[test]
fn test_set_suffix_of_lock_keeps_it() {
    let ops = main_ops("lock x to ship. set x:name to 2.");
    let resets = ops
        .iter()
        .filter(|op| **op == OpCode::StoreGlobal("x`0*".into()))
        .count();
    assert_eq!(resets, 1);
}

#[test]
fn test_system_lock() {
    let parts = compile("lock throttle to 1.");
    // lock part, polling trigger, main
    assert_eq!(parts.len(), 3);

    let poll = &parts[1];
    let ops: Vec<&OpCode> = poll.functions.iter().map(|i| &i.op).collect();
    assert_eq!(ops[1], &OpCode::Call("throttle`0*".into()));
    assert_eq!(ops[2], &OpCode::StoreGlobal("throttle".into()));

    let main = main_instructions(&parts);
    assert!(position(&main, |op| *op == OpCode::Call("toggleflybywire()".into())).is_some());
    let add = position(&main, |op| *op == OpCode::AddTrigger { blocking: false })
        .expect("companion registration");
    assert_eq!(main[add - 1].dest_label, poll.functions[0].label);
}

#[test]
fn test_unlock_system_lock() {
    let parts = compile("lock throttle to 1. unlock throttle.");
    let main = main_instructions(&parts);
    let remove = position(&main, |op| *op == OpCode::RemoveTrigger).expect("removal");
    assert_eq!(main[remove - 1].dest_label, parts[1].functions[0].label);

    // Pointer goes back to the default body
    assert!(
        main.iter()
            .any(|i| i.dest_label == "throttle`0-default"
                && matches!(i.op, OpCode::PushDelegateRelocateLater { .. }))
    );
}

#[test]
fn test_unlock_all() {
    let ops = main_ops("lock a to 1. lock b to 2. unlock all.");
    let resets = ops
        .iter()
        .filter(|op| matches!(op, OpCode::StoreGlobal(name) if name.ends_with('*')))
        .count();
    // Two lock statements and two resets
    assert_eq!(resets, 4);
}

#[test]
fn test_unlock_unknown_leaves_a_nop() {
    let parts = compile("print 1.\nunlock nothing.");
    let main = main_instructions(&parts);
    assert!(
        !main
            .iter()
            .any(|i| matches!(i.op, OpCode::StoreGlobal(_) | OpCode::Store(_)))
    );
    assert!(main.iter().any(|i| i.op == OpCode::Nop && i.line == 2));
}

// ============================================================================
// Triggers
// ============================================================================

#[test]
fn test_when_trigger() {
    let parts = compile("when x > 1 then { print 1. }");
    assert_eq!(parts.len(), 2);
    let trigger = &parts[0];
    let main = main_instructions(&parts);
    let add = position(&main, |op| *op == OpCode::AddTrigger { blocking: false })
        .expect("registration");
    assert_eq!(main[add - 1].op, OpCode::PushRelocateLater);
    assert_eq!(main[add - 1].dest_label, trigger.functions[0].label);
}

#[test]
fn test_on_trigger_records_old_value() {
    let parts = compile("on x { print 1. }");
    let main: Vec<&OpCode> = main_part(&parts).main.iter().map(|i| &i.op).collect();
    let store = main
        .iter()
        .position(|op| matches!(op, OpCode::StoreGlobal(name) if name.starts_with("on-") && name.ends_with("-old")))
        .expect("old value store");
    assert_eq!(main[store - 1], &OpCode::Push(Value::identifier("x")));
    assert_eq!(main[store + 1], &OpCode::PushRelocateLater);
}

#[test]
fn test_trigger_keep_flag() {
    let parts = compile("on x { print 1. preserve. }");
    let ops: Vec<&OpCode> = parts[0].functions.iter().map(|i| &i.op).collect();

    let reset = ops
        .iter()
        .position(|op| matches!(op, OpCode::StoreLocal(name) if name.ends_with("-keep")))
        .expect("keep reset");
    assert_eq!(ops[reset - 1], &OpCode::Push(Value::Bool(false)));

    let preserve = ops
        .iter()
        .position(|op| matches!(op, OpCode::Store(name) if name.ends_with("-keep")))
        .expect("preserve");
    assert_eq!(ops[preserve - 1], &OpCode::Push(Value::Bool(true)));
    assert!(preserve > reset);
}

#[test]
fn test_trigger_memoized_in_context() {
    let mut script = Script::new();
    let src = "when x > 1 then { print 1. }";
    let first = compile_in(&mut script, src, "repl");
    let label = first[0].functions[0].label.clone();

    let again = compile_in(&mut script, src, "repl");
    assert_eq!(again.len(), 1);
    let main = main_instructions(&again);
    let add = position(&main, |op| *op == OpCode::AddTrigger { blocking: false })
        .expect("registration");
    assert_eq!(main[add - 1].dest_label, label);
}

#[test]
fn test_wait_until_blocks() {
    let parts = compile("wait until x > 1.");
    assert_eq!(parts.len(), 2);
    let main = main_instructions(&parts);
    let add = position(&main, |op| *op == OpCode::AddTrigger { blocking: true })
        .expect("blocking registration");
    assert_eq!(main[add - 1].dest_label, parts[0].functions[0].label);

    let body: Vec<&OpCode> = parts[0].functions.iter().map(|i| &i.op).collect();
    assert!(body.contains(&&OpCode::BranchIfTrue));
    assert!(body.iter().all(|op| !matches!(op, OpCode::PushScope { .. })));
}

#[test]
fn test_context_tracks_symbols() {
    let mut script = Script::new();
    compile_in(
        &mut script,
        "function f { return 1. } lock l to 2. when x then { print 1. }",
        "repl",
    );
    let ctx = script.context("repl").unwrap();
    assert!(ctx.user_functions.contains("f", 0));
    assert!(ctx.user_functions.contains("l", 0));
    assert_eq!(ctx.triggers.len(), 1);
}
