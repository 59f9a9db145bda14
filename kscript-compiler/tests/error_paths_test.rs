// kscript-compiler - Error path tests for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Programs that parse but must not compile.

mod common;
use common::*;

// ============================================================================
// Misplaced statements
// ============================================================================

#[test]
fn test_break_outside_loop() {
    let err = compile_err("print 1.\nbreak.");
    assert_eq!(err.kind, ErrorKind::BreakOutsideLoop);
    assert_eq!((err.line, err.column), (2, 1));
}

#[test]
fn test_break_does_not_reach_through_function() {
    let err = compile_err("until false { function f { break. } }");
    assert_eq!(err.kind, ErrorKind::BreakOutsideLoop);
}

#[test]
fn test_break_does_not_reach_through_trigger() {
    let err = compile_err("until false { when x then { break. } }");
    assert_eq!(err.kind, ErrorKind::BreakOutsideLoop);
}

#[test]
fn test_return_outside_function() {
    let err = compile_err("return 1.");
    assert_eq!(err.kind, ErrorKind::ReturnOutsideFunction);

    let err = compile_err("if true { return. }");
    assert_eq!(err.kind, ErrorKind::ReturnOutsideFunction);
}

#[test]
fn test_preserve_outside_trigger() {
    let err = compile_err("preserve.");
    assert_eq!(err.kind, ErrorKind::PreserveOutsideTrigger);

    let err = compile_err("function f { preserve. }");
    assert_eq!(err.kind, ErrorKind::PreserveOutsideTrigger);
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_global_parameter() {
    let err = compile_err("function f { declare global parameter a. }");
    assert_eq!(err.kind, ErrorKind::GlobalParameter);
}

#[test]
fn test_trailing_defaults_are_fine() {
    compile("declare parameter a, b is 1.");
}

#[test]
fn test_mandatory_after_defaulted() {
    let err = compile_err("function f {\n  parameter a is 1, b.\n}");
    assert_eq!(err.kind, ErrorKind::MandatoryAfterDefaulted);
    // Reported at the offending parameter
    assert_eq!((err.line, err.column), (2, 21));
}

// ============================================================================
// Directives
// ============================================================================

#[test]
fn test_lazyglobal_after_statement() {
    let err = compile_err("print 1.\n  @lazyglobal off.");
    assert_eq!(err.kind, ErrorKind::MisplacedLazyGlobal);
    assert_eq!((err.line, err.column), (2, 3));
}

#[test]
fn test_lazyglobal_inside_block() {
    let err = compile_err("{ @lazyglobal off. }");
    assert_eq!(err.kind, ErrorKind::MisplacedLazyGlobal);
}

#[test]
fn test_unknown_directive() {
    let err = compile_err("@foo on.");
    assert_eq!(err.kind, ErrorKind::UnknownDirective("foo".into()));
}

#[test]
fn test_error_line_honors_start_line() {
    let err = Script::new()
        .compile("test.ks", 20, "print 1.\nbreak.", "", &CompilerOptions::new())
        .unwrap_err();
    assert_eq!(err.line(), 21);
}

// ============================================================================
// Expressions and assignment targets
// ============================================================================

#[test]
fn test_invalid_suffix_in_expression() {
    let err = compile_err("print ship:(1).");
    assert!(matches!(err.kind, ErrorKind::InvalidSuffix(_)));
}

#[test]
fn test_call_is_not_assignable() {
    let err = compile_err("set f() to 1.");
    assert!(matches!(err.kind, ErrorKind::InvalidSuffix(ref text) if text == "f()"));
    assert_eq!((err.line, err.column), (1, 5));
}

#[test]
fn test_defined_needs_a_name() {
    let err = compile_err("print defined 1.");
    assert!(matches!(err.kind, ErrorKind::InvalidDefined(_)));
}

// ============================================================================
// Built-in names
// ============================================================================

#[test]
fn test_clobber_builtin_function() {
    let err = compile_err_with("declare local abs to 1.", &CompilerOptions::standard());
    assert_eq!(err.kind, ErrorKind::ClobberBuiltin("abs".into()));
}

#[test]
fn test_clobber_bound_variable() {
    let err = compile_err_with("function ship { return 1. }", &CompilerOptions::standard());
    assert_eq!(err.kind, ErrorKind::ClobberBuiltin("ship".into()));
}

#[test]
fn test_clobber_parameter() {
    let err = compile_err_with(
        "function f { parameter sqrt. }",
        &CompilerOptions::standard(),
    );
    assert_eq!(err.kind, ErrorKind::ClobberBuiltin("sqrt".into()));
}

#[test]
fn test_clobber_allowed() {
    let options = CompilerOptions::standard().allow_clobber(true);
    compile_with("declare local abs to 1.", &options);
}

#[test]
fn test_system_lock_is_not_a_clobber() {
    compile_with("lock throttle to 1.", &CompilerOptions::standard());
}

#[test]
fn test_error_renders_source_line() {
    let src = "print 1.\nbreak.";
    let err = compile_err(src);
    let rendered = err.render(src, Some("test.ks"));
    assert!(rendered.contains("break."));
    assert!(rendered.contains("test.ks"));
}
