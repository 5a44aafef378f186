use super::*;
use crate::runtime::error::RuntimeError;
use crate::runtime::memory::{DEFAULT_BLOCK_SIZE, MemoryKind, TOTAL_MEMORY};
use pretty_assertions::assert_eq;

#[test]
fn flame_memory_round_trip() {
    let outcome = run(r#"
dynamic = true
fmem.create("box", 64)
fmem.write("box", "greeting", "hi" + "!")
str.got = fmem.read("box", "greeting")
video++ got
fmem.destroy("box")
"#);
    assert!(outcome.result.is_ok());
    assert!(outcome.interpreter.is_dynamic());
    assert_eq!(outcome.output, "hi!");
    assert!(!outcome.interpreter.store.contains("box"));
}

#[test]
fn flame_memory_needs_dynamic_mode() {
    let outcome = run("fmem.create(\"box\", 64)\n");
    assert!(matches!(
        outcome.result,
        Err(RuntimeError::DynamicModeRequired { ref command }) if command == "fmem.create"
    ));
}

#[test]
fn missing_keys_read_as_zero_inside_expressions() {
    let outcome = run(r#"
dynamic = true
fmem.create(box, 8)
int.n = fmem.read(box, nothing)
video++ n
"#);
    assert_eq!(outcome.output, "0");
    assert_eq!(
        outcome.errors(),
        vec!["Key `nothing` not found in FlameMemory `box`".to_string()]
    );
}

#[test]
fn memory_ledger_commands() {
    let outcome = run(r#"
int.size = 512
mem("scratch", auto, 1)
virmem("swap", size, 2)
mem("sized", 64, 3)
frmem(3, 0)
"#);
    assert!(outcome.result.is_ok());
    let ledger = &outcome.interpreter.ledger;
    assert_eq!(ledger.len(), 2);
    let scratch = ledger.get(1).expect("block 1");
    assert_eq!(scratch.size, DEFAULT_BLOCK_SIZE);
    assert_eq!(scratch.kind, MemoryKind::Regular);
    let swap = ledger.get(2).expect("block 2");
    assert_eq!((swap.size, swap.kind), (512, MemoryKind::Virtual));
    assert!(ledger.get(3).is_none());
    assert_eq!(
        outcome.interpreter.global("ALLMEM").map(|v| v.as_int()),
        Some(TOTAL_MEMORY as i64)
    );
}

#[test]
fn duplicate_memory_ids_fail() {
    let outcome = run("mem(\"a\", 16, 1)\nmem(\"b\", 16, 1)\n");
    assert!(matches!(outcome.result, Err(RuntimeError::Memory { .. })));
    assert_eq!(outcome.interpreter.ledger.len(), 1);
}

#[test]
fn bad_memory_arguments() {
    let outcome = run("mem(\"a\", lots, 1)\n");
    assert!(matches!(
        outcome.result,
        Err(RuntimeError::InvalidMemoryArguments { ref command, .. }) if command == "mem"
    ));
}

#[test]
fn lists_grow_through_append() {
    let outcome = run(r#"
ls.items = 1
items.append(3)
items.append("x")
video++ items
"#);
    assert_eq!(outcome.output, "[3, x]");
    let items = outcome.interpreter.global("items").expect("items");
    assert_eq!(items.items().len(), 2);
}

#[test]
fn append_to_a_scalar_is_an_error() {
    let outcome = run("int.n = 1\nn.append(2)\n");
    assert!(matches!(outcome.result, Err(RuntimeError::Syntax { .. })));
}
