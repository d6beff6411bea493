// luaj-parser - Property-based tests for constant folding
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property-based tests for the compiler's constant folding.
//!
//! Tests the following properties:
//! - Any closed arithmetic expression over numeric literals compiles to a
//!   single constant load; no arithmetic opcode survives
//! - Any closed equality over numeric literals compiles to a single KPRIM
//! - The folded value matches evaluating the expression in Rust

use luaj_core::{Heap, Op, TAG_FALSE, TAG_TRUE};
use luaj_parser::{parse, Reader};
use proptest::prelude::*;

/// A closed arithmetic expression together with its expected value.
#[derive(Debug, Clone)]
struct ClosedExpr {
    src: String,
    val: f64,
}

fn arb_closed_expr() -> impl Strategy<Value = ClosedExpr> {
    let leaf = (0u32..100).prop_map(|n| ClosedExpr {
        src: n.to_string(),
        val: n as f64,
    });
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone(), 0usize..5).prop_map(|(a, b, op)| {
                let (sym, val) = match op {
                    0 => ("+", a.val + b.val),
                    1 => ("-", a.val - b.val),
                    2 => ("*", a.val * b.val),
                    3 => ("/", a.val / b.val),
                    _ => ("%", a.val - (a.val / b.val).floor() * b.val),
                };
                ClosedExpr {
                    src: format!("({} {} {})", a.src, sym, b.src),
                    val,
                }
            }),
            inner.clone().prop_map(|a| ClosedExpr {
                src: format!("(-{})", a.src),
                val: -a.val,
            }),
        ]
    })
}

fn compile_ops(src: &str) -> Vec<Op> {
    let mut heap = Heap::new();
    let v = parse(&mut heap, Reader::from_str(src, "prop")).expect("compile error");
    let proto = unsafe { v.as_proto() };
    proto.ins.iter().map(|i| i.op()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn closed_arithmetic_folds_to_one_load(e in arb_closed_expr()) {
        let src = format!("local r = {}", e.src);
        let mut heap = Heap::new();
        let v = parse(&mut heap, Reader::from_str(&src, "prop")).expect("compile error");
        let proto = unsafe { v.as_proto() };
        let ops: Vec<Op> = proto.ins.iter().map(|i| i.op()).collect();
        prop_assert_eq!(ops.len(), 2, "{} did not fold: {:?}", src, ops);
        prop_assert!(matches!(ops[0], Op::KInt | Op::KNum), "{} -> {:?}", src, ops);
        prop_assert_eq!(ops[1], Op::Ret0);
        // The folded constant matches host evaluation, bit for bit.
        let folded = match ops[0] {
            Op::KInt => proto.ins[0].d() as i16 as f64,
            _ => proto.k[proto.ins[0].d() as usize].as_num(),
        };
        prop_assert_eq!(folded.to_bits(), e.val.to_bits());
    }

    #[test]
    fn closed_equality_folds_to_kprim(a in 0u32..50, b in 0u32..50, neq in any::<bool>()) {
        let op = if neq { "~=" } else { "==" };
        let src = format!("local r = {} {} {}", a, op, b);
        let ops = compile_ops(&src);
        prop_assert_eq!(&ops, &vec![Op::KPrim, Op::Ret0], "{} did not fold", src);

        let mut heap = Heap::new();
        let v = parse(&mut heap, Reader::from_str(&src, "prop")).unwrap();
        let proto = unsafe { v.as_proto() };
        let expect = if (a == b) != neq { TAG_TRUE } else { TAG_FALSE };
        prop_assert_eq!(proto.ins[0].d(), expect);
    }

    #[test]
    fn no_arithmetic_opcode_survives_folding(e in arb_closed_expr()) {
        let src = format!("local r = {}", e.src);
        let ops = compile_ops(&src);
        for op in ops {
            prop_assert!(
                !matches!(
                    op,
                    Op::AddVV | Op::AddVN | Op::SubVV | Op::SubVN | Op::SubNV
                        | Op::MulVV | Op::MulVN | Op::DivVV | Op::DivVN | Op::DivNV
                        | Op::ModVV | Op::ModVN | Op::ModNV | Op::Pow | Op::Neg
                ),
                "arithmetic leaked out of {}",
                src
            );
        }
    }
}
