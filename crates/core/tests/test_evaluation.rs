//! End-to-end evaluation tests
//!
//! These tests drive the public API the way an embedding compiler would:
//! build function trees, bind them into frames and force the results.

use fem_core::{
    BoxError, Context, FemArray, FemError, FemString, Frame, Function, Future, ProxyTable,
    Sequence, TypeTag, Value, Variable,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn ints(values: &[i64]) -> FemArray {
    values.iter().map(|&v| Value::integer(v)).collect()
}

fn add() -> Function {
    Function::native("add", |frame| -> Result<Option<Value>, BoxError> {
        let context = frame.context();
        let a = context.integer_of(&frame.get(0)?)?;
        let b = context.integer_of(&frame.get(1)?)?;
        Ok(Some(Value::integer(a + b)))
    })
}

fn counting(counter: Arc<AtomicUsize>, value: i64) -> Function {
    Function::native("count", move |_frame| -> Result<Option<Value>, BoxError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Value::integer(value)))
    })
}

#[test]
fn test_repeated_invocation_is_deterministic() {
    let f = Function::compose(
        add(),
        vec![
            Function::compose(add(), vec![Function::param(0), Function::param(1)]),
            Function::value(Value::integer(100)),
        ],
    );
    let frame = Frame::empty().new_frame_values(ints(&[1, 2]));
    let results: Vec<Value> = (0..10).map(|_| f.invoke(&frame).unwrap()).collect();
    assert!(results.iter().all(|v| *v == Value::integer(103)));
}

#[test]
fn test_concurrent_forcing_evaluates_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let slow = Function::native("slow", {
        let counter = counter.clone();
        move |_frame| -> Result<Option<Value>, BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(Some(Value::from("done")))
        }
    });
    let future = Future::new(Frame::empty(), slow);
    let barrier = Barrier::new(6);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    future.result(false).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Value::from("done"));
        }
    });
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sequence_concat_section_round_trip() {
    let a = FemString::from("héllo");
    let b = FemString::from(" wörld 🌍");
    let joined = a.concat(&b);
    assert!(joined.section(0, a.length()).unwrap().equals(&a));
    assert!(joined.section(a.length(), b.length()).unwrap().equals(&b));

    let x = ints(&[1, 2, 3]);
    let y = ints(&[4, 5]);
    let joined = x.concat(&y);
    assert!(joined.section(0, 3).unwrap().equals(&x).unwrap());
    assert!(joined.section(3, 2).unwrap().equals(&y).unwrap());
}

#[test]
fn test_reverse_involution_and_hashing() {
    let s = FemString::from("abc").concat(&FemString::from("déf"));
    let twice = s.reverse().reverse();
    assert!(twice.equals(&s));
    assert_eq!(twice.hash_code(), s.hash_code());

    // Equal content with different rope shapes hashes the same.
    let flat = FemString::from("abcdéf");
    assert!(flat.equals(&s));
    assert_eq!(flat.hash_code(), s.hash_code());
    assert_eq!(flat.compact().hash_code(), s.compact().hash_code());

    let a = ints(&[1, 2]).concat(&ints(&[3]));
    let b = ints(&[1, 2, 3]);
    assert!(a.reverse().reverse().equals(&b).unwrap());
    assert_eq!(a.hash_code().unwrap(), b.hash_code().unwrap());
}

#[test]
fn test_frame_parent_delegation() {
    let root = Frame::empty().new_frame_values(ints(&[7, 8]));
    let child = root.new_frame_values(ints(&[1, 2, 3]));
    assert_eq!(child.get(3).unwrap(), root.get(0).unwrap());
    assert_eq!(child.get(4).unwrap(), Value::integer(8));
    assert!(matches!(child.get(5), Err(FemError::Bounds(_))));
    assert_eq!(child.params().length(), 3);
}

#[test]
fn test_lazy_parameter_is_memoized() {
    let counter = Arc::new(AtomicUsize::new(0));
    let frame = Frame::empty().new_frame_lazy(&[counting(counter.clone(), 5)]);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    assert_eq!(frame.get(0).unwrap(), Value::integer(5));
    assert_eq!(frame.get(0).unwrap(), Value::integer(5));
    let params = frame.params().result(true).unwrap();
    assert_eq!(params, ints(&[5]));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_closure_reads_bound_scope() {
    let outer = Frame::empty().new_frame_values(ints(&[10]));
    let g = Function::param(0);

    // The closure body skips its own (empty) parameter list to reach O.
    let closure = Function::closure(Function::param(0));
    let handler = closure.invoke(&outer.new_frame()).unwrap();
    let bound = Context::empty().function_of(&handler).unwrap();
    let empty_call = Frame::empty().new_frame();
    assert_eq!(bound.invoke(&empty_call).unwrap(), Value::integer(10));

    // With arguments, the outer binding moves past them.
    let reach_outer = Function::closure(Function::param(1));
    let handler = reach_outer.invoke(&outer.new_frame()).unwrap();
    let bound = Context::empty().function_of(&handler).unwrap();
    let call = Frame::empty().new_frame_values(ints(&[99]));
    assert_eq!(bound.invoke(&call).unwrap(), Value::integer(10));

    assert_eq!(g.invoke(&call).unwrap(), Value::integer(99));
}

#[test]
fn test_compose_and_chain_differ() {
    let target = Function::value(Value::handler(add()));
    let params = vec![Function::value(Value::integer(2)), Function::value(Value::integer(3))];

    let direct = Function::compose(target.clone(), params.clone())
        .invoke(&Frame::empty())
        .unwrap();
    assert_eq!(direct.type_tag().unwrap(), TypeTag::HANDLER);

    let chained = Function::chain(target, params).invoke(&Frame::empty()).unwrap();
    assert_eq!(chained, Value::integer(5));
}

#[test]
fn test_recursive_sum_through_proxy() {
    // sum(n) = n + sum(n - 1), sum(0) = 0
    let table = ProxyTable::new();
    let sum = Function::from(table.proxy("sum"));
    let recurse = sum.clone();
    let body = Function::native("sum", move |frame| -> Result<Option<Value>, BoxError> {
        let n = frame.context().integer_of(&frame.get(0)?)?;
        if n == 0 {
            return Ok(Some(Value::integer(0)));
        }
        let rest = Function::compose(recurse.clone(), vec![Function::value(Value::integer(n - 1))])
            .invoke(frame)?;
        Ok(Some(Value::integer(n + frame.context().integer_of(&rest)?)))
    });
    table.define("sum", body).unwrap();
    table.link().unwrap();

    let call = Function::compose(sum, vec![Function::value(Value::integer(10))]);
    assert_eq!(call.invoke(&Frame::empty()).unwrap(), Value::integer(55));
}

#[test]
fn test_variable_writes_survive_failure() {
    let variable = Variable::new(Value::integer(0));
    let writer = {
        let variable = variable.clone();
        Function::native("write-then-fail", move |_frame| -> Result<Option<Value>, BoxError> {
            variable.set(Value::integer(1));
            Err("late failure".into())
        })
    };
    let err = writer.invoke(&Frame::empty()).unwrap_err();
    assert!(err.host_details().is_some());
    assert_eq!(variable.get(), Value::integer(1));
}

#[test]
fn test_pointer_reads_current_content_through_lazy_binding() {
    let slot = Variable::new(Value::integer(1));
    let read = Function::value(Value::pointer(&slot));
    let eager = Frame::empty().new_frame_values(FemArray::from_values(vec![Value::pointer(&slot)]));
    let lazy = Frame::empty().new_frame_lazy(&[read.clone()]);
    let future = Future::new(Frame::empty(), read);

    assert_eq!(eager.get(0).unwrap(), Value::integer(1));
    assert_eq!(lazy.get(0).unwrap(), Value::integer(1));
    assert_eq!(future.result(false).unwrap(), Value::integer(1));

    slot.set(Value::from("two"));
    assert_eq!(eager.get(0).unwrap(), Value::from("two"));
    assert_eq!(lazy.get(0).unwrap(), Value::from("two"));
    assert_eq!(future.result(true).unwrap(), Value::from("two"));
}

#[test]
fn test_deep_append_ropes_drop_on_a_small_stack() {
    let handle = thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| {
            let letters = [FemString::from("a"), FemString::from("b")];
            let mut text = FemString::from("x");
            let mut values = FemArray::empty();
            for index in 0..20_000 {
                text = text.concat(&letters[index % 2]);
                values = values.concat(&ints(&[index as i64]));
            }
            assert_eq!(text.length(), 20_001);
            assert_eq!(values.length(), 20_000);
            assert_eq!(text.get(20_000).unwrap(), 'b' as u32);
            assert_eq!(values.find(&Value::integer(19_999), 0).unwrap(), Some(19_999));
            assert!(text.to_string().starts_with("xabab"));
            drop(text);
            drop(values);
        })
        .unwrap();
    handle.join().unwrap();
}

#[test]
fn test_search_stops_at_first_match() {
    let counter = Arc::new(AtomicUsize::new(0));
    let failing = Function::native("late", |_frame| -> Result<Option<Value>, BoxError> {
        Err("evaluated past the match".into())
    });
    let frame = Frame::empty().new_frame_lazy(&[
        counting(counter.clone(), 1),
        counting(counter.clone(), 2),
        failing,
    ]);
    let params = frame.params();
    assert_eq!(params.find(&Value::integer(2), 0).unwrap(), Some(1));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(!params.get(2).unwrap().is_ready());

    let text = FemString::from("needle").concat(&FemString::from(" in a long haystack"));
    let mut visited = 0;
    let finished = text
        .export(
            &mut |cp: u32| {
                visited += 1;
                cp != 'e' as u32
            },
            0,
            text.length(),
            true,
        )
        .unwrap();
    assert!(!finished);
    assert_eq!(visited, 2);
    assert_eq!(text.find_string(&FemString::from("in"), 0).unwrap(), Some(7));
}
