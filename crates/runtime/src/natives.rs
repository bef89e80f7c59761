//! Native function registry
//!
//! Natives are registered explicitly by name. A [`NativeRegistry`] belongs to
//! the engine that built it; nothing here is process-wide.
//!
//! # Standard natives
//!
//! | Name | Parameters | Result |
//! |------|------------|--------|
//! | `call` | handler, array | handler invoked with the array elements |
//! | `apply` | p1 .. pn, handler | handler invoked with p1 .. pn |
//! | `eval` | p1 .. pn | forces every parameter in order, returns pn |
//! | `repeat` | handler | number of calls until the handler yields false |
//! | `params` | any | the assured parameters, unforced |
//! | `params.copy` | any | the assured parameters, forced |
//! | `if` | condition, then, else | the chosen branch; the other is never forced |
//! | `variable.get` | variable | current content |
//! | `variable.set` | variable, value | `value`, after storing it |
//! | `integer.add` | a, b | a + b (wrapping) |
//! | `integer.less` | a, b | a < b |
//! | `string.concat` | a, b | a followed by b |
//! | `string.length` | s | number of code points |
//! | `binary.concat` | a, b | a followed by b |
//! | `binary.length` | b | number of bytes |
//! | `array.concat` | a, b | a followed by b |
//! | `array.length` | a | number of elements |
//! | `array.section` | a, offset, length | view over the range |

use fem_core::{
    BoxError, Context, Data, FemError, FemResult, Frame, Function, Sequence, TypeTag, Value,
    Variable,
};
use std::collections::BTreeMap;
use std::fmt;

/// Plain native entry point, as stored in static tables.
pub type NativeFn = fn(&Frame) -> Result<Option<Value>, BoxError>;

const STANDARD: &[(&str, NativeFn)] = &[
    ("call", call),
    ("apply", apply),
    ("eval", eval),
    ("repeat", repeat),
    ("params", params),
    ("params.copy", params_copy),
    ("if", if_then_else),
    ("variable.get", variable_get),
    ("variable.set", variable_set),
    ("integer.add", integer_add),
    ("integer.less", integer_less),
    ("string.concat", string_concat),
    ("string.length", string_length),
    ("binary.concat", binary_concat),
    ("binary.length", binary_length),
    ("array.concat", array_concat),
    ("array.length", array_length),
    ("array.section", array_section),
];

/// Name to native function table
#[derive(Clone, Default)]
pub struct NativeRegistry {
    functions: BTreeMap<String, Function>,
}

impl NativeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard natives.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (name, delegate) in STANDARD {
            registry.register(name, *delegate);
        }
        registry
    }

    /// Registers `delegate` under `name`, replacing any earlier entry, and
    /// returns the resulting function.
    pub fn register<F>(&mut self, name: &str, delegate: F) -> Function
    where
        F: Fn(&Frame) -> Result<Option<Value>, BoxError> + Send + Sync + 'static,
    {
        let function = Function::native(name, delegate);
        if self
            .functions
            .insert(name.to_string(), function.clone())
            .is_some()
        {
            tracing::debug!(native = name, "replaced native function");
        }
        function
    }

    /// The native registered under `name`.
    pub fn get(&self, name: &str) -> FemResult<Function> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| FemError::unresolved(format!("native '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

fn expect_params(frame: &Frame, name: &str, count: usize) -> FemResult<()> {
    if frame.size() != count {
        return Err(FemError::Bounds(format!(
            "{} expects {} parameters, got {}",
            name,
            count,
            frame.size()
        )));
    }
    Ok(())
}

fn usize_of(context: &Context, value: &Value) -> FemResult<usize> {
    let number = context.integer_of(value)?;
    usize::try_from(number)
        .map_err(|_| FemError::Bounds(format!("{} is not a valid index", number)))
}

fn call(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "call", 2)?;
    let context = frame.context();
    let method = context.function_of(&frame.get(0)?)?;
    let args = context.array_of(&frame.get(1)?)?;
    Ok(Some(method.invoke(&frame.with_params(args))?))
}

fn apply(frame: &Frame) -> Result<Option<Value>, BoxError> {
    let Some(index) = frame.size().checked_sub(1) else {
        return Err(FemError::Bounds("apply expects a handler parameter".to_string()).into());
    };
    let method = frame.context().function_of(&frame.get(index)?)?;
    let args = frame.params().section(0, index)?;
    Ok(Some(method.invoke(&frame.with_params(args))?))
}

fn eval(frame: &Frame) -> Result<Option<Value>, BoxError> {
    let mut last = Value::Void;
    for index in 0..frame.size() {
        last = frame.get(index)?.result(true)?;
    }
    Ok(Some(last))
}

fn repeat(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "repeat", 1)?;
    let context = frame.context();
    let method = context.function_of(&frame.get(0)?)?;
    let mut count: i64 = 0;
    while context.boolean_of(&method.invoke(&frame.without_params())?)? {
        count += 1;
    }
    Ok(Some(Value::integer(count)))
}

fn params(frame: &Frame) -> Result<Option<Value>, BoxError> {
    Ok(Some(Value::Array(frame.params())))
}

fn params_copy(frame: &Frame) -> Result<Option<Value>, BoxError> {
    Ok(Some(Value::Array(frame.params().result(true)?.compact())))
}

fn if_then_else(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "if", 3)?;
    let branch = if frame.context().boolean_of(&frame.get(0)?)? {
        1
    } else {
        2
    };
    Ok(Some(frame.get(branch)?))
}

fn variable_get(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "variable.get", 1)?;
    let variable = variable_of(frame.context(), &frame.get(0)?)?;
    Ok(Some(variable.get().result(false)?))
}

fn variable_set(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "variable.set", 2)?;
    let variable = variable_of(frame.context(), &frame.get(0)?)?;
    let value = frame.get(1)?.result(true)?;
    variable.set(value.clone());
    Ok(Some(value))
}

fn variable_of(context: &Context, value: &Value) -> FemResult<Variable> {
    match context.data_of(value, TypeTag::VARIABLE)? {
        Data::Variable(variable) => Ok(variable),
        other => Err(FemError::Conversion(format!(
            "expected a variable, got {:?}",
            other
        ))),
    }
}

fn integer_add(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "integer.add", 2)?;
    let context = frame.context();
    let a = context.integer_of(&frame.get(0)?)?;
    let b = context.integer_of(&frame.get(1)?)?;
    Ok(Some(Value::integer(a.wrapping_add(b))))
}

fn integer_less(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "integer.less", 2)?;
    let context = frame.context();
    let a = context.integer_of(&frame.get(0)?)?;
    let b = context.integer_of(&frame.get(1)?)?;
    Ok(Some(Value::boolean(a < b)))
}

fn string_concat(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "string.concat", 2)?;
    let context = frame.context();
    let a = context.string_of(&frame.get(0)?)?;
    let b = context.string_of(&frame.get(1)?)?;
    Ok(Some(Value::String(a.concat(&b))))
}

fn string_length(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "string.length", 1)?;
    let s = frame.context().string_of(&frame.get(0)?)?;
    Ok(Some(Value::integer(s.length() as i64)))
}

fn binary_concat(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "binary.concat", 2)?;
    let context = frame.context();
    let a = context.binary_of(&frame.get(0)?)?;
    let b = context.binary_of(&frame.get(1)?)?;
    Ok(Some(Value::Binary(a.concat(&b))))
}

fn binary_length(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "binary.length", 1)?;
    let b = frame.context().binary_of(&frame.get(0)?)?;
    Ok(Some(Value::integer(b.length() as i64)))
}

fn array_concat(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "array.concat", 2)?;
    let context = frame.context();
    let a = context.array_of(&frame.get(0)?)?;
    let b = context.array_of(&frame.get(1)?)?;
    Ok(Some(Value::Array(a.concat(&b))))
}

fn array_length(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "array.length", 1)?;
    let a = frame.context().array_of(&frame.get(0)?)?;
    Ok(Some(Value::integer(a.length() as i64)))
}

fn array_section(frame: &Frame) -> Result<Option<Value>, BoxError> {
    expect_params(frame, "array.section", 3)?;
    let context = frame.context();
    let a = context.array_of(&frame.get(0)?)?;
    let offset = usize_of(context, &frame.get(1)?)?;
    let length = usize_of(context, &frame.get(2)?)?;
    Ok(Some(Value::Array(a.section(offset, length)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fem_core::FemArray;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn invoke(registry: &NativeRegistry, name: &str, args: Vec<Value>) -> FemResult<Value> {
        let params: Vec<Function> = args.into_iter().map(Function::value).collect();
        Function::compose(registry.get(name)?, params).invoke(&Frame::empty())
    }

    fn ints(values: &[i64]) -> FemArray {
        values.iter().map(|&v| Value::integer(v)).collect()
    }

    #[test]
    fn test_standard_table_is_complete() {
        let registry = NativeRegistry::standard();
        assert_eq!(registry.len(), STANDARD.len());
        for (name, _) in STANDARD {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(matches!(
            registry.get("no.such"),
            Err(FemError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_call_and_apply() {
        let registry = NativeRegistry::standard();
        let add = Value::handler(registry.get("integer.add").unwrap());

        let result = invoke(&registry, "call", vec![add.clone(), Value::Array(ints(&[2, 3]))]);
        assert_eq!(result.unwrap(), Value::integer(5));

        let result = invoke(&registry, "apply", vec![Value::integer(4), Value::integer(6), add]);
        assert_eq!(result.unwrap(), Value::integer(10));

        assert!(matches!(
            invoke(&registry, "apply", vec![]),
            Err(FemError::Bounds(_))
        ));
    }

    #[test]
    fn test_if_forces_only_chosen_branch() {
        let registry = NativeRegistry::standard();
        let forced = Arc::new(AtomicUsize::new(0));
        let counter = forced.clone();
        let expensive = Function::native("expensive", move |_frame| -> Result<Option<Value>, BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Value::from("expensive")))
        });
        let f = Function::compose(
            registry.get("if").unwrap(),
            vec![
                Function::param(0),
                Function::value(Value::from("cheap")),
                expensive,
            ],
        );

        let yes = Frame::empty().new_frame_values(FemArray::from_values(vec![Value::boolean(true)]));
        assert_eq!(f.invoke(&yes).unwrap(), Value::from("cheap"));
        assert_eq!(forced.load(Ordering::SeqCst), 0);

        let no = Frame::empty().new_frame_values(FemArray::from_values(vec![Value::boolean(false)]));
        assert_eq!(f.invoke(&no).unwrap(), Value::from("expensive"));
        assert_eq!(forced.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_params_views() {
        let registry = NativeRegistry::standard();
        let f = Function::compose(
            registry.get("params").unwrap(),
            vec![Function::value(Value::integer(1)), Function::param(0)],
        );
        let frame = Frame::empty().new_frame_values(ints(&[9]));
        let view = f.invoke(&frame).unwrap();
        match &view {
            Value::Array(array) => assert!(!array.get(1).unwrap().is_ready()),
            other => panic!("expected array, got {:?}", other),
        }
        assert_eq!(view.result(true).unwrap(), Value::Array(ints(&[1, 9])));

        let copy = invoke(&registry, "params.copy", vec![Value::integer(1), Value::integer(2)]);
        assert_eq!(copy.unwrap(), Value::Array(ints(&[1, 2])));
    }

    #[test]
    fn test_repeat_and_variables() {
        let registry = NativeRegistry::standard();
        let variable = Variable::new(Value::integer(0));
        let step = {
            let variable = variable.clone();
            Function::native("step", move |_frame| -> Result<Option<Value>, BoxError> {
                let next = variable.update(|value| match value {
                    Value::Integer(i) => Value::integer(i + 1),
                    other => other.clone(),
                });
                Ok(Some(Value::boolean(matches!(next, Value::Integer(i) if i < 3))))
            })
        };
        let count = invoke(&registry, "repeat", vec![Value::handler(step)]).unwrap();
        assert_eq!(count, Value::integer(2));

        let slot = Value::Variable(variable.clone());
        let read = invoke(&registry, "variable.get", vec![slot.clone()]).unwrap();
        assert_eq!(read, Value::integer(3));
        let written = invoke(&registry, "variable.set", vec![slot, Value::from("x")]).unwrap();
        assert_eq!(written, Value::from("x"));
        assert_eq!(variable.get(), Value::from("x"));
    }

    #[test]
    fn test_integer_string_and_array_natives() {
        let registry = NativeRegistry::standard();
        assert_eq!(
            invoke(&registry, "integer.less", vec![Value::integer(1), Value::integer(2)]).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(
            invoke(&registry, "string.concat", vec![Value::from("ab"), Value::from("ç")]).unwrap(),
            Value::from("abç")
        );
        assert_eq!(
            invoke(&registry, "string.length", vec![Value::from("abç")]).unwrap(),
            Value::integer(3)
        );
        let joined = invoke(
            &registry,
            "binary.concat",
            vec![Value::binary(vec![1u8, 2]), Value::binary(vec![3u8])],
        )
        .unwrap();
        assert_eq!(joined, Value::binary(vec![1u8, 2, 3]));
        assert_eq!(
            invoke(&registry, "binary.length", vec![joined]).unwrap(),
            Value::integer(3)
        );
        assert!(invoke(&registry, "binary.length", vec![Value::from("ab")]).is_err());
        let joined = invoke(
            &registry,
            "array.concat",
            vec![Value::Array(ints(&[1])), Value::Array(ints(&[2, 3]))],
        )
        .unwrap();
        assert_eq!(joined, Value::Array(ints(&[1, 2, 3])));
        assert_eq!(
            invoke(&registry, "array.length", vec![joined.clone()]).unwrap(),
            Value::integer(3)
        );
        assert_eq!(
            invoke(
                &registry,
                "array.section",
                vec![joined.clone(), Value::integer(1), Value::integer(2)]
            )
            .unwrap(),
            Value::Array(ints(&[2, 3]))
        );
        assert!(matches!(
            invoke(&registry, "array.section", vec![joined, Value::integer(-1), Value::integer(1)]),
            Err(FemError::Bounds(_))
        ));
    }

    #[test]
    fn test_arity_and_type_errors() {
        let registry = NativeRegistry::standard();
        assert!(matches!(
            invoke(&registry, "integer.add", vec![Value::integer(1)]),
            Err(FemError::Bounds(_))
        ));
        assert!(matches!(
            invoke(&registry, "integer.add", vec![Value::integer(1), Value::from("2")]),
            Err(FemError::Conversion(_))
        ));
    }

    #[test]
    fn test_register_custom_native() {
        let mut registry = NativeRegistry::new();
        assert!(registry.is_empty());
        registry.register("answer", |_frame| -> Result<Option<Value>, BoxError> {
            Ok(Some(Value::integer(42)))
        });
        assert_eq!(invoke(&registry, "answer", vec![]).unwrap(), Value::integer(42));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["answer"]);
    }
}
