//! Array methods for list, tuple and untyped array instances.
//!
//! Mutating methods (`push`, `splice`, `sort`, ...) are reducers: each call
//! dispatches one action and replaces the whole array. Read-only helpers
//! (`map`, `filter`, `find`, ...) run in place, reading elements through
//! [`Instance::get`] with the length taken when the loop starts.

use crate::{
    Data, Instance, MethodDescriptor, MethodResult, ModelError, ModelResult, Seg, Value,
    VirtualDescriptor,
};
use std::cmp::Ordering;

fn items_of(state: &Data) -> ModelResult<Vec<Data>> {
    match state {
        Data::Array(items) => Ok(items.as_ref().clone()),
        other => Err(ModelError::invalid_operation(format!(
            "Array methods need array data, found {}",
            other.type_name()
        ))),
    }
}

fn arg_int(args: &[Value], index: usize) -> Option<i64> {
    match args.get(index) {
        Some(Value::Number(n)) if !n.is_nan() => Some(n.trunc() as i64),
        _ => None,
    }
}

/// Resolve a possibly negative index against `len`, clamped to `0..=len`.
fn relative(index: i64, len: usize) -> usize {
    if index < 0 {
        (len as i64 + index).max(0) as usize
    } else {
        (index as usize).min(len)
    }
}

fn check_arity(inst: &Instance, from: usize, to: usize) -> ModelResult<()> {
    if from != to && inst.tuple_len()?.is_some() {
        return Err(ModelError::validation(format!(
            "Cannot change the length of tuple \"{}\"",
            inst.instance_path()
        )));
    }
    Ok(())
}

fn pack_all(inst: &Instance, first: usize, values: &[Value]) -> ModelResult<Vec<Data>> {
    values
        .iter()
        .enumerate()
        .map(|(offset, value)| inst.pack_prop(&Seg::Index(first + offset), value))
        .collect()
}

/// A detached copy of an element about to leave the array.
fn detached(value: Value) -> ModelResult<Value> {
    match value {
        Value::Instance(inst) => inst.to_object(),
        other => Ok(other),
    }
}

fn push(inst: &Instance, state: &Data, args: &[Value], result: &mut MethodResult) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    check_arity(inst, items.len(), items.len() + args.len())?;
    let packed = pack_all(inst, items.len(), args)?;
    items.extend(packed);
    result.set(items.len());
    Ok(Data::array(items))
}

fn pop(inst: &Instance, state: &Data, _args: &[Value], result: &mut MethodResult) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    if items.is_empty() {
        return Ok(state.clone());
    }
    check_arity(inst, items.len(), items.len() - 1)?;
    result.set(detached(inst.get(items.len() - 1)?)?);
    items.pop();
    Ok(Data::array(items))
}

fn shift(inst: &Instance, state: &Data, _args: &[Value], result: &mut MethodResult) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    if items.is_empty() {
        return Ok(state.clone());
    }
    check_arity(inst, items.len(), items.len() - 1)?;
    result.set(detached(inst.get(0usize)?)?);
    items.remove(0);
    Ok(Data::array(items))
}

fn unshift(
    inst: &Instance,
    state: &Data,
    args: &[Value],
    result: &mut MethodResult,
) -> ModelResult<Data> {
    let items = items_of(state)?;
    check_arity(inst, items.len(), items.len() + args.len())?;
    let mut out = pack_all(inst, 0, args)?;
    out.extend(items);
    result.set(out.len());
    Ok(Data::array(out))
}

fn splice(
    inst: &Instance,
    state: &Data,
    args: &[Value],
    result: &mut MethodResult,
) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    let len = items.len();
    let start = relative(arg_int(args, 0).unwrap_or(0), len);
    let delete = match args.len() {
        0 => 0,
        1 => len - start,
        _ => arg_int(args, 1).unwrap_or(0).clamp(0, (len - start) as i64) as usize,
    };
    let inserted = args.get(2..).unwrap_or_default();
    check_arity(inst, len, len - delete + inserted.len())?;
    let mut removed = Vec::with_capacity(delete);
    for index in start..start + delete {
        removed.push(detached(inst.get(index)?)?);
    }
    let packed = pack_all(inst, start, inserted)?;
    let tail = items.split_off(start + delete);
    items.truncate(start);
    items.extend(packed);
    items.extend(tail);
    result.set(removed);
    Ok(Data::array(items))
}

/// Default ordering: by string form, undefined last.
fn default_order(a: &Data, b: &Data) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Value::from(a).to_string().cmp(&Value::from(b).to_string()),
    }
}

fn sort(_inst: &Instance, state: &Data, args: &[Value], _result: &mut MethodResult) -> ModelResult<Data> {
    let items = items_of(state)?;
    match args.first() {
        None | Some(Value::Undefined) => {
            let mut sorted = items;
            sorted.sort_by(default_order);
            Ok(Data::array(sorted))
        }
        Some(Value::Array(order)) => {
            let mut seen = vec![false; items.len()];
            let mut sorted = Vec::with_capacity(items.len());
            for entry in order {
                let index = entry
                    .as_f64()
                    .filter(|n| n.fract() == 0.0 && *n >= 0.0)
                    .map(|n| n as usize)
                    .filter(|i| *i < items.len() && !seen[*i])
                    .ok_or_else(|| ModelError::validation("Sort order must be a permutation"))?;
                seen[index] = true;
                sorted.push(items[index].clone());
            }
            if sorted.len() != items.len() {
                return Err(ModelError::validation("Sort order must be a permutation"));
            }
            Ok(Data::array(sorted))
        }
        Some(other) => Err(ModelError::validation(format!("{} is not a sort order", other))),
    }
}

fn reverse(_inst: &Instance, state: &Data, _args: &[Value], _result: &mut MethodResult) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    items.reverse();
    Ok(Data::array(items))
}

fn fill(inst: &Instance, state: &Data, args: &[Value], _result: &mut MethodResult) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    let len = items.len();
    let value = args.first().cloned().unwrap_or_default();
    let start = relative(arg_int(args, 1).unwrap_or(0), len);
    let end = relative(arg_int(args, 2).unwrap_or(len as i64), len);
    for index in start..end.max(start) {
        items[index] = inst.pack_prop(&Seg::Index(index), &value)?;
    }
    Ok(Data::array(items))
}

fn copy_within(
    _inst: &Instance,
    state: &Data,
    args: &[Value],
    _result: &mut MethodResult,
) -> ModelResult<Data> {
    let mut items = items_of(state)?;
    let len = items.len();
    let target = relative(arg_int(args, 0).unwrap_or(0), len);
    let start = relative(arg_int(args, 1).unwrap_or(0), len);
    let end = relative(arg_int(args, 2).unwrap_or(len as i64), len);
    let count = end.saturating_sub(start).min(len - target);
    let source: Vec<Data> = items[start..start + count].to_vec();
    items[target..target + count].clone_from_slice(&source);
    Ok(Data::array(items))
}

fn set_length(inst: &Instance, value: Value) -> ModelResult<()> {
    let len = value
        .as_f64()
        .filter(|n| n.fract() == 0.0 && *n >= 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| ModelError::validation(format!("Invalid array length {}", value)))?;
    let mut items = items_of(&inst.state()?)?;
    check_arity(inst, items.len(), len)?;
    if len <= items.len() {
        items.truncate(len);
    } else {
        for index in items.len()..len {
            items.push(inst.default_prop(&Seg::Index(index))?);
        }
    }
    inst.set_state(Data::array(items))
}

/// Methods shared by every array-like type.
pub(crate) fn array_methods() -> Vec<MethodDescriptor> {
    vec![
        MethodDescriptor::reducer("push", push),
        MethodDescriptor::reducer("pop", pop),
        MethodDescriptor::reducer("shift", shift),
        MethodDescriptor::reducer("unshift", unshift),
        MethodDescriptor::reducer("splice", splice),
        MethodDescriptor::reducer("sort", sort),
        MethodDescriptor::reducer("reverse", reverse),
        MethodDescriptor::reducer("fill", fill),
        MethodDescriptor::reducer("copyWithin", copy_within),
        MethodDescriptor::new("join", |inst, args| {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_string(),
            };
            inst.join(&separator).map(Value::String)
        })
        .bare(),
        MethodDescriptor::new("indexOf", |inst, args| {
            let needle = args.first().cloned().unwrap_or_default();
            Ok(inst
                .index_of(&needle)?
                .map_or(Value::Number(-1.0), Value::from))
        })
        .bare(),
        MethodDescriptor::new("includes", |inst, args| {
            let needle = args.first().cloned().unwrap_or_default();
            inst.includes(&needle).map(Value::Bool)
        })
        .bare(),
        MethodDescriptor::new("slice", |inst, args| {
            inst.slice(arg_int(args, 0).unwrap_or(0), arg_int(args, 1))
                .map(Value::Array)
        })
        .bare(),
        MethodDescriptor::new("concat", |inst, args| inst.concat(args).map(Value::Array)).bare(),
    ]
}

/// The `length` virtual property.
pub(crate) fn array_virtuals() -> Vec<(String, VirtualDescriptor)> {
    vec![(
        "length".to_string(),
        VirtualDescriptor::getter(|inst| inst.len().map(Value::from)).with_setter(set_length),
    )]
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

fn as_len(value: Value) -> usize {
    value.as_f64().map_or(0, |n| n as usize)
}

impl Instance {
    /// The element at `index`, or `None` past the current end.
    pub fn item(&self, index: usize) -> ModelResult<Option<Value>> {
        if index >= self.len()? {
            return Ok(None);
        }
        self.get(index).map(Some)
    }

    /// Plain copy of the elements.
    pub fn to_vec(&self) -> ModelResult<Vec<Value>> {
        let mut out = Vec::new();
        self.for_each(|item, _| {
            out.push(item);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn for_each(&self, mut f: impl FnMut(Value, usize) -> ModelResult<()>) -> ModelResult<()> {
        let len = self.len()?;
        for index in 0..len {
            let Some(item) = self.item(index)? else { break };
            f(item, index)?;
        }
        Ok(())
    }

    pub fn map<R>(&self, mut f: impl FnMut(Value, usize) -> ModelResult<R>) -> ModelResult<Vec<R>> {
        let mut out = Vec::new();
        self.for_each(|item, index| {
            out.push(f(item, index)?);
            Ok(())
        })?;
        Ok(out)
    }

    pub fn filter(
        &self,
        mut f: impl FnMut(&Value, usize) -> ModelResult<bool>,
    ) -> ModelResult<Vec<Value>> {
        let mut out = Vec::new();
        self.for_each(|item, index| {
            if f(&item, index)? {
                out.push(item);
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Fold from the left. Without `initial`, the first element seeds the
    /// accumulator and an empty array is an error.
    pub fn reduce(
        &self,
        initial: Option<Value>,
        mut f: impl FnMut(Value, Value, usize) -> ModelResult<Value>,
    ) -> ModelResult<Value> {
        let len = self.len()?;
        let (mut acc, start) = match initial {
            Some(value) => (value, 0),
            None => match self.item(0)? {
                Some(first) => (first, 1),
                None => {
                    return Err(ModelError::validation(
                        "Reduce of empty array with no initial value",
                    ))
                }
            },
        };
        for index in start..len {
            let Some(item) = self.item(index)? else { break };
            acc = f(acc, item, index)?;
        }
        Ok(acc)
    }

    pub fn reduce_right(
        &self,
        initial: Option<Value>,
        mut f: impl FnMut(Value, Value, usize) -> ModelResult<Value>,
    ) -> ModelResult<Value> {
        let len = self.len()?;
        let (mut acc, end) = match initial {
            Some(value) => (value, len),
            None => match len.checked_sub(1) {
                Some(last) => (self.get(last)?, last),
                None => {
                    return Err(ModelError::validation(
                        "Reduce of empty array with no initial value",
                    ))
                }
            },
        };
        for index in (0..end).rev() {
            let Some(item) = self.item(index)? else { continue };
            acc = f(acc, item, index)?;
        }
        Ok(acc)
    }

    pub fn find(
        &self,
        mut f: impl FnMut(&Value, usize) -> ModelResult<bool>,
    ) -> ModelResult<Option<Value>> {
        Ok(self
            .find_index(&mut f)?
            .map(|index| self.get(index))
            .transpose()?)
    }

    pub fn find_index(
        &self,
        mut f: impl FnMut(&Value, usize) -> ModelResult<bool>,
    ) -> ModelResult<Option<usize>> {
        let len = self.len()?;
        for index in 0..len {
            let Some(item) = self.item(index)? else { break };
            if f(&item, index)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn some(&self, mut f: impl FnMut(&Value, usize) -> ModelResult<bool>) -> ModelResult<bool> {
        Ok(self.find_index(&mut f)?.is_some())
    }

    pub fn every(&self, mut f: impl FnMut(&Value, usize) -> ModelResult<bool>) -> ModelResult<bool> {
        Ok(self
            .find_index(|item, index| f(item, index).map(|ok| !ok))?
            .is_none())
    }

    /// First index holding a strictly equal element.
    pub fn index_of(&self, needle: &Value) -> ModelResult<Option<usize>> {
        self.find_index(|item, _| Ok(item == needle))
    }

    pub fn last_index_of(&self, needle: &Value) -> ModelResult<Option<usize>> {
        let len = self.len()?;
        for index in (0..len).rev() {
            if let Some(item) = self.item(index)? {
                if &item == needle {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    /// Membership with NaN equal to itself.
    pub fn includes(&self, needle: &Value) -> ModelResult<bool> {
        self.some(|item, _| Ok(same_value_zero(item, needle)))
    }

    /// String forms joined by `separator`; undefined and null join as empty.
    pub fn join(&self, separator: &str) -> ModelResult<String> {
        let parts = self.map(|item, _| {
            Ok(match item {
                Value::Undefined | Value::Null => String::new(),
                Value::Instance(inst) => inst.to_object()?.to_string(),
                other => other.to_string(),
            })
        })?;
        Ok(parts.join(separator))
    }

    /// Elements from `start` up to `end`; negative indices count from the end.
    pub fn slice(&self, start: i64, end: Option<i64>) -> ModelResult<Vec<Value>> {
        let len = self.len()?;
        let start = relative(start, len);
        let end = relative(end.unwrap_or(len as i64), len);
        let mut out = Vec::new();
        for index in start..end.max(start) {
            let Some(item) = self.item(index)? else { break };
            out.push(item);
        }
        Ok(out)
    }

    /// Elements followed by `others`, with arrays spread one level.
    pub fn concat(&self, others: &[Value]) -> ModelResult<Vec<Value>> {
        let mut out = self.to_vec()?;
        for other in others {
            match other {
                Value::Array(items) => out.extend(items.iter().cloned()),
                Value::Instance(inst) if inst.kind()?.is_array_like() => out.extend(inst.to_vec()?),
                value => out.push(value.clone()),
            }
        }
        Ok(out)
    }

    /// Append elements; returns the new length.
    pub fn push(&self, items: Vec<Value>) -> ModelResult<usize> {
        self.call("push", items).map(as_len)
    }

    /// Remove the last element, returning a detached copy.
    pub fn pop(&self) -> ModelResult<Value> {
        self.call("pop", Vec::new())
    }

    pub fn shift(&self) -> ModelResult<Value> {
        self.call("shift", Vec::new())
    }

    /// Prepend elements; returns the new length.
    pub fn unshift(&self, items: Vec<Value>) -> ModelResult<usize> {
        self.call("unshift", items).map(as_len)
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// Without a count, everything from `start` on is removed.
    pub fn splice(
        &self,
        start: i64,
        delete_count: Option<usize>,
        items: Vec<Value>,
    ) -> ModelResult<Vec<Value>> {
        let mut args = vec![Value::from(start)];
        match delete_count {
            Some(count) => args.push(Value::from(count)),
            None if items.is_empty() => {}
            None => args.push(Value::from(usize::MAX as f64)),
        }
        args.extend(items);
        match self.call("splice", args)? {
            Value::Array(removed) => Ok(removed),
            _ => Ok(Vec::new()),
        }
    }

    /// Sort by the elements' string forms, undefined last.
    pub fn sort(&self) -> ModelResult<()> {
        self.call("sort", Vec::new()).map(|_| ())
    }

    /// Sort with a comparator.
    ///
    /// The permutation is computed here and dispatched as explicit indices,
    /// so the recorded action replays without the comparator.
    pub fn sort_by(
        &self,
        mut compare: impl FnMut(&Value, &Value) -> Ordering,
    ) -> ModelResult<()> {
        let items = self.to_vec()?;
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|a, b| compare(&items[*a], &items[*b]));
        let order = order.into_iter().map(Value::from).collect::<Vec<_>>();
        self.call("sort", vec![Value::Array(order)]).map(|_| ())
    }

    pub fn reverse(&self) -> ModelResult<()> {
        self.call("reverse", Vec::new()).map(|_| ())
    }

    /// Set elements `start..end` to `value`.
    pub fn fill(&self, value: impl Into<Value>, start: Option<i64>, end: Option<i64>) -> ModelResult<()> {
        let mut args = vec![value.into()];
        args.push(start.map_or(Value::Undefined, Value::from));
        args.push(end.map_or(Value::Undefined, Value::from));
        self.call("fill", args).map(|_| ())
    }

    /// Copy `start..end` over the elements starting at `target`.
    pub fn copy_within(&self, target: i64, start: i64, end: Option<i64>) -> ModelResult<()> {
        let mut args = vec![Value::from(target), Value::from(start)];
        if let Some(end) = end {
            args.push(Value::from(end));
        }
        self.call("copyWithin", args).map(|_| ())
    }

    /// Truncate or pad with element defaults.
    pub fn set_len(&self, len: usize) -> ModelResult<()> {
        self.set("length", len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_index() {
        assert_eq!(relative(2, 5), 2);
        assert_eq!(relative(-1, 5), 4);
        assert_eq!(relative(-10, 5), 0);
        assert_eq!(relative(10, 5), 5);
    }

    #[test]
    fn test_default_order() {
        let mut items = vec![
            Data::Number(10.0),
            Data::Undefined,
            Data::Number(9.0),
            Data::string("a"),
        ];
        items.sort_by(default_order);
        assert_eq!(
            items,
            vec![
                Data::Number(10.0),
                Data::Number(9.0),
                Data::string("a"),
                Data::Undefined
            ]
        );
    }

    #[test]
    fn test_same_value_zero() {
        assert!(same_value_zero(&Value::from(f64::NAN), &Value::from(f64::NAN)));
        assert!(same_value_zero(&Value::from(0.0), &Value::from(-0.0)));
        assert!(!same_value_zero(&Value::from(1), &Value::from("1")));
    }
}
