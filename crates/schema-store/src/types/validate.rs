//! Wrappers that refine a base type: extra validation rules and custom
//! data coercion.

use super::{TypeCx, TypeHandler, TypeId, UnpackRequest};
use crate::schema::Coercion;
use crate::{Data, Instance, ModelResult, Path, Seg, Store, Validator, Value};
use regex_syntax::hir::{Class, Hir, HirKind};

/// Delegate the structural parts of [`TypeHandler`] to `self.base`.
macro_rules! delegate_to_base {
    () => {
        fn validate_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
            cx.arena.validate_data_at(self.base, value, path)
        }

        fn unpack(&self, cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
            cx.arena.unpack(self.base, req)
        }

        fn type_from_path(&self, cx: TypeCx<'_>, path: &[Seg]) -> ModelResult<Path> {
            cx.arena.get_type_from_path(self.base, path)
        }

        fn get_prop(
            &self,
            cx: TypeCx<'_>,
            store: &Store,
            instance: &Instance,
            seg: Seg,
        ) -> ModelResult<Value> {
            let base = cx.arena.get(self.base);
            base.handler.get_prop(cx.arena.cx(self.base), store, instance, seg)
        }

        fn set_prop(
            &self,
            cx: TypeCx<'_>,
            store: &Store,
            instance: &Instance,
            seg: Seg,
            value: Value,
        ) -> ModelResult<()> {
            let base = cx.arena.get(self.base);
            base.handler
                .set_prop(cx.arena.cx(self.base), store, instance, seg, value)
        }

        fn pack_prop(&self, cx: TypeCx<'_>, seg: &Seg, value: &Value) -> ModelResult<Data> {
            cx.arena.pack_prop(self.base, seg, value)
        }

        fn default_prop(&self, cx: TypeCx<'_>, seg: &Seg) -> Data {
            cx.arena.default_prop(self.base, seg)
        }
    };
}

/// A base type plus a validation rule checked on assignment.
pub(crate) struct ValidateType {
    base: TypeId,
    validator: Validator,
    example: Option<Data>,
}

impl ValidateType {
    pub fn new(base: TypeId, validator: Validator) -> Self {
        let example = match &validator {
            Validator::Pattern(re) => example_for(re.as_str())
                .filter(|text| re.is_match(text))
                .map(Data::string),
            Validator::Check(_) => None,
        };
        Self {
            base,
            validator,
            example,
        }
    }
}

impl TypeHandler for ValidateType {
    delegate_to_base!();

    fn coerce_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Data {
        cx.arena.coerce_data_at(self.base, value, path)
    }

    fn validate_assign(&self, cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        if let Some(message) = self.validator.run(value) {
            return Some(format!("Can't assign \"{}\": {}", path, message));
        }
        cx.arena.validate_assign_at(self.base, value, path)
    }

    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        cx.arena.pack_unverified(self.base, value)
    }

    fn default_value(&self, cx: TypeCx<'_>) -> Data {
        let base = cx.arena.default_value(self.base);
        match &self.example {
            Some(example) if self.validator.run(&Value::from(&base)).is_some() => example.clone(),
            _ => base,
        }
    }
}

/// A base type whose stored data is normalized before validation.
pub(crate) struct CoerceType {
    base: TypeId,
    coerce: Coercion,
}

impl CoerceType {
    pub fn new(base: TypeId, coerce: Coercion) -> Self {
        Self { base, coerce }
    }
}

impl TypeHandler for CoerceType {
    delegate_to_base!();

    fn coerce_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Data {
        let value = (self.coerce.0)(value);
        if cx.arena.validate_data_at(self.base, &value, path).is_some() {
            return cx.arena.coerce_data_at(self.base, &value, path);
        }
        value
    }

    fn validate_assign(&self, cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        cx.arena.validate_assign_at(self.base, value, path)
    }

    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        cx.arena.pack_unverified(self.base, value)
    }

    fn default_value(&self, cx: TypeCx<'_>) -> Data {
        cx.arena.default_value(self.base)
    }
}

/// Generate a short string matching `pattern`.
///
/// Takes the first alternative of every alternation and the minimum count of
/// every repetition. Returns `None` when the pattern does not parse.
pub(crate) fn example_for(pattern: &str) -> Option<String> {
    let hir = regex_syntax::parse(pattern).ok()?;
    let mut out = String::new();
    write_example(&hir, &mut out);
    Some(out)
}

fn write_example(hir: &Hir, out: &mut String) {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(lit) => out.push_str(&String::from_utf8_lossy(&lit.0)),
        HirKind::Class(Class::Unicode(class)) => {
            let pick = class.ranges().iter().find_map(|range| {
                let lo = range.start().max(' ');
                (lo <= range.end()).then_some(lo)
            });
            if let Some(c) = pick {
                out.push(c);
            }
        }
        HirKind::Class(Class::Bytes(class)) => {
            let pick = class.ranges().iter().find_map(|range| {
                let lo = range.start().max(b' ');
                (lo <= range.end() && lo.is_ascii()).then_some(lo as char)
            });
            if let Some(c) = pick {
                out.push(c);
            }
        }
        HirKind::Repetition(rep) => {
            for _ in 0..rep.min {
                write_example(&rep.sub, out);
            }
        }
        HirKind::Capture(cap) => write_example(&cap.sub, out),
        HirKind::Concat(parts) => parts.iter().for_each(|part| write_example(part, out)),
        HirKind::Alternation(branches) => {
            if let Some(first) = branches.first() {
                write_example(first, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn check(pattern: &str) {
        let example = example_for(pattern).unwrap();
        assert!(
            Regex::new(pattern).unwrap().is_match(&example),
            "{:?} does not match /{}/",
            example,
            pattern
        );
    }

    #[test]
    fn test_example_literals_and_classes() {
        check("^abc$");
        check("^[a-z]+$");
        check("^\\d{3}-\\d{4}$");
        check("^(foo|bar)baz$");
    }

    #[test]
    fn test_example_skips_optional_parts() {
        assert_eq!(example_for("^ab?c*$").unwrap(), "a");
    }

    #[test]
    fn test_example_bad_pattern() {
        assert!(example_for("(").is_none());
    }
}
