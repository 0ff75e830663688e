//! Unions.
//!
//! A union is *simple* when no two members share a storage kind: the stored
//! data then identifies its member by itself. Otherwise the union is
//! *complex* and stores `{"<kind><n>": data}`, where the key is the member's
//! kind plus its ordinal among members of that kind (`object1`, `object2`).
//! Those keys are part of the stored format, so member order matters.

use super::{TypeCx, TypeHandler, TypeId, UnpackRequest};
use crate::{Data, ModelError, ModelResult, Path, Seg, Value};

const UNDEFINED_KEY: &str = "undefined1";
static UNDEFINED: Data = Data::Undefined;

pub(crate) struct UnionType {
    members: Vec<(String, TypeId)>,
    simple: bool,
}

impl UnionType {
    pub fn new(members: Vec<(String, TypeId)>, simple: bool) -> Self {
        Self { members, simple }
    }

    /// Members with their discriminants.
    pub fn members(&self) -> &[(String, TypeId)] {
        &self.members
    }

    fn member(&self, key: &str) -> Option<TypeId> {
        self.members
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, id)| *id)
    }

    /// The single discriminant key of complex union data.
    fn discriminant<'d>(&self, value: &'d Data, path: &Path) -> Result<(String, &'d Data), String> {
        let map = value
            .as_object()
            .ok_or_else(|| format!("Missing union type for union \"{}\"", path))?;
        // `{"undefined1": undefined}` is stored as `{}`.
        if map.is_empty() {
            if let Some((key, _)) = self.members.iter().find(|(key, _)| key == UNDEFINED_KEY) {
                return Ok((key.clone(), &UNDEFINED));
            }
        }
        if map.len() != 1 {
            return Err(format!("Missing union type for union \"{}\"", path));
        }
        let (key, inner) = map
            .iter()
            .next()
            .ok_or_else(|| format!("Missing union type for union \"{}\"", path))?;
        if self.member(key).is_none() {
            return Err(format!("Unexpected type \"{}\" for union \"{}\"", key, path));
        }
        Ok((key.clone(), inner))
    }

    fn wrap(&self, key: &str, data: Data) -> Data {
        if self.simple {
            data
        } else {
            Data::object([(key.to_string(), data)])
        }
    }
}

impl TypeHandler for UnionType {
    fn validate_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Option<String> {
        if self.simple {
            let found = self
                .members
                .iter()
                .any(|(_, id)| cx.arena.validate_data_at(*id, value, path).is_none());
            return if found {
                None
            } else {
                Some(format!("No matching data type for union \"{}\"", path))
            };
        }
        match self.discriminant(value, path) {
            Ok((key, inner)) => {
                let id = self.member(&key)?;
                cx.arena.validate_data_at(id, inner, path)
            }
            Err(message) => Some(message),
        }
    }

    fn coerce_data(&self, cx: TypeCx<'_>, value: &Data, path: &Path) -> Data {
        if self.validate_data(cx, value, path).is_none() {
            return value.clone();
        }
        if !self.simple {
            if let Ok((key, inner)) = self.discriminant(value, path) {
                if let Some(id) = self.member(&key) {
                    return self.wrap(&key, cx.arena.coerce_data_at(id, inner, path));
                }
            }
        }
        self.default_value(cx)
    }

    fn validate_assign(&self, cx: TypeCx<'_>, value: &Value, path: &Path) -> Option<String> {
        let mut messages = Vec::with_capacity(self.members.len());
        for (_, id) in &self.members {
            match cx.arena.validate_assign_at(*id, value, path) {
                None => return None,
                Some(message) => messages.push(message),
            }
        }
        Some(format!(
            "Incompatible value {} for {}. {}.",
            value,
            path,
            messages.join(" -or- ")
        ))
    }

    fn pack(&self, cx: TypeCx<'_>, value: &Value) -> ModelResult<Data> {
        let (key, id) = self
            .members
            .iter()
            .find(|(_, id)| cx.arena.validate_assign(*id, value).is_none())
            .ok_or_else(|| {
                ModelError::validation(
                    self.validate_assign(cx, value, cx.moniker())
                        .unwrap_or_else(|| format!("Incompatible value for {}", cx.moniker())),
                )
            })?;
        Ok(self.wrap(key, cx.arena.pack_unverified(*id, value)?))
    }

    fn unpack(&self, cx: TypeCx<'_>, req: UnpackRequest<'_>) -> ModelResult<Value> {
        if req.current.is_some() {
            return Err(ModelError::invalid_operation(
                "Union types cannot modify a data instance",
            ));
        }
        let data = req.store.get(&req.store_path)?;
        if self.simple {
            let id = self
                .members
                .iter()
                .map(|(_, id)| *id)
                .find(|id| cx.arena.validate_data_at(*id, &data, &req.store_path).is_none())
                .ok_or_else(|| {
                    ModelError::validation(format!(
                        "No matching data type for union \"{}\"",
                        req.store_path
                    ))
                })?;
            return req
                .store
                .unpack(id, req.store_path, req.instance_path, None, req.owner);
        }
        let (key, _) = self
            .discriminant(&data, &req.store_path)
            .map_err(ModelError::validation)?;
        let id = self
            .member(&key)
            .ok_or_else(|| ModelError::validation(format!("Unexpected type \"{}\"", key)))?;
        req.store.unpack(
            id,
            req.store_path.with_segment(key),
            req.instance_path,
            None,
            req.owner,
        )
    }

    fn default_value(&self, cx: TypeCx<'_>) -> Data {
        match self.members.first() {
            Some((key, id)) => self.wrap(key, cx.arena.default_value(*id)),
            None => Data::Undefined,
        }
    }

    fn type_from_path(&self, cx: TypeCx<'_>, path: &[Seg]) -> ModelResult<Path> {
        let Some((first, tail)) = path.split_first() else {
            return Ok(cx.moniker().clone());
        };
        if !self.simple {
            let id = first
                .as_key()
                .and_then(|key| self.member(key))
                .ok_or_else(|| ModelError::path_not_found(cx.moniker().join(path)))?;
            return cx.arena.get_type_from_path(id, tail);
        }
        self.members
            .iter()
            .find_map(|(_, id)| cx.arena.get_type_from_path(*id, path).ok())
            .ok_or_else(|| ModelError::path_not_found(cx.moniker().join(path)))
    }

    fn union(&self) -> Option<&UnionType> {
        Some(self)
    }
}
