//! Structured task values and named bindings
//!
//! Task inputs and outputs flow through the system as [`Bindings`]: ordered
//! maps from a name to a [`Value`]. File and directory values carry a local
//! path or a remote URI, and every rewrite this crate performs (local path to
//! uploaded URI) is a path rewrite over a binding set.

use crate::errors::{Error, Result};
use serde_json::{Map, Number};
use std::collections::BTreeMap;
use std::convert::Infallible;

/// Which kind of path-carrying value a rewrite callback is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    File,
    Directory,
}

/// A single task value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    File(String),
    Directory(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

/// Declared type of a value, used to decode JSON back into values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Int,
    Float,
    String,
    File,
    Directory,
    Array(Box<ValueType>),
    Struct(BTreeMap<String, ValueType>),
    Optional(Box<ValueType>),
}

impl ValueType {
    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    pub fn array(item: ValueType) -> Self {
        ValueType::Array(Box::new(item))
    }
}

impl Value {
    /// The path or URI of a file or directory value
    pub fn path(&self) -> Option<(PathKind, &str)> {
        match self {
            Value::File(path) => Some((PathKind::File, path)),
            Value::Directory(path) => Some((PathKind::Directory, path)),
            _ => None,
        }
    }

    /// Plain JSON form; files and directories become their path strings
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::File(s) | Value::Directory(s) => {
                serde_json::Value::String(s.clone())
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Decode a JSON value against its declared type
    pub fn from_json(json: &serde_json::Value, ty: &ValueType) -> Result<Self> {
        use serde_json::Value as Json;

        match (ty, json) {
            (ValueType::Optional(_), Json::Null) => Ok(Value::Null),
            (ValueType::Optional(inner), _) => Value::from_json(json, inner),
            (ValueType::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
            (ValueType::Int, Json::Number(n)) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| Error::value(format!("expected Int, found {n}"))),
            (ValueType::Float, Json::Number(n)) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| Error::value(format!("expected Float, found {n}"))),
            (ValueType::String, Json::String(s)) => Ok(Value::String(s.clone())),
            (ValueType::File, Json::String(s)) => Ok(Value::File(s.clone())),
            (ValueType::Directory, Json::String(s)) => Ok(Value::Directory(s.clone())),
            (ValueType::Array(item), Json::Array(items)) => items
                .iter()
                .map(|item_json| Value::from_json(item_json, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (ValueType::Struct(members), Json::Object(object)) => {
                let mut decoded = BTreeMap::new();
                for (name, member_ty) in members {
                    let member_json = object.get(name).unwrap_or(&Json::Null);
                    decoded.insert(name.clone(), Value::from_json(member_json, member_ty)?);
                }
                Ok(Value::Struct(decoded))
            }
            (ty, json) => Err(Error::value(format!("expected {ty:?}, found {json}"))),
        }
    }

    /// Rebuild this value with every file and directory path passed through `f`
    pub fn try_rewrite_paths<E, F>(&self, f: &mut F) -> std::result::Result<Value, E>
    where
        F: FnMut(PathKind, &str) -> std::result::Result<String, E>,
    {
        Ok(match self {
            Value::File(path) => Value::File(f(PathKind::File, path)?),
            Value::Directory(path) => Value::Directory(f(PathKind::Directory, path)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.try_rewrite_paths(f))
                    .collect::<std::result::Result<_, E>>()?,
            ),
            Value::Struct(members) => {
                let mut rewritten = BTreeMap::new();
                for (name, value) in members {
                    rewritten.insert(name.clone(), value.try_rewrite_paths(f)?);
                }
                Value::Struct(rewritten)
            }
            other => other.clone(),
        })
    }

    pub fn rewrite_paths<F>(&self, mut f: F) -> Value
    where
        F: FnMut(PathKind, &str) -> String,
    {
        let rewritten: std::result::Result<Value, Infallible> =
            self.try_rewrite_paths(&mut |kind, path| Ok(f(kind, path)));
        match rewritten {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<(PathKind, &'a str)>) {
        match self {
            Value::File(path) => out.push((PathKind::File, path)),
            Value::Directory(path) => out.push((PathKind::Directory, path)),
            Value::Array(items) => items.iter().for_each(|item| item.collect_paths(out)),
            Value::Struct(members) => members.values().for_each(|v| v.collect_paths(out)),
            _ => {}
        }
    }
}

/// Ordered `name -> value` map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every file and directory path in these bindings, in binding order
    pub fn paths(&self) -> Vec<(PathKind, &str)> {
        let mut out = Vec::new();
        for value in self.0.values() {
            value.collect_paths(&mut out);
        }
        out
    }

    pub fn try_rewrite_paths<E, F>(&self, mut f: F) -> std::result::Result<Bindings, E>
    where
        F: FnMut(PathKind, &str) -> std::result::Result<String, E>,
    {
        let mut rewritten = BTreeMap::new();
        for (name, value) in &self.0 {
            rewritten.insert(name.clone(), value.try_rewrite_paths(&mut f)?);
        }
        Ok(Bindings(rewritten))
    }

    pub fn rewrite_paths<F>(&self, mut f: F) -> Bindings
    where
        F: FnMut(PathKind, &str) -> String,
    {
        Bindings(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), value.rewrite_paths(&mut f)))
                .collect(),
        )
    }

    /// JSON object form. With a namespace, keys become `namespace.name`.
    ///
    /// Object keys are sorted, so equal bindings always serialize to
    /// identical bytes.
    pub fn to_json(&self, namespace: Option<&str>) -> serde_json::Value {
        let object: Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(name, value)| {
                let key = match namespace {
                    Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
                    _ => name.clone(),
                };
                (key, value.to_json())
            })
            .collect();
        serde_json::Value::Object(object)
    }

    /// Decode a JSON object against declared output types.
    ///
    /// Keys absent from the object decode as `null`, which only an optional
    /// type accepts.
    pub fn from_json(
        json: &serde_json::Value,
        types: &BTreeMap<String, ValueType>,
    ) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::value(format!("expected a JSON object, found {json}")))?;

        let mut bindings = Bindings::new();
        for (name, ty) in types {
            let value_json = object.get(name).unwrap_or(&serde_json::Value::Null);
            let value = Value::from_json(value_json, ty)
                .map_err(|e| Error::value(format!("binding '{name}': {e}")))?;
            bindings.insert(name.clone(), value);
        }
        Ok(bindings)
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Bindings(iter.into_iter().collect())
    }
}
