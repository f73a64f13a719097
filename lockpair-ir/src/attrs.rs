#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::Expr;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Str(String),
    Bool(bool),
    Expr(Expr),
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub params: Vec<AttrValue>,
}

/// Ordered attribute bag. Keys are unique; a key keeps the position of its
/// first insertion even when its value is replaced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, key: impl Into<String>, params: Vec<AttrValue>) -> Self {
        self.set(key, params);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, params: Vec<AttrValue>) {
        let key = key.into();
        match self.0.iter_mut().find(|a| a.key == key) {
            Some(existing) => existing.params = params,
            None => self.0.push(Attribute { key, params }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[AttrValue]> {
        self.0
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.params.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)?.first()? {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        match self.get(key)?.first()? {
            AttrValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn first_key(&self) -> Option<&str> {
        self.0.first().map(|a| a.key.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|a| a.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
