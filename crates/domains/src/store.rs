//! # Typed access to the document store
//!
//! Adapters implement the object-safe [`DocumentStore`] port over raw JSON.
//! Services talk to [`Store`] and [`Transaction`], which add the typed
//! (de)serialization on top so no service code touches `serde_json::Value`
//! except for field patches.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::ports::{DocumentStore, StoreTransaction};

/// The six collections. Nothing else is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Tasks,
    Records,
    Gifts,
    Items,
    Notices,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Tasks,
        Collection::Records,
        Collection::Gifts,
        Collection::Items,
        Collection::Notices,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "Users",
            Collection::Tasks => "Tasks",
            Collection::Records => "Records",
            Collection::Gifts => "Gifts",
            Collection::Items => "Items",
            Collection::Notices => "Notices",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model persisted as one document of a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;
    fn id(&self) -> &str;
}

// ─── Queries ────────────────────────────────────────────────────────────────

/// Predicate over the top-level fields of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    /// String field starting with the given prefix.
    Prefix(String, String),
    /// Field absent from the document (not merely `null`).
    Missing(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn any_of<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn prefix(field: &str, prefix: &str) -> Self {
        Filter::Prefix(field.to_string(), prefix.to_string())
    }

    pub fn missing(field: &str) -> Self {
        Filter::Missing(field.to_string())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Evaluates the predicate against a JSON document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => field_of(doc, field).is_some_and(|v| v == value),
            Filter::Ne(field, value) => field_of(doc, field) != Some(value),
            Filter::Gte(field, value) => field_of(doc, field)
                .is_some_and(|v| compare_values(v, value) != Ordering::Less && same_kind(v, value)),
            Filter::In(field, values) => {
                field_of(doc, field).is_some_and(|v| values.iter().any(|candidate| candidate == v))
            }
            Filter::Prefix(field, prefix) => field_of(doc, field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Filter::Missing(field) => doc.as_object().is_some_and(|o| !o.contains_key(field)),
            Filter::And(parts) => parts.iter().all(|f| f.matches(doc)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(doc)),
        }
    }

    /// Every field name referenced by this filter.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Filter::Eq(f, _)
            | Filter::Ne(f, _)
            | Filter::Gte(f, _)
            | Filter::In(f, _)
            | Filter::Prefix(f, _)
            | Filter::Missing(f) => vec![f.as_str()],
            Filter::And(parts) | Filter::Or(parts) => parts.iter().flat_map(Filter::fields).collect(),
        }
    }
}

fn field_of<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    doc.get(field).filter(|v| !v.is_null())
}

fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) | (Value::Bool(_), Value::Bool(_))
    )
}

/// Total order used for sorting: null < bool < number < string < other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or_default()
                .partial_cmp(&y.as_f64().unwrap_or_default())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order_by: Option<(String, SortOrder)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self { filter, order_by: None, skip: 0, limit: None }
    }

    pub fn newest_first(filter: Filter) -> Self {
        Self::new(filter).order_by("createTime", SortOrder::Desc)
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order_by = Some((field.to_string(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 1-based page of `page_size` documents.
    pub fn page(self, page: usize, page_size: usize) -> Self {
        self.skip(page.saturating_sub(1).saturating_mul(page_size)).limit(page_size)
    }

    /// Applies ordering, skip and limit to documents that already passed the
    /// filter. Backends that cannot push these down use this.
    pub fn arrange(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some((field, order)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        let iter = docs.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// RFC 7396 merge patch: objects merge recursively, `null` removes a key.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

// ─── Typed handles ──────────────────────────────────────────────────────────

fn decode<D: Document>(value: Value) -> Result<D, StoreError> {
    Ok(serde_json::from_value(value)?)
}

/// Cheap, cloneable handle over a [`DocumentStore`] backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn DocumentStore>,
}

impl Store {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    pub async fn begin(&self) -> Result<Transaction, StoreError> {
        Ok(Transaction { inner: self.backend.begin().await? })
    }

    pub async fn get<D: Document>(&self, id: &str) -> Result<Option<D>, StoreError> {
        self.backend.get(D::COLLECTION, id).await?.map(decode).transpose()
    }

    pub async fn find<D: Document>(&self, query: &Query) -> Result<Vec<D>, StoreError> {
        self.backend
            .query(D::COLLECTION, query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn count<D: Document>(&self, filter: Filter) -> Result<usize, StoreError> {
        Ok(self.backend.query(D::COLLECTION, &Query::new(filter)).await?.len())
    }
}

/// An open all-or-nothing unit of work. Dropping it without
/// [`commit`](Transaction::commit) discards every write.
pub struct Transaction {
    inner: Box<dyn StoreTransaction>,
}

impl Transaction {
    pub async fn get<D: Document>(&mut self, id: &str) -> Result<Option<D>, StoreError> {
        self.inner.get(D::COLLECTION, id).await?.map(decode).transpose()
    }

    /// Like [`get`](Self::get) but a missing document is an error.
    pub async fn load<D: Document>(&mut self, id: &str) -> Result<D, StoreError> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::Missing { collection: D::COLLECTION, id: id.to_string() })
    }

    pub async fn insert<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(doc)?;
        self.inner.insert(D::COLLECTION, doc.id(), value).await
    }

    pub async fn replace<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(doc)?;
        self.inner.replace(D::COLLECTION, doc.id(), value).await
    }

    pub async fn patch<D: Document>(&mut self, id: &str, patch: Value) -> Result<(), StoreError> {
        self.inner.patch(D::COLLECTION, id, patch).await
    }

    /// Atomic numeric increment of one field.
    pub async fn increment<D: Document>(&mut self, id: &str, field: &str, delta: i64) -> Result<(), StoreError> {
        self.inner.increment(D::COLLECTION, id, field, delta).await
    }

    pub async fn delete<D: Document>(&mut self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(D::COLLECTION, id).await
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}
