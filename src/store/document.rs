//! Uniform document protocol: every store call is
//! `(collection, filter, data, sort, limit, skip)` and answers come back as
//! `{data, total}`. This is the only persistence shape the core depends on.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::StoreResult;

/// A stored record or a filter/update expression over one.
pub type Document = serde_json::Map<String, Value>;

/// Collections the service owns. Backends reject anything else.
pub const COLLECTIONS: &[&str] = &["users", "roles", "tokens"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    /// `Some(0)` returns no documents but still reports the total.
    pub limit: Option<u64>,
    pub skip: u64,
}

impl FindOptions {
    pub fn limited(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<Document>,
    /// Matching documents before skip/limit were applied.
    pub total: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> StoreResult<Page>;
    async fn insert(&self, collection: &str, docs: Vec<Document>) -> StoreResult<u64>;
    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<u64>;
    async fn delete(&self, collection: &str, filter: &Document) -> StoreResult<u64>;
}

/// Whether `doc` satisfies every condition in `filter`. Conditions are either
/// plain equality (with array-contains semantics when the stored field is an
/// array and the expected value is a scalar) or an operator object
/// (`$in`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`).
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, cond)| {
        let field = doc.get(key);
        match cond {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops
                .iter()
                .all(|(op, operand)| matches_operator(field, op, operand)),
            expected => matches_eq(field, expected),
        }
    })
}

fn matches_eq(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
        None => expected.is_null(),
    }
}

fn matches_operator(field: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$in" => match (field, operand.as_array()) {
            (Some(Value::Array(items)), Some(set)) => items.iter().any(|item| set.contains(item)),
            (Some(actual), Some(set)) => set.contains(actual),
            _ => false,
        },
        "$ne" => !matches_eq(field, operand),
        "$gt" | "$gte" | "$lt" | "$lte" => {
            // i64 first: nanosecond timestamps overflow f64's exact range.
            let ordering = match (field.and_then(Value::as_i64), operand.as_i64()) {
                (Some(actual), Some(bound)) => actual.cmp(&bound),
                _ => {
                    let (Some(actual), Some(bound)) =
                        (field.and_then(Value::as_f64), operand.as_f64())
                    else {
                        return false;
                    };
                    match actual.partial_cmp(&bound) {
                        Some(ordering) => ordering,
                        None => return false,
                    }
                }
            };
            match op {
                "$gt" => ordering == Ordering::Greater,
                "$gte" => ordering != Ordering::Less,
                "$lt" => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
        _ => false,
    }
}

/// Applies an update expression in place. A bare map is treated as `$set`;
/// operator maps support `$set` and `$unset`, anything else is ignored.
pub fn apply_update(doc: &mut Document, update: &Document) {
    let operator_style = update.keys().any(|k| k.starts_with('$'));
    if !operator_style {
        for (key, value) in update {
            doc.insert(key.clone(), value.clone());
        }
        return;
    }

    for (op, operand) in update {
        match (op.as_str(), operand) {
            ("$set", Value::Object(fields)) => {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            ("$unset", Value::Object(fields)) => {
                for key in fields.keys() {
                    doc.remove(key);
                }
            }
            _ => {}
        }
    }
}

pub fn sort_documents(docs: &mut [Document], key: &str, order: SortOrder) {
    docs.sort_by(|a, b| {
        let ordering = compare_values(a.get(key), b.get(key));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Applies skip/limit to an already-filtered set, returning the page and the
/// pre-pagination total.
pub fn paginate(mut docs: Vec<Document>, options: &FindOptions) -> Page {
    if let Some((key, order)) = &options.sort {
        sort_documents(&mut docs, key, *order);
    }
    let total = docs.len() as u64;
    let skip = options.skip.min(total) as usize;
    let mut data: Vec<Document> = docs.into_iter().skip(skip).collect();
    if let Some(limit) = options.limit {
        data.truncate(limit as usize);
    }
    Page { data, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn equality_and_array_contains() {
        let record = doc(json!({"username": "ada", "roles": ["r1", "r2"]}));
        assert!(matches(&record, &doc(json!({"username": "ada"}))));
        assert!(!matches(&record, &doc(json!({"username": "bob"}))));
        // scalar filter against array field matches membership
        assert!(matches(&record, &doc(json!({"roles": "r2"}))));
        assert!(!matches(&record, &doc(json!({"roles": "r9"}))));
    }

    #[test]
    fn in_operator() {
        let record = doc(json!({"internal_id": "a"}));
        assert!(matches(
            &record,
            &doc(json!({"internal_id": {"$in": ["a", "b"]}}))
        ));
        assert!(!matches(
            &record,
            &doc(json!({"internal_id": {"$in": ["x"]}}))
        ));
    }

    #[test]
    fn range_operators() {
        let record = doc(json!({"expires_at": 100}));
        assert!(matches(&record, &doc(json!({"expires_at": {"$gt": 50}}))));
        assert!(matches(&record, &doc(json!({"expires_at": {"$lte": 100}}))));
        assert!(!matches(&record, &doc(json!({"expires_at": {"$lt": 100}}))));
    }

    #[test]
    fn set_and_unset() {
        let mut record = doc(json!({"a": 1, "b": 2}));
        apply_update(
            &mut record,
            &doc(json!({"$set": {"a": 9}, "$unset": {"b": ""}})),
        );
        assert_eq!(record.get("a"), Some(&json!(9)));
        assert!(!record.contains_key("b"));
    }

    #[test]
    fn bare_update_is_set() {
        let mut record = doc(json!({"a": 1}));
        apply_update(&mut record, &doc(json!({"a": 2, "c": 3})));
        assert_eq!(record.get("a"), Some(&json!(2)));
        assert_eq!(record.get("c"), Some(&json!(3)));
    }

    #[test]
    fn pagination_reports_pre_slice_total() {
        let docs: Vec<Document> = (0..5).map(|i| doc(json!({"cr_time": i}))).collect();
        let page = paginate(
            docs,
            &FindOptions {
                sort: Some(("cr_time".into(), SortOrder::Desc)),
                limit: Some(2),
                skip: 1,
            },
        );
        assert_eq!(page.total, 5);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].get("cr_time"), Some(&json!(3)));
    }
}
