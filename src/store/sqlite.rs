//! SQLite document backend over sea-orm. Each collection is a two-column
//! table (`internal_id`, `doc`); filters beyond the primary key are applied
//! to the decoded documents with the shared matcher.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use serde_json::Value;

use crate::store::document::{self, Document, DocumentStore, FindOptions, Page, COLLECTIONS};
use crate::store::{StoreError, StoreResult};

pub struct SqliteDocumentStore {
    db: DatabaseConnection,
}

impl SqliteDocumentStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let db = Database::connect(url).await?;
        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for collection in COLLECTIONS {
            self.db
                .execute(Statement::from_string(
                    DbBackend::Sqlite,
                    format!(
                        "CREATE TABLE IF NOT EXISTS {collection} (\
                         internal_id TEXT PRIMARY KEY, \
                         doc TEXT NOT NULL)"
                    ),
                ))
                .await?;
        }
        Ok(())
    }

    fn table(collection: &str) -> StoreResult<&str> {
        COLLECTIONS
            .iter()
            .find(|known| **known == collection)
            .copied()
            .ok_or_else(|| StoreError::InvalidQuery(format!("unknown collection {collection}")))
    }

    /// Loads candidate rows, using the primary key when the filter pins it.
    async fn load(&self, table: &str, filter: &Document) -> StoreResult<Vec<Document>> {
        let rows = match filter.get("internal_id") {
            Some(Value::String(id)) if filter.len() == 1 => {
                self.db
                    .query_all(Statement::from_sql_and_values(
                        DbBackend::Sqlite,
                        format!("SELECT doc FROM {table} WHERE internal_id = ?"),
                        [id.clone().into()],
                    ))
                    .await?
            }
            _ => {
                self.db
                    .query_all(Statement::from_string(
                        DbBackend::Sqlite,
                        format!("SELECT doc FROM {table}"),
                    ))
                    .await?
            }
        };

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("", "doc")?;
            let value: Value = serde_json::from_str(&raw)?;
            if let Value::Object(doc) = value {
                if document::matches(&doc, filter) {
                    docs.push(doc);
                }
            }
        }
        Ok(docs)
    }
}

fn internal_id(doc: &Document) -> StoreResult<String> {
    match doc.get("internal_id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        _ => Err(StoreError::InvalidQuery(
            "document is missing internal_id".to_string(),
        )),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> StoreResult<Page> {
        let table = Self::table(collection)?;
        let docs = self.load(table, filter).await?;
        Ok(document::paginate(docs, &options))
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> StoreResult<u64> {
        let table = Self::table(collection)?;
        let mut inserted = 0;
        for doc in docs {
            let id = internal_id(&doc)?;
            let raw = serde_json::to_string(&Value::Object(doc))?;
            let result = self
                .db
                .execute(Statement::from_sql_and_values(
                    DbBackend::Sqlite,
                    format!("INSERT INTO {table} (internal_id, doc) VALUES (?, ?)"),
                    [id.clone().into(), raw.into()],
                ))
                .await;
            match result {
                Ok(_) => inserted += 1,
                Err(e) if e.to_string().contains("UNIQUE constraint") => {
                    return Err(StoreError::Conflict(format!(
                        "duplicate internal_id {id} in {collection}"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<u64> {
        let table = Self::table(collection)?;
        let docs = self.load(table, filter).await?;
        let mut updated = 0;
        for mut doc in docs {
            let id = internal_id(&doc)?;
            document::apply_update(&mut doc, update);
            let raw = serde_json::to_string(&Value::Object(doc))?;
            self.db
                .execute(Statement::from_sql_and_values(
                    DbBackend::Sqlite,
                    format!("UPDATE {table} SET doc = ? WHERE internal_id = ?"),
                    [raw.into(), id.into()],
                ))
                .await?;
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let table = Self::table(collection)?;
        let docs = self.load(table, filter).await?;
        let mut deleted = 0;
        for doc in docs {
            let id = internal_id(&doc)?;
            let result = self
                .db
                .execute(Statement::from_sql_and_values(
                    DbBackend::Sqlite,
                    format!("DELETE FROM {table} WHERE internal_id = ?"),
                    [id.into()],
                ))
                .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn doc(value: Value) -> Document {
        value.as_object().expect("object").clone()
    }

    /// Keeps the temp file alive for the duration of a test store.
    struct TestStore {
        store: SqliteDocumentStore,
        _temp_file: NamedTempFile,
    }

    impl TestStore {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("temp file");
            let url = format!(
                "sqlite://{}?mode=rwc",
                temp_file.path().to_str().expect("utf-8 path")
            );
            let store = SqliteDocumentStore::connect(&url).await.expect("connect");
            Self {
                store,
                _temp_file: temp_file,
            }
        }
    }

    #[tokio::test]
    async fn round_trip() {
        let test = TestStore::new().await;
        test.store
            .insert(
                "users",
                vec![doc(
                    json!({"internal_id": "u1", "username": "ada", "roles": ["r1"]}),
                )],
            )
            .await
            .unwrap();

        let page = test
            .store
            .find("users", &doc(json!({"roles": "r1"})), FindOptions::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        test.store
            .update(
                "users",
                &doc(json!({"internal_id": "u1"})),
                &doc(json!({"$set": {"username": "countess"}})),
            )
            .await
            .unwrap();

        let page = test
            .store
            .find(
                "users",
                &doc(json!({"internal_id": "u1"})),
                FindOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.data[0].get("username"), Some(&json!("countess")));

        let deleted = test
            .store
            .delete("users", &doc(json!({"internal_id": "u1"})))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn unknown_collection_rejected() {
        let test = TestStore::new().await;
        let err = test
            .store
            .find("secrets", &Document::new(), FindOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn duplicate_key_is_conflict() {
        let test = TestStore::new().await;
        test.store
            .insert("roles", vec![doc(json!({"internal_id": "r1"}))])
            .await
            .unwrap();
        let err = test
            .store
            .insert("roles", vec![doc(json!({"internal_id": "r1"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
