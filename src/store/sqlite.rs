//! A [DocumentStore] that keeps JSON documents in a single SQLite table.

use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::Value;

use crate::{
    Error,
    document_id::DocumentId,
    store::{
        Collection, Document, DocumentStore, ID_FIELD,
        execute::{matches, run_pipeline},
        query::{Filter, Stage},
    },
};

/// Documents stored as JSON text, one row per document.
///
/// `seq` preserves insertion order, which is the natural order of every read.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create a store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, Error> {
        create_document_table(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Run `operation` on the blocking thread pool, bounded by `timeout`.
    ///
    /// Writes must go through [CommitGate::commit]: once the caller has given
    /// up waiting, the write is rolled back instead of committed.
    async fn run<T, F>(&self, timeout: Duration, operation: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &CommitGate) -> Result<T, Error> + Send + 'static,
    {
        let connection = self.connection.clone();
        let gate = CommitGate::new(timeout);
        let task_gate = gate.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            let mut connection = connection.lock().map_err(|error| {
                tracing::error!("could not acquire database lock: {error}");
                Error::DatabaseLockError
            })?;

            operation(&mut *connection, &task_gate)
        });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined.map_err(|error| Error::BackgroundTask(error.to_string()))?,
            Err(_) if gate.abandon() => Err(Error::Timeout(timeout)),
            // The commit started before the deadline, so its outcome is the result.
            Err(_) => task
                .await
                .map_err(|error| Error::BackgroundTask(error.to_string()))?,
        }
    }
}

const WAITING: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides, between a store call and its blocking task, whether a write may
/// still commit.
///
/// Exactly one side wins: either the task starts committing, or the caller
/// times out and the write is rolled back.
#[derive(Debug, Clone)]
struct CommitGate {
    state: Arc<AtomicU8>,
    timeout: Duration,
}

impl CommitGate {
    fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(WAITING)),
            timeout,
        }
    }

    /// Commit `transaction` unless the caller has stopped waiting for it.
    ///
    /// # Errors
    /// Returns [Error::Timeout] after rolling back if the caller timed out.
    fn commit(&self, transaction: Transaction<'_>) -> Result<(), Error> {
        let claimed = self
            .state
            .compare_exchange(WAITING, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if !claimed {
            tracing::warn!("rolling back a write whose caller timed out");
            transaction.rollback()?;
            return Err(Error::Timeout(self.timeout));
        }

        transaction.commit()?;
        Ok(())
    }

    /// Give up on the operation. Returns false if it is already committing.
    fn abandon(&self) -> bool {
        self.state
            .compare_exchange(WAITING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn create_document_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS document (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            UNIQUE (collection, id)
        )",
        (),
    )?;

    Ok(())
}

/// Read every document of `collection` in insertion order.
///
/// Rows whose body is not a JSON object are logged and skipped.
fn load_collection(
    connection: &Connection,
    collection: Collection,
) -> Result<Vec<Document>, Error> {
    let mut statement =
        connection.prepare("SELECT id, body FROM document WHERE collection = ?1 ORDER BY seq")?;

    let rows = statement.query_map(params![collection.name()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut documents = Vec::new();
    for row in rows {
        let (id, body) = row?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(document)) => documents.push(document),
            _ => {
                tracing::warn!(
                    "skipping unreadable document {id} in {}",
                    collection.name()
                );
            }
        }
    }

    Ok(documents)
}

fn load_by_id(
    connection: &Connection,
    collection: Collection,
    id: DocumentId,
) -> Result<Option<Document>, Error> {
    let body: Option<String> = connection
        .query_row(
            "SELECT body FROM document WHERE collection = ?1 AND id = ?2",
            params![collection.name(), id.to_hex()],
            |row| row.get(0),
        )
        .optional()?;

    match body {
        Some(body) => match serde_json::from_str(&body)? {
            Value::Object(document) => Ok(Some(document)),
            _ => Err(Error::Serialization(format!(
                "document {id} in {} is not a JSON object",
                collection.name()
            ))),
        },
        None => Ok(None),
    }
}

fn write_body(
    connection: &Connection,
    collection: Collection,
    id: &str,
    document: &Document,
) -> Result<usize, Error> {
    let body = serde_json::to_string(document)?;

    connection
        .execute(
            "UPDATE document SET body = ?1 WHERE collection = ?2 AND id = ?3",
            params![body, collection.name(), id],
        )
        .map_err(Error::from)
}

/// Merge `fields` into `document`. The ID field is never overwritten.
fn set_fields(document: &mut Document, fields: &Document) {
    for (key, value) in fields {
        if key != ID_FIELD {
            document.insert(key.clone(), value.clone());
        }
    }
}

/// A JSON path that addresses a top-level field by name.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

impl DocumentStore for SqliteDocumentStore {
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        timeout: Duration,
    ) -> Result<Vec<Document>, Error> {
        let filter = filter.clone();

        self.run(timeout, move |connection, _| {
            let documents = load_collection(connection, collection)?;

            Ok(documents
                .into_iter()
                .filter(|document| matches(document, &filter))
                .collect())
        })
        .await
    }

    async fn insert(
        &self,
        collection: Collection,
        mut document: Document,
        timeout: Duration,
    ) -> Result<DocumentId, Error> {
        let id = DocumentId::new();
        document.insert(ID_FIELD.to_owned(), Value::String(id.to_hex()));

        self.run(timeout, move |connection, gate| {
            let body = serde_json::to_string(&document)?;
            let transaction = connection.transaction()?;
            transaction.execute(
                "INSERT INTO document (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection.name(), id.to_hex(), body],
            )?;

            gate.commit(transaction)?;
            Ok(id)
        })
        .await
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: DocumentId,
        fields: Document,
        timeout: Duration,
    ) -> Result<bool, Error> {
        self.run(timeout, move |connection, gate| {
            let transaction = connection.transaction()?;

            let Some(mut document) = load_by_id(&transaction, collection, id)? else {
                return Ok(false);
            };
            set_fields(&mut document, &fields);
            write_body(&transaction, collection, &id.to_hex(), &document)?;

            gate.commit(transaction)?;
            Ok(true)
        })
        .await
    }

    async fn increment_by_id(
        &self,
        collection: Collection,
        id: DocumentId,
        field: &str,
        delta: f64,
        timeout: Duration,
    ) -> Result<bool, Error> {
        let path = json_path(field);

        self.run(timeout, move |connection, gate| {
            let transaction = connection.transaction()?;
            let rows_affected = transaction.execute(
                "UPDATE document \
                SET body = json_set(body, ?1, COALESCE(json_extract(body, ?1), 0) + ?2) \
                WHERE collection = ?3 AND id = ?4",
                params![path, delta, collection.name(), id.to_hex()],
            )?;

            gate.commit(transaction)?;
            Ok(rows_affected != 0)
        })
        .await
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: DocumentId,
        timeout: Duration,
    ) -> Result<bool, Error> {
        self.run(timeout, move |connection, gate| {
            let transaction = connection.transaction()?;
            let rows_affected = transaction.execute(
                "DELETE FROM document WHERE collection = ?1 AND id = ?2",
                params![collection.name(), id.to_hex()],
            )?;

            gate.commit(transaction)?;
            Ok(rows_affected != 0)
        })
        .await
    }

    async fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        fields: Document,
        timeout: Duration,
    ) -> Result<usize, Error> {
        let filter = filter.clone();

        self.run(timeout, move |connection, gate| {
            let transaction = connection.transaction()?;
            let mut updated = 0;

            for mut document in load_collection(&transaction, collection)? {
                if !matches(&document, &filter) {
                    continue;
                }

                let Some(id) = document
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                else {
                    continue;
                };

                set_fields(&mut document, &fields);
                updated += write_body(&transaction, collection, &id, &document)?;
            }

            gate.commit(transaction)?;
            Ok(updated)
        })
        .await
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: &[Stage],
        timeout: Duration,
    ) -> Result<Vec<Document>, Error> {
        let pipeline = pipeline.to_vec();

        self.run(timeout, move |connection, _| {
            let documents = load_collection(connection, collection)?;
            Ok(run_pipeline(documents, &pipeline))
        })
        .await
    }
}
