//! The document store abstraction that the ledger, report and CRUD code run against.

mod execute;
pub mod query;
mod sqlite;

use std::{future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{Error, document_id::DocumentId};

pub use query::{Filter, Stage};
pub use sqlite::SqliteDocumentStore;

/// A JSON document as held by the store.
pub type Document = Map<String, Value>;

/// The field that holds a document's ID.
pub const ID_FIELD: &str = "_id";

/// The named sets of documents the application keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Income and expense records.
    Transactions,
    /// Wallets, bank accounts and credit cards.
    Accounts,
    /// Transaction categories.
    Categories,
}

impl Collection {
    /// The collection name used by the store.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Transactions => "transactions",
            Collection::Accounts => "accounts",
            Collection::Categories => "categories",
        }
    }
}

/// Query and command interface of a document database.
///
/// Every operation is bounded by `timeout`. When it expires the caller gets
/// [Error::Timeout], a write that has not started committing is rolled back,
/// and nothing is retried.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Get the documents matching `filter`, in insertion order.
    fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Document>, Error>> + Send;

    /// Insert `document` and return its newly generated ID.
    fn insert(
        &self,
        collection: Collection,
        document: Document,
        timeout: Duration,
    ) -> impl Future<Output = Result<DocumentId, Error>> + Send;

    /// Set the fields in `fields` on the document with `id`.
    ///
    /// Returns whether a document matched.
    fn update_by_id(
        &self,
        collection: Collection,
        id: DocumentId,
        fields: Document,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Atomically add `delta` to the numeric `field` of the document with `id`.
    ///
    /// A missing field counts as zero. Returns whether a document matched.
    fn increment_by_id(
        &self,
        collection: Collection,
        id: DocumentId,
        field: &str,
        delta: f64,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Delete the document with `id`. Returns whether a document was deleted.
    fn delete_by_id(
        &self,
        collection: Collection,
        id: DocumentId,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Set the fields in `fields` on every document matching `filter`.
    ///
    /// Returns the number of documents updated.
    fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        fields: Document,
        timeout: Duration,
    ) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Run `pipeline` over the collection and return the output rows.
    fn aggregate(
        &self,
        collection: Collection,
        pipeline: &[Stage],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Document>, Error>> + Send;
}

/// Serialize `value` into a document.
///
/// # Errors
/// Returns [Error::Serialization] if `value` does not serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, Error> {
    match serde_json::to_value(value)? {
        Value::Object(document) => Ok(document),
        other => Err(Error::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Deserialize a document into `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, Error> {
    serde_json::from_value(Value::Object(document)).map_err(Error::from)
}

/// Find the single document with `id` and decode it.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such document.
pub async fn find_one<S, T>(
    store: &S,
    collection: Collection,
    id: DocumentId,
    timeout: Duration,
) -> Result<T, Error>
where
    S: DocumentStore,
    T: DeserializeOwned,
{
    let document = store
        .find(collection, &Filter::by_id(id), timeout)
        .await?
        .into_iter()
        .next()
        .ok_or(Error::NotFound)?;

    from_document(document)
}

/// Find every document in `collection` matching `filter` and decode them.
///
/// Documents that cannot be decoded into `T` are logged and skipped.
pub async fn find_all<S, T>(
    store: &S,
    collection: Collection,
    filter: &Filter,
    timeout: Duration,
) -> Result<Vec<T>, Error>
where
    S: DocumentStore,
    T: DeserializeOwned,
{
    let documents = store.find(collection, filter, timeout).await?;

    Ok(documents
        .into_iter()
        .filter_map(|document| {
            let id = document.get(ID_FIELD).cloned().unwrap_or(Value::Null);

            from_document(document)
                .inspect_err(|error| {
                    tracing::warn!(
                        "skipping unreadable document {id} in {}: {error}",
                        collection.name()
                    );
                })
                .ok()
        })
        .collect())
}
