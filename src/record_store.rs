use std::{
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    error::{Error, Result},
    records::{self, Category, Document, NewDocument, StoreEvent},
};

const DOCUMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("documents");
const CATEGORIES: TableDefinition<u64, &[u8]> =
    TableDefinition::new("categories");
const CATEGORY_NAMES: TableDefinition<&str, u64> =
    TableDefinition::new("category_names");
/// Join table keyed by `(document_id, category_id)`.
const DOCUMENT_CATEGORIES: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("document_categories");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const DOCUMENT_COUNTER: &str = "documents";
const CATEGORY_COUNTER: &str = "categories";

/// Receives every change committed to a [`RecordStore`].
///
/// Events are delivered synchronously on the writing thread, after the
/// transaction has committed, in subscription order.
pub trait StoreObserver: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

impl<F> StoreObserver for F
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn StoreObserver>)>,
}

/// Persistent store for documents, categories and the links between them.
///
/// Ids are assigned from per-table counters starting at 1, so iterating a
/// table yields records in insertion order.
pub struct RecordStore {
    db: Database,
    observers: RwLock<Observers>,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(CATEGORIES)?;
        txn.open_table(CATEGORY_NAMES)?;
        txn.open_table(DOCUMENT_CATEGORIES)?;
        txn.open_table(COUNTERS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self {
            db,
            observers: RwLock::new(Observers::default()),
        })
    }

    // -- Observers --

    pub fn subscribe(&self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        let mut observers =
            self.observers.write().unwrap_or_else(PoisonError::into_inner);
        observers.next_id += 1;
        let id = SubscriptionId(observers.next_id);
        observers.entries.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers =
            self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.entries.len();
        observers.entries.retain(|(entry, _)| *entry != id);
        observers.entries.len() != before
    }

    fn emit(&self, event: StoreEvent) {
        // Clone the list so observers may subscribe or unsubscribe while
        // handling an event.
        let observers: Vec<Arc<dyn StoreObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        tracing::trace!(?event, observers = observers.len(), "store event");
        for observer in observers {
            observer.on_event(&event);
        }
    }

    // -- Documents --

    pub fn add_document(&self, new: NewDocument) -> Result<Document> {
        if new.title.trim().is_empty() {
            return Err(Error::InvalidInput("document title is empty".into()));
        }

        let txn = self.db.begin_write()?;
        let document = {
            let mut counters = txn.open_table(COUNTERS)?;
            let id = next_id(&mut counters, DOCUMENT_COUNTER)?;
            let document = new.with_id(id);
            let mut table = txn.open_table(DOCUMENTS)?;
            table.insert(id, records::encode(&document)?.as_slice())?;
            document
        };
        txn.commit()?;

        tracing::debug!(id = document.id, title = %document.title, "added document");
        self.emit(StoreEvent::DocumentUpserted(document.clone()));
        Ok(document)
    }

    pub fn get_document(&self, id: u64) -> Result<Option<Document>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        table
            .get(id)?
            .map(|v| records::decode(v.value()))
            .transpose()
    }

    /// All documents in insertion order.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(records::decode(v.value())?);
        }
        Ok(result)
    }

    /// Replace the stored fields of an existing document, keeping its id.
    pub fn update_document(&self, document: &Document) -> Result<()> {
        if document.title.trim().is_empty() {
            return Err(Error::InvalidInput("document title is empty".into()));
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            if table.get(document.id)?.is_none() {
                return Err(Error::NotFound {
                    kind: "document",
                    name: document.id.to_string(),
                });
            }
            table.insert(document.id, records::encode(document)?.as_slice())?;
        }
        txn.commit()?;

        self.emit(StoreEvent::DocumentUpserted(document.clone()));
        Ok(())
    }

    /// Delete a document and every category link it has.
    ///
    /// Returns `false` if no such document existed.
    pub fn delete_document(&self, id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DOCUMENTS)?;
            let removed = table.remove(id)?.is_some();

            let mut links = txn.open_table(DOCUMENT_CATEGORIES)?;
            let keys: Vec<(u64, u64)> = links
                .range((id, 0)..=(id, u64::MAX))?
                .map(|entry| entry.map(|(k, _)| k.value()))
                .collect::<std::result::Result<_, _>>()?;
            for key in keys {
                links.remove(key)?;
            }
            removed
        };
        txn.commit()?;

        if removed {
            tracing::debug!(id, "deleted document");
            self.emit(StoreEvent::DocumentRemoved(id));
        }
        Ok(removed)
    }

    // -- Categories --

    pub fn add_category(&self, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("category name is empty".into()));
        }

        let txn = self.db.begin_write()?;
        let category = {
            let mut names = txn.open_table(CATEGORY_NAMES)?;
            if names.get(name)?.is_some() {
                return Err(Error::Duplicate {
                    kind: "category",
                    name: name.to_string(),
                });
            }

            let mut counters = txn.open_table(COUNTERS)?;
            let id = next_id(&mut counters, CATEGORY_COUNTER)?;
            let category = Category {
                id,
                name: name.to_string(),
            };
            names.insert(name, id)?;
            let mut table = txn.open_table(CATEGORIES)?;
            table.insert(id, records::encode(&category)?.as_slice())?;
            category
        };
        txn.commit()?;

        tracing::debug!(id = category.id, name = %category.name, "added category");
        self.emit(StoreEvent::CategoryUpserted(category.clone()));
        Ok(category)
    }

    pub fn get_category(&self, id: u64) -> Result<Option<Category>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CATEGORIES)?;
        table
            .get(id)?
            .map(|v| records::decode(v.value()))
            .transpose()
    }

    pub fn find_category(&self, name: &str) -> Result<Option<Category>> {
        let id = {
            let txn = self.db.begin_read()?;
            let names = txn.open_table(CATEGORY_NAMES)?;
            names.get(name.trim())?.map(|v| v.value())
        };
        match id {
            Some(id) => self.get_category(id),
            None => Ok(None),
        }
    }

    /// All categories in insertion order.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CATEGORIES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(records::decode(v.value())?);
        }
        Ok(result)
    }

    /// Delete a category and unlink it from every document.
    pub fn delete_category(&self, id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let (removed, unlinked) = {
            let mut table = txn.open_table(CATEGORIES)?;
            let category: Option<Category> = table
                .remove(id)?
                .map(|v| records::decode(v.value()))
                .transpose()?;

            if let Some(ref category) = category {
                let mut names = txn.open_table(CATEGORY_NAMES)?;
                names.remove(category.name.as_str())?;
            }

            let mut links = txn.open_table(DOCUMENT_CATEGORIES)?;
            let mut keys = Vec::new();
            for entry in links.iter()? {
                let (k, _) = entry?;
                let key = k.value();
                if key.1 == id {
                    keys.push(key);
                }
            }
            for key in &keys {
                links.remove(*key)?;
            }
            (category.is_some(), keys)
        };
        txn.commit()?;

        if removed {
            tracing::debug!(id, "deleted category");
            self.emit(StoreEvent::CategoryRemoved(id));
        }
        for (document_id, _) in unlinked {
            self.emit(StoreEvent::LinksChanged { document_id });
        }
        Ok(removed)
    }

    // -- Links --

    /// Link a document to a category.
    ///
    /// Returns `false` if the pair was already linked.
    pub fn assign_category(
        &self,
        document_id: u64,
        category_id: u64,
    ) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let inserted = {
            if txn.open_table(DOCUMENTS)?.get(document_id)?.is_none() {
                return Err(Error::NotFound {
                    kind: "document",
                    name: document_id.to_string(),
                });
            }
            if txn.open_table(CATEGORIES)?.get(category_id)?.is_none() {
                return Err(Error::NotFound {
                    kind: "category",
                    name: category_id.to_string(),
                });
            }
            let mut links = txn.open_table(DOCUMENT_CATEGORIES)?;
            links.insert((document_id, category_id), ())?.is_none()
        };
        txn.commit()?;

        if inserted {
            self.emit(StoreEvent::LinksChanged { document_id });
        }
        Ok(inserted)
    }

    pub fn unassign_category(
        &self,
        document_id: u64,
        category_id: u64,
    ) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut links = txn.open_table(DOCUMENT_CATEGORIES)?;
            links.remove((document_id, category_id))?.is_some()
        };
        txn.commit()?;

        if removed {
            self.emit(StoreEvent::LinksChanged { document_id });
        }
        Ok(removed)
    }

    /// Categories linked to a document, in category insertion order.
    pub fn categories_of(&self, document_id: u64) -> Result<Vec<Category>> {
        let txn = self.db.begin_read()?;
        let links = txn.open_table(DOCUMENT_CATEGORIES)?;
        let table = txn.open_table(CATEGORIES)?;
        let mut result = Vec::new();
        for entry in links.range((document_id, 0)..=(document_id, u64::MAX))? {
            let (k, _) = entry?;
            let (_, category_id) = k.value();
            if let Some(v) = table.get(category_id)? {
                result.push(records::decode(v.value())?);
            }
        }
        Ok(result)
    }

    /// Documents linked to a category, in insertion order.
    pub fn documents_in(&self, category_id: u64) -> Result<Vec<Document>> {
        let txn = self.db.begin_read()?;
        let links = txn.open_table(DOCUMENT_CATEGORIES)?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in links.iter()? {
            let (k, _) = entry?;
            let (document_id, linked) = k.value();
            if linked != category_id {
                continue;
            }
            if let Some(v) = table.get(document_id)? {
                result.push(records::decode(v.value())?);
            }
        }
        Ok(result)
    }

    /// Documents without any category link.
    pub fn uncategorized_documents(&self) -> Result<Vec<Document>> {
        let txn = self.db.begin_read()?;
        let links = txn.open_table(DOCUMENT_CATEGORIES)?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let id = k.value();
            if links.range((id, 0)..=(id, u64::MAX))?.next().is_none() {
                result.push(records::decode(v.value())?);
            }
        }
        Ok(result)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }
}

fn next_id(
    counters: &mut redb::Table<'_, &'static str, u64>,
    name: &str,
) -> Result<u64> {
    let id = counters.get(name)?.map(|v| v.value()).unwrap_or(0) + 1;
    counters.insert(name, id)?;
    Ok(id)
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}
