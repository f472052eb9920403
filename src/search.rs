use serde::Serialize;

use crate::{
    error::Result,
    record_index::RecordIndex,
    record_store::{RecordStore, StoreObserver},
    records::{Category, Document, StoreEvent},
    settings::SearchLimits,
    text_util,
    tokenizer,
};

/// What a search hit points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "item", rename_all = "lowercase")]
pub enum Hit {
    Document(Document),
    Category(Category),
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub hit: Hit,
    pub score: Option<f32>,
}

impl SearchResult {
    pub fn id(&self) -> u64 {
        match &self.hit {
            Hit::Document(d) => d.id,
            Hit::Category(c) => c.id,
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self.hit, Hit::Document(_))
    }

    pub fn is_category(&self) -> bool {
        matches!(self.hit, Hit::Category(_))
    }

    /// Title of a document, name of a category.
    pub fn label(&self) -> &str {
        match &self.hit {
            Hit::Document(d) => &d.title,
            Hit::Category(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IndexStats {
    pub documents: u64,
    pub categories: u64,
}

/// Full-text search over the documents and categories of a
/// [`RecordStore`].
///
/// The indices live in memory. They are filled by [`rebuild_all`] and kept
/// current by subscribing the service to the store. Index updates are not
/// part of the store's transaction: if one fails, the index stays stale
/// for that record until the next rebuild.
///
/// [`rebuild_all`]: SearchService::rebuild_all
#[derive(Debug)]
pub struct SearchService {
    documents: RecordIndex<Document>,
    categories: RecordIndex<Category>,
    limits: SearchLimits,
}

impl SearchService {
    pub fn new(limits: SearchLimits) -> Result<Self> {
        Ok(Self {
            documents: RecordIndex::open_in_ram()?,
            categories: RecordIndex::open_in_ram()?,
            limits,
        })
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Clear both indices and re-index every record in `store`.
    pub fn rebuild_all(&self, store: &RecordStore) -> Result<IndexStats> {
        let documents = store.list_documents()?;
        let categories = store.list_categories()?;

        let (documents, categories) = rayon::join(
            || self.documents.replace_all(&documents),
            || self.categories.replace_all(&categories),
        );
        let stats = IndexStats {
            documents: documents? as u64,
            categories: categories? as u64,
        };

        tracing::info!(
            documents = stats.documents,
            categories = stats.categories,
            "rebuilt search index"
        );
        Ok(stats)
    }

    pub fn index_document(&self, document: &Document) -> Result<()> {
        self.documents.upsert(document)
    }

    pub fn remove_document(&self, id: u64) -> Result<()> {
        self.documents.remove(id)
    }

    pub fn index_category(&self, category: &Category) -> Result<()> {
        self.categories.upsert(category)
    }

    pub fn remove_category(&self, id: u64) -> Result<()> {
        self.categories.remove(id)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents.len(),
            categories: self.categories.len(),
        }
    }

    /// Search documents and categories.
    ///
    /// A blank query (or one without any word characters) yields no
    /// results. Otherwise both indices are searched in parallel, each
    /// capped by its limit, and the hits are merged by descending score.
    /// Equal scores keep insertion order, documents before categories.
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let terms = tokenizer::query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let (documents, categories) = rayon::join(
            || self.documents.search(&terms, self.limits.documents),
            || self.categories.search(&terms, self.limits.categories),
        );

        let mut results: Vec<SearchResult> = documents?
            .into_iter()
            .map(|(score, d)| SearchResult {
                hit: Hit::Document(d),
                score: Some(score),
            })
            .chain(categories?.into_iter().map(|(score, c)| SearchResult {
                hit: Hit::Category(c),
                score: Some(score),
            }))
            .collect();

        // Stable sort: ties keep the order built above.
        results.sort_by(|a, b| {
            let a = a.score.unwrap_or(0.0);
            let b = b.score.unwrap_or(0.0);
            b.total_cmp(&a)
        });

        tracing::debug!(query, hits = results.len(), "search");
        Ok(results)
    }
}

impl StoreObserver for SearchService {
    fn on_event(&self, event: &StoreEvent) {
        let outcome = match event {
            StoreEvent::DocumentUpserted(d) => self.index_document(d),
            StoreEvent::DocumentRemoved(id) => self.remove_document(*id),
            StoreEvent::CategoryUpserted(c) => self.index_category(c),
            StoreEvent::CategoryRemoved(id) => self.remove_category(*id),
            StoreEvent::LinksChanged { .. } => Ok(()),
        };
        if let Err(e) = outcome {
            tracing::warn!(
                ?event,
                error = %e,
                "search index update failed, results stay stale until the next rebuild"
            );
        }
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, r) in results.iter().enumerate() {
        let score = r.score.unwrap_or(0.0);
        match &r.hit {
            Hit::Document(d) => {
                println!(
                    "{:>3}. [{score:.3}] document #{} {} ({})",
                    i + 1,
                    d.id,
                    d.title,
                    d.kind
                );
                if let Some(summary) = d.summary.as_deref() {
                    println!("     {}", text_util::preview(summary));
                }
            }
            Hit::Category(c) => {
                println!("{:>3}. [{score:.3}] category #{} {}", i + 1, c.id, c.name);
            }
        }
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Serialize)]
struct SearchResponse<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [SearchResult],
}

/// Format results as JSON output.
pub fn format_json(results: &[SearchResult], query: &str) -> Result<()> {
    let response = SearchResponse {
        query,
        result_count: results.len(),
        results,
    };
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
