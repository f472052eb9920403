use std::{
    cmp::Reverse,
    marker::PhantomData,
    sync::{Mutex, PoisonError},
};

use serde::{Serialize, de::DeserializeOwned};
use tantivy::{
    DocId,
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Score,
    SegmentReader,
    TantivyDocument,
    Term,
    collector::TopDocs,
    query::{BooleanQuery, BoostQuery, Occur, Query, TermQuery},
    schema::*,
};

use crate::{
    error::Result,
    records::{self, Category, Document},
    tokenizer::{FORWARD, ForwardTokenizer},
};

/// Field names shared by every record index.
pub mod fields {
    pub const ID: &str = "id";
    pub const RECORD: &str = "record";
}

const WRITER_MEMORY_BUDGET: usize = 20_000_000;

/// A record type that can live in a [`RecordIndex`].
pub trait IndexedRecord:
    Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Searchable text fields with their score boost.
    const TEXT_FIELDS: &'static [(&'static str, Score)];

    fn id(&self) -> u64;

    /// Text for one of [`Self::TEXT_FIELDS`], if the record has any.
    fn text(&self, field: &str) -> Option<&str>;
}

impl IndexedRecord for Document {
    const TEXT_FIELDS: &'static [(&'static str, Score)] = &[
        ("title", 2.0),
        ("author", 1.0),
        ("summary", 1.0),
        ("kind", 1.0),
    ];

    fn id(&self) -> u64 {
        self.id
    }

    fn text(&self, field: &str) -> Option<&str> {
        match field {
            "title" => Some(&self.title),
            "author" => self.author.as_deref(),
            "summary" => self.summary.as_deref(),
            "kind" => Some(self.kind.as_str()),
            _ => None,
        }
    }
}

impl IndexedRecord for Category {
    const TEXT_FIELDS: &'static [(&'static str, Score)] = &[("name", 1.0)];

    fn id(&self) -> u64 {
        self.id
    }

    fn text(&self, field: &str) -> Option<&str> {
        (field == "name").then_some(self.name.as_str())
    }
}

/// An in-memory full-text index over one record type.
///
/// Records are keyed by id: adding a record whose id is already present
/// replaces it. The serialized record is stored alongside, so hits come
/// back as whole records without a second lookup.
pub struct RecordIndex<R> {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id: Field,
    record: Field,
    text_fields: Vec<(Field, &'static str, Score)>,
    _record: PhantomData<fn() -> R>,
}

fn build_schema<R: IndexedRecord>() -> Schema {
    let mut builder = Schema::builder();
    builder.add_u64_field(fields::ID, INDEXED | STORED | FAST);
    builder.add_text_field(fields::RECORD, STORED);

    let text_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(FORWARD)
            .set_index_option(IndexRecordOption::WithFreqs),
    );
    for (name, _) in R::TEXT_FIELDS {
        builder.add_text_field(name, text_opts.clone());
    }

    builder.build()
}

impl<R: IndexedRecord> RecordIndex<R> {
    pub fn open_in_ram() -> Result<Self> {
        let schema = build_schema::<R>();
        let index = Index::create_in_ram(schema.clone());
        index.tokenizers().register(FORWARD, ForwardTokenizer);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET)?;

        let id = schema.get_field(fields::ID)?;
        let record = schema.get_field(fields::RECORD)?;
        let mut text_fields = Vec::with_capacity(R::TEXT_FIELDS.len());
        for &(name, boost) in R::TEXT_FIELDS {
            text_fields.push((schema.get_field(name)?, name, boost));
        }

        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            id,
            record,
            text_fields,
            _record: PhantomData,
        })
    }

    fn to_document(&self, record: &R) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::default();
        doc.add_u64(self.id, record.id());
        doc.add_text(self.record, serde_json::to_string(record)?);
        for &(field, name, _) in &self.text_fields {
            if let Some(text) = record.text(name) {
                doc.add_text(field, text);
            }
        }
        Ok(doc)
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Add a record, replacing any record with the same id.
    pub fn upsert(&self, record: &R) -> Result<()> {
        let doc = self.to_document(record)?;
        let mut writer =
            self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.delete_term(Term::from_field_u64(self.id, record.id()));
        writer.add_document(doc)?;
        self.commit(&mut writer)
    }

    /// Remove the record with this id. Unknown ids are ignored.
    pub fn remove(&self, id: u64) -> Result<()> {
        let mut writer =
            self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.delete_term(Term::from_field_u64(self.id, id));
        self.commit(&mut writer)
    }

    /// Drop everything and index exactly `records`, in one commit.
    pub fn replace_all(&self, records: &[R]) -> Result<usize> {
        let docs = records
            .iter()
            .map(|r| self.to_document(r))
            .collect::<Result<Vec<_>>>()?;

        let mut writer =
            self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.delete_all_documents()?;
        for doc in docs {
            writer.add_document(doc)?;
        }
        self.commit(&mut writer)?;
        Ok(records.len())
    }

    /// Number of records currently searchable.
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build_query(&self, terms: &[String]) -> BooleanQuery {
        let clauses = terms
            .iter()
            .map(|term| {
                let per_field: Vec<(Occur, Box<dyn Query>)> = self
                    .text_fields
                    .iter()
                    .map(|&(field, _, boost)| {
                        let query = TermQuery::new(
                            Term::from_field_text(field, term),
                            IndexRecordOption::WithFreqs,
                        );
                        let query: Box<dyn Query> = if boost == 1.0 {
                            Box::new(query)
                        } else {
                            Box::new(BoostQuery::new(Box::new(query), boost))
                        };
                        (Occur::Should, query)
                    })
                    .collect();
                let any_field: Box<dyn Query> =
                    Box::new(BooleanQuery::new(per_field));
                (Occur::Must, any_field)
            })
            .collect();
        BooleanQuery::new(clauses)
    }

    /// Return up to `limit` records matching every term, best first.
    ///
    /// `terms` must already be normalized (see
    /// [`query_terms`](crate::tokenizer::query_terms)). Equal scores keep
    /// id order, which is the store's insertion order.
    pub fn search(&self, terms: &[String], limit: usize) -> Result<Vec<(Score, R)>> {
        let searcher = self.reader.searcher();
        // Never ask for more hits than there are records.
        let limit = limit.min(searcher.num_docs() as usize);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query = self.build_query(terms);
        let collector = TopDocs::with_limit(limit).tweak_score(
            move |segment: &SegmentReader| {
                let ids = segment.fast_fields().u64(fields::ID).ok();
                move |doc: DocId, score: Score| {
                    let id = ids
                        .as_ref()
                        .and_then(|column| column.first(doc))
                        .unwrap_or(u64::MAX);
                    (score, Reverse(id))
                }
            },
        );
        let top_docs = searcher.search(&query, &collector)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for ((score, _), address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let json = doc
                .get_first(self.record)
                .and_then(|v| v.as_str())
                .unwrap_or("");
            results.push((score, records::decode(json.as_bytes())?));
        }
        Ok(results)
    }
}

impl<R> std::fmt::Debug for RecordIndex<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIndex").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        records::{ContentType, NewDocument},
        tokenizer::query_terms,
    };

    fn doc(id: u64, title: &str) -> Document {
        NewDocument::new(title, ContentType::Pdf).with_id(id)
    }

    fn ids<R: IndexedRecord>(hits: &[(Score, R)]) -> Vec<u64> {
        hits.iter().map(|(_, r)| r.id()).collect()
    }

    #[test]
    fn create_and_search() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        idx.upsert(&doc(1, "Quantum Computing")).unwrap();
        idx.upsert(&doc(2, "Rust Programming")).unwrap();

        let hits = idx.search(&query_terms("quantum"), 10).unwrap();
        assert_eq!(ids(&hits), vec![1]);
        assert_eq!(hits[0].1.title, "Quantum Computing");
        assert!(hits[0].0 > 0.0);
    }

    #[test]
    fn prefixes_match() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        idx.upsert(&doc(1, "Quantum Computing")).unwrap();

        assert_eq!(ids(&idx.search(&query_terms("quan comp"), 10).unwrap()), vec![1]);
        // Prefix only, never infix.
        assert!(idx.search(&query_terms("uantum"), 10).unwrap().is_empty());
    }

    #[test]
    fn every_term_must_match() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        idx.upsert(&doc(1, "Quantum Computing")).unwrap();
        idx.upsert(&doc(2, "Quantum Field Theory")).unwrap();

        let hits = idx.search(&query_terms("quantum field"), 10).unwrap();
        assert_eq!(ids(&hits), vec![2]);
    }

    #[test]
    fn terms_match_across_fields() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        let mut d = doc(1, "Nanotechnology in Medicine");
        d.author = Some("Dr. Sarah Johnson".into());
        d.summary = Some("drug delivery".into());
        idx.upsert(&d).unwrap();

        assert_eq!(ids(&idx.search(&query_terms("johnson drug"), 10).unwrap()), vec![1]);
        assert_eq!(ids(&idx.search(&query_terms("pdf"), 10).unwrap()), vec![1]);
    }

    #[test]
    fn upsert_replaces() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        idx.upsert(&doc(1, "Old Title")).unwrap();
        idx.upsert(&doc(1, "New Title")).unwrap();

        assert_eq!(idx.len(), 1);
        assert!(idx.search(&query_terms("old"), 10).unwrap().is_empty());
        let hits = idx.search(&query_terms("title"), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.title, "New Title");
    }

    #[test]
    fn remove_unknown_is_noop() {
        let idx = RecordIndex::<Category>::open_in_ram().unwrap();
        idx.upsert(&Category { id: 1, name: "Calculus".into() }).unwrap();
        idx.remove(42).unwrap();
        assert_eq!(idx.len(), 1);
        idx.remove(1).unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn replace_all_drops_previous_records() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        idx.upsert(&doc(1, "Stale")).unwrap();

        let count = idx
            .replace_all(&[doc(2, "Fresh One"), doc(3, "Fresh Two")])
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(idx.len(), 2);
        assert!(idx.search(&query_terms("stale"), 10).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_id_order() {
        let idx = RecordIndex::<Category>::open_in_ram().unwrap();
        // Insert out of id order; identical names score identically.
        for id in [3, 1, 2] {
            idx.upsert(&Category { id, name: "Notes".into() }).unwrap();
        }
        let hits = idx.search(&query_terms("notes"), 10).unwrap();
        assert_eq!(ids(&hits), vec![1, 2, 3]);
    }

    #[test]
    fn limit_caps_results() {
        let idx = RecordIndex::<Category>::open_in_ram().unwrap();
        for id in 1..=8 {
            idx.upsert(&Category { id, name: format!("Topic {id}") }).unwrap();
        }
        let hits = idx.search(&query_terms("topic"), 5).unwrap();
        assert_eq!(ids(&hits), vec![1, 2, 3, 4, 5]);
        assert!(idx.search(&query_terms("topic"), 0).unwrap().is_empty());
    }

    #[test]
    fn huge_limit_is_capped_by_record_count() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        assert!(idx.search(&query_terms("quantum"), usize::MAX).unwrap().is_empty());

        idx.upsert(&doc(1, "Quantum Computing")).unwrap();
        idx.upsert(&doc(2, "Quantum Optics")).unwrap();
        let hits = idx.search(&query_terms("quantum"), usize::MAX).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn title_boost() {
        let idx = RecordIndex::<Document>::open_in_ram().unwrap();
        let mut in_summary = doc(1, "Language Guide");
        in_summary.summary = Some("rust everywhere".into());
        idx.upsert(&in_summary).unwrap();
        idx.upsert(&doc(2, "Rust Guide")).unwrap();

        let hits = idx.search(&query_terms("rust"), 10).unwrap();
        assert_eq!(ids(&hits), vec![2, 1]);
    }
}
