//! docshelf - a local shelf for research documents.
//!
//! Documents and categories live in a [redb](https://github.com/cberner/redb)
//! database. A [`SearchService`] keeps in-memory
//! [Tantivy](https://github.com/quickwit-oss/tantivy) indices of both in sync
//! with the store and answers prefix ("search as you type") queries.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docshelf::{DataDir, RecordStore, SearchService, Settings};
//! use docshelf::records::{ContentType, NewDocument};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let store = RecordStore::open(&data_dir.store_db()).unwrap();
//! let settings = Settings::load(&store).unwrap();
//!
//! let service = Arc::new(SearchService::new(settings.search).unwrap());
//! store.subscribe(service.clone());
//! service.rebuild_all(&store).unwrap();
//!
//! store
//!     .add_document(NewDocument::new("Quantum Computing", ContentType::Pdf))
//!     .unwrap();
//! for r in service.search("quant").unwrap() {
//!     println!("{} ({:?})", r.label(), r.score);
//! }
//! ```

pub mod cli;
pub mod data_dir;
pub mod error;
pub mod import;
pub mod record_index;
pub mod record_store;
pub mod records;
pub mod search;
pub mod session;
pub mod settings;
pub mod text_util;
pub mod tokenizer;
pub mod walker;

pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use record_store::{RecordStore, StoreObserver};
pub use search::SearchService;
pub use session::SearchSession;
pub use settings::Settings;
