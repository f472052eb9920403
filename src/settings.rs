use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    record_store::RecordStore,
};

/// Setting keys stored in the record store.
pub mod keys {
    pub const DOCUMENT_PATH: &str = "document_path";
    pub const DOCUMENT_LIMIT: &str = "search.document_limit";
    pub const CATEGORY_LIMIT: &str = "search.category_limit";
}

/// Largest per-type search limit that can be configured.
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// How many hits of each record type a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub documents: usize,
    pub categories: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            documents: 10,
            categories: 5,
        }
    }
}

/// Typed view over the persisted settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Where imported files are copied. `None` means the data directory's
    /// `documents/` folder.
    pub document_path: Option<PathBuf>,
    pub search: SearchLimits,
}

impl Settings {
    pub fn load(store: &RecordStore) -> Result<Self> {
        let defaults = SearchLimits::default();
        Ok(Self {
            document_path: store
                .get_setting(keys::DOCUMENT_PATH)?
                .map(PathBuf::from),
            search: SearchLimits {
                documents: parse_limit(
                    store,
                    keys::DOCUMENT_LIMIT,
                    defaults.documents,
                )?,
                categories: parse_limit(
                    store,
                    keys::CATEGORY_LIMIT,
                    defaults.categories,
                )?,
            },
        })
    }

    /// Point imports at `path`, creating the directory if needed.
    ///
    /// The stored value is the canonical absolute path.
    pub fn set_document_path(store: &RecordStore, path: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(path)
            .map_err(|_| Error::DataDir(path.to_path_buf()))?;
        let abs = path.canonicalize().map_err(|e| {
            Error::Config(format!("cannot resolve path {}: {e}", path.display()))
        })?;
        store.set_setting(keys::DOCUMENT_PATH, &abs.to_string_lossy())?;
        Ok(abs)
    }

    /// Persist the search limits. Limits above [`MAX_SEARCH_LIMIT`] are
    /// rejected.
    pub fn set_search_limits(store: &RecordStore, limits: SearchLimits) -> Result<()> {
        check_limit(keys::DOCUMENT_LIMIT, limits.documents)?;
        check_limit(keys::CATEGORY_LIMIT, limits.categories)?;
        store.set_setting(keys::DOCUMENT_LIMIT, &limits.documents.to_string())?;
        store.set_setting(keys::CATEGORY_LIMIT, &limits.categories.to_string())
    }
}

fn parse_limit(store: &RecordStore, key: &str, default: usize) -> Result<usize> {
    let raw = store.get_setting_or(key, &default.to_string())?;
    let limit = raw.trim().parse().map_err(|_| {
        Error::Config(format!("setting '{key}' is not a count: '{raw}'"))
    })?;
    check_limit(key, limit)
}

fn check_limit(key: &str, limit: usize) -> Result<usize> {
    if limit > MAX_SEARCH_LIMIT {
        return Err(Error::Config(format!(
            "setting '{key}' is {limit}, the maximum is {MAX_SEARCH_LIMIT}"
        )));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, RecordStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&tmp.path().join("store.redb")).unwrap();
        (tmp, store)
    }

    #[test]
    fn defaults_when_unset() {
        let (_tmp, store) = test_store();
        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.search.documents, 10);
        assert_eq!(settings.search.categories, 5);
    }

    #[test]
    fn limits_roundtrip_through_store() {
        let (_tmp, store) = test_store();
        let limits = SearchLimits {
            documents: 3,
            categories: 1,
        };
        Settings::set_search_limits(&store, limits).unwrap();
        assert_eq!(Settings::load(&store).unwrap().search, limits);
    }

    #[test]
    fn malformed_limit_is_config_error() {
        let (_tmp, store) = test_store();
        store.set_setting(keys::DOCUMENT_LIMIT, "lots").unwrap();
        assert!(matches!(Settings::load(&store), Err(Error::Config(_))));
    }

    #[test]
    fn oversized_limits_are_rejected() {
        let (_tmp, store) = test_store();
        let huge = SearchLimits {
            documents: usize::MAX,
            categories: 5,
        };
        assert!(matches!(
            Settings::set_search_limits(&store, huge),
            Err(Error::Config(_))
        ));
        assert_eq!(Settings::load(&store).unwrap().search, SearchLimits::default());

        let max = SearchLimits {
            documents: MAX_SEARCH_LIMIT,
            categories: 0,
        };
        Settings::set_search_limits(&store, max).unwrap();
        assert_eq!(Settings::load(&store).unwrap().search, max);

        store
            .set_setting(keys::CATEGORY_LIMIT, "18446744073709551615")
            .unwrap();
        assert!(matches!(Settings::load(&store), Err(Error::Config(_))));
    }

    #[test]
    fn document_path_is_created_and_stored() {
        let (tmp, store) = test_store();
        let target = tmp.path().join("papers");

        let stored = Settings::set_document_path(&store, &target).unwrap();
        assert!(target.is_dir());
        assert_eq!(stored, target.canonicalize().unwrap());
        assert_eq!(Settings::load(&store).unwrap().document_path, Some(stored));
    }
}
