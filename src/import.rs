use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    record_store::RecordStore,
    records::{Category, ContentType, Document, NewDocument},
    walker,
};

/// Caller-supplied metadata for an import.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Overrides the derived title. Only honoured for single-file imports.
    pub title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    /// Names of existing categories to link every imported document to.
    pub categories: Vec<String>,
}

/// Extract a title from text content.
///
/// Looks for the first markdown heading (line starting with `# `).
/// Falls back to the filename without extension.
fn extract_title(content: Option<&str>, file_path: &Path) -> String {
    for line in content.unwrap_or("").lines() {
        if let Some(heading) = line.trim().strip_prefix("# ") {
            let title = heading.trim();
            if !title.is_empty() {
                return title.to_string();
            }
        }
    }

    file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}

fn title_for(path: &Path, kind: ContentType) -> String {
    let content = match kind {
        ContentType::Text => std::fs::read_to_string(path).ok(),
        ContentType::Pdf | ContentType::Other => None,
    };
    extract_title(content.as_deref(), path)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Copy `source` into `documents_dir`, returning where it landed.
///
/// Files already inside the documents directory are left in place. A name
/// that is taken gets a numeric suffix: `paper.pdf`, `paper-1.pdf`, ...
pub fn copy_into(documents_dir: &Path, source: &Path) -> Result<PathBuf> {
    let source = source.canonicalize()?;
    let documents_dir = documents_dir.canonicalize()?;
    if source.starts_with(&documents_dir) {
        return Ok(source);
    }

    let file_name = source.file_name().ok_or_else(|| {
        Error::InvalidInput(format!("not a file: {}", source.display()))
    })?;
    let mut target = documents_dir.join(file_name);

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 1;
    while target.exists() {
        target = documents_dir.join(format!("{stem}-{n}{ext}"));
        n += 1;
    }

    std::fs::copy(&source, &target)?;
    Ok(target)
}

/// Resolve a file name inside the documents directory.
///
/// The file must exist and must not escape the directory (e.g. through
/// `..` components or symlinks).
pub fn resolve_file(documents_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let candidate = documents_dir.join(file_name);
    if !candidate.exists() {
        return Err(Error::NotFound {
            kind: "file",
            name: file_name.to_string(),
        });
    }

    let resolved = candidate.canonicalize()?;
    if !resolved.starts_with(documents_dir.canonicalize()?) {
        return Err(Error::InvalidInput(format!(
            "{file_name} is outside the documents directory"
        )));
    }
    Ok(resolved)
}

fn resolve_categories(store: &RecordStore, names: &[String]) -> Result<Vec<Category>> {
    names
        .iter()
        .map(|name| {
            store.find_category(name)?.ok_or_else(|| Error::NotFound {
                kind: "category",
                name: name.clone(),
            })
        })
        .collect()
}

/// Record a file already placed in the documents directory and link it to
/// `categories`. A document whose links cannot be written is removed again.
fn record_file(
    store: &RecordStore,
    new: NewDocument,
    categories: &[Category],
) -> Result<Document> {
    let document = store.add_document(new)?;
    for category in categories {
        if let Err(e) = store.assign_category(document.id, category.id) {
            if let Err(cleanup) = store.delete_document(document.id) {
                tracing::warn!(id = document.id, error = %cleanup, "failed to roll back document");
            }
            return Err(e);
        }
    }
    Ok(document)
}

/// Import a file, or every supported file below a directory.
///
/// Each file is copied into `documents_dir`, recorded in the store and
/// linked to the requested categories. Categories are checked before
/// anything is copied. If a file fails, its copy is removed and the error
/// returned; files imported earlier in the same batch stay imported.
pub fn import_path(
    store: &RecordStore,
    documents_dir: &Path,
    path: &Path,
    options: &ImportOptions,
) -> Result<Vec<Document>> {
    let categories = resolve_categories(store, &options.categories)?;

    let (files, single) = if path.is_dir() {
        let found = walker::discover_files(path)?;
        let files: Vec<PathBuf> =
            found.into_iter().map(|f| f.absolute_path).collect();
        (files, false)
    } else if path.is_file() {
        (vec![path.to_path_buf()], true)
    } else {
        return Err(Error::NotFound {
            kind: "file",
            name: path.display().to_string(),
        });
    };

    // Read titles in parallel, then write sequentially so ids follow path
    // order.
    let prepared: Vec<(PathBuf, ContentType, String)> = files
        .into_par_iter()
        .map(|file| {
            let kind = ContentType::from_path(&file);
            let title = match (&options.title, single) {
                (Some(title), true) => title.clone(),
                _ => title_for(&file, kind),
            };
            (file, kind, title)
        })
        .collect();

    let documents_root = documents_dir.canonicalize()?;
    let imported_at = now_secs();
    let mut imported = Vec::with_capacity(prepared.len());
    for (file, kind, title) in prepared {
        let in_place = file.canonicalize()?.starts_with(&documents_root);
        let stored = copy_into(documents_dir, &file)?;
        let new = NewDocument {
            title,
            author: options.author.clone(),
            kind,
            file_path: stored.to_string_lossy().into_owned(),
            summary: options.summary.clone(),
            imported_at,
        };
        let document = match record_file(store, new, &categories) {
            Ok(document) => document,
            Err(e) => {
                if !in_place
                    && let Err(cleanup) = std::fs::remove_file(&stored)
                {
                    tracing::warn!(path = %stored.display(), error = %cleanup, "failed to remove copied file");
                }
                return Err(e);
            }
        };
        tracing::info!(id = document.id, title = %document.title, "imported");
        imported.push(document);
    }

    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tmp: tempfile::TempDir,
        store: RecordStore,
        docs_dir: PathBuf,
        source_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&tmp.path().join("store.redb")).unwrap();
        let docs_dir = tmp.path().join("documents");
        let source_dir = tmp.path().join("inbox");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::create_dir_all(&source_dir).unwrap();
        Fixture {
            tmp,
            store,
            docs_dir,
            source_dir,
        }
    }

    #[test]
    fn extract_title_from_heading() {
        let content = "# My Document\n\nSome body text.";
        assert_eq!(extract_title(Some(content), Path::new("file.md")), "My Document");
    }

    #[test]
    fn extract_title_skips_empty_heading() {
        let content = "# \n\nSome text with no real heading.";
        assert_eq!(extract_title(Some(content), Path::new("notes.md")), "notes");
    }

    #[test]
    fn extract_title_fallback_to_filename() {
        assert_eq!(extract_title(None, Path::new("paper-2023.pdf")), "paper-2023");
    }

    #[test]
    fn import_single_file_with_metadata() {
        let f = fixture();
        let source = f.source_dir.join("qc.pdf");
        std::fs::write(&source, "%PDF-1.7").unwrap();
        f.store.add_category("Physics").unwrap();

        let options = ImportOptions {
            title: Some("Quantum Computing".into()),
            author: Some("Prof. John Doe".into()),
            summary: None,
            categories: vec!["Physics".into()],
        };
        let docs = import_path(&f.store, &f.docs_dir, &source, &options).unwrap();

        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.title, "Quantum Computing");
        assert_eq!(doc.kind, ContentType::Pdf);
        assert!(doc.imported_at > 0);
        assert!(Path::new(&doc.file_path).starts_with(f.docs_dir.canonicalize().unwrap()));
        assert!(source.exists(), "source is copied, not moved");
        assert_eq!(f.store.categories_of(doc.id).unwrap()[0].name, "Physics");
    }

    #[test]
    fn import_directory_uses_headings() {
        let f = fixture();
        std::fs::write(f.source_dir.join("a.md"), "# Alpha Notes\nbody").unwrap();
        std::fs::write(f.source_dir.join("b.txt"), "no heading").unwrap();
        std::fs::write(f.source_dir.join("c.png"), "skip").unwrap();

        let options = ImportOptions {
            title: Some("ignored for directories".into()),
            ..ImportOptions::default()
        };
        let docs = import_path(&f.store, &f.docs_dir, &f.source_dir, &options).unwrap();

        let titles: Vec<_> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha Notes", "b"]);
        assert!(docs.iter().all(|d| d.kind == ContentType::Text));
        assert_eq!(f.store.list_documents().unwrap().len(), 2);
    }

    #[test]
    fn unknown_category_aborts_before_copying() {
        let f = fixture();
        let source = f.source_dir.join("x.md");
        std::fs::write(&source, "x").unwrap();

        let options = ImportOptions {
            categories: vec!["Nope".into()],
            ..ImportOptions::default()
        };
        let err = import_path(&f.store, &f.docs_dir, &source, &options).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "category", .. }));
        assert_eq!(std::fs::read_dir(&f.docs_dir).unwrap().count(), 0);
        assert!(f.store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn failed_import_removes_the_copy() {
        let f = fixture();
        let source = f.source_dir.join("blank.md");
        std::fs::write(&source, "# Heading").unwrap();

        let options = ImportOptions {
            title: Some("   ".into()),
            ..ImportOptions::default()
        };
        let err = import_path(&f.store, &f.docs_dir, &source, &options).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(std::fs::read_dir(&f.docs_dir).unwrap().count(), 0);
        assert!(source.exists());
        assert!(f.store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn failed_import_keeps_files_already_in_place() {
        let f = fixture();
        let placed = f.docs_dir.join("placed.md");
        std::fs::write(&placed, "x").unwrap();

        let options = ImportOptions {
            title: Some(String::new()),
            ..ImportOptions::default()
        };
        assert!(import_path(&f.store, &f.docs_dir, &placed, &options).is_err());
        assert!(placed.exists());
    }

    #[test]
    fn missing_path_is_not_found() {
        let f = fixture();
        let err = import_path(
            &f.store,
            &f.docs_dir,
            &f.tmp.path().join("missing.pdf"),
            &ImportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "file", .. }));
    }

    #[test]
    fn copy_into_avoids_collisions() {
        let f = fixture();
        let source = f.source_dir.join("paper.pdf");
        std::fs::write(&source, "one").unwrap();

        let first = copy_into(&f.docs_dir, &source).unwrap();
        let second = copy_into(&f.docs_dir, &source).unwrap();
        assert_eq!(first.file_name().unwrap(), "paper.pdf");
        assert_eq!(second.file_name().unwrap(), "paper-1.pdf");

        // Already inside the documents directory: kept as is.
        assert_eq!(copy_into(&f.docs_dir, &first).unwrap(), first);
    }

    #[test]
    fn resolve_file_stays_inside_documents_dir() {
        let f = fixture();
        std::fs::write(f.docs_dir.join("ok.md"), "ok").unwrap();
        std::fs::write(f.source_dir.join("secret.md"), "no").unwrap();

        assert!(resolve_file(&f.docs_dir, "ok.md").is_ok());
        assert!(matches!(
            resolve_file(&f.docs_dir, "gone.md"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            resolve_file(&f.docs_dir, "../inbox/secret.md"),
            Err(Error::InvalidInput(_))
        ));
    }
}
