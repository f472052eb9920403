use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use docshelf::{
    DataDir,
    RecordStore,
    SearchService,
    SearchSession,
    Settings,
    cli::{
        self,
        CategoryAction,
        Cli,
        Command,
        DocumentAction,
        SettingsAction,
    },
    error::{self, Error},
    import::{self, ImportOptions},
    records::{Category, Document},
    search,
    session::QueryOutcome,
    settings::SearchLimits,
    text_util,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSHELF_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let store = Arc::new(RecordStore::open(&data_dir.store_db())?);

    match cli.command {
        Command::Document { action } => match action {
            DocumentAction::Add(args) => {
                document_add(&store, &data_dir, &args)?;
            }
            DocumentAction::List(args) => {
                document_list(&store, &args)?;
            }
            DocumentAction::Show { id, json } => {
                document_show(&store, &data_dir, id, json)?;
            }
            DocumentAction::Remove { id } => {
                document_remove(&store, id)?;
            }
        },
        Command::Category { action } => match action {
            CategoryAction::Add { name } => {
                let category = store.add_category(&name)?;
                println!("Added category '{}' (#{})", category.name, category.id);
            }
            CategoryAction::Remove { name } => {
                let category = find_category(&store, &name)?;
                store.delete_category(category.id)?;
                println!("Removed category '{}'", category.name);
            }
            CategoryAction::List { json } => {
                category_list(&store, json)?;
            }
            CategoryAction::Assign {
                document_id,
                category,
            } => {
                let category = find_category(&store, &category)?;
                if store.assign_category(document_id, category.id)? {
                    println!("Filed #{document_id} under '{}'", category.name);
                } else {
                    println!("#{document_id} is already in '{}'", category.name);
                }
            }
            CategoryAction::Unassign {
                document_id,
                category,
            } => {
                let category = find_category(&store, &category)?;
                if !store.unassign_category(document_id, category.id)? {
                    return Err(Error::NotFound {
                        kind: "link",
                        name: format!("#{document_id} -> {}", category.name),
                    });
                }
                println!("Took #{document_id} out of '{}'", category.name);
            }
        },
        Command::Search(args) => {
            cmd_search(store, &args).await?;
        }
        Command::Settings { action } => match action {
            SettingsAction::DocumentPath { path } => {
                settings_document_path(&store, &data_dir, path.as_deref())?;
            }
            SettingsAction::SearchLimits {
                documents,
                categories,
            } => {
                settings_search_limits(
                    &store,
                    documents.map(usize::from),
                    categories.map(usize::from),
                )?;
            }
        },
        Command::Status(args) => {
            cmd_status(&store, &data_dir, args.json)?;
        }
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn find_category(store: &RecordStore, name: &str) -> error::Result<Category> {
    store.find_category(name)?.ok_or_else(|| Error::NotFound {
        kind: "category",
        name: name.to_string(),
    })
}

fn documents_dir(store: &RecordStore, data_dir: &DataDir) -> error::Result<PathBuf> {
    let settings = Settings::load(store)?;
    data_dir.documents_dir(settings.document_path.as_deref())
}

fn document_add(
    store: &RecordStore,
    data_dir: &DataDir,
    args: &cli::AddArgs,
) -> error::Result<()> {
    let documents_dir = documents_dir(store, data_dir)?;
    let options = ImportOptions {
        title: args.title.clone(),
        author: args.author.clone(),
        summary: args.summary.clone(),
        categories: args.categories.clone(),
    };

    let imported = import::import_path(store, &documents_dir, &args.path, &options)?;
    if imported.is_empty() {
        eprintln!("No supported files found in {}", args.path.display());
        return Ok(());
    }
    for doc in &imported {
        println!("Added #{} {} ({})", doc.id, doc.title, doc.kind);
    }
    if imported.len() > 1 {
        println!("\n{} document(s) imported", imported.len());
    }
    Ok(())
}

fn file_name(doc: &Document) -> &str {
    Path::new(&doc.file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&doc.file_path)
}

fn document_list(store: &RecordStore, args: &cli::ListArgs) -> error::Result<()> {
    let mut documents = if let Some(ref name) = args.category {
        store.documents_in(find_category(store, name)?.id)?
    } else if args.uncategorized {
        store.uncategorized_documents()?
    } else {
        store.list_documents()?
    };

    if let Some(ref pattern) = args.pattern {
        let glob = globset::Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid glob pattern: {e}")))?
            .compile_matcher();
        documents.retain(|doc| glob.is_match(file_name(doc)));
    }

    if args.json {
        println!("{}", serde_json::to_string(&documents)?);
    } else if documents.is_empty() {
        println!("No documents found.");
    } else {
        for doc in &documents {
            println!("#{}\t{}\t{}", doc.id, doc.title, doc.kind);
            if let Some(ref summary) = doc.summary {
                println!("\t{}", text_util::preview(summary));
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct DocumentView<'a> {
    #[serde(flatten)]
    document: &'a Document,
    categories: &'a [Category],
    route: String,
    /// Resolved location inside the documents directory, if the file is
    /// still there.
    file: Option<PathBuf>,
}

fn document_show(
    store: &RecordStore,
    data_dir: &DataDir,
    id: u64,
    json: bool,
) -> error::Result<()> {
    let document = store.get_document(id)?.ok_or_else(|| Error::NotFound {
        kind: "document",
        name: id.to_string(),
    })?;
    let categories = store.categories_of(id)?;
    let documents_dir = documents_dir(store, data_dir)?;
    let file = match import::resolve_file(&documents_dir, file_name(&document)) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!(error = %e, "document file not resolved");
            None
        }
    };

    let view = DocumentView {
        document: &document,
        categories: &categories,
        route: text_util::document_route(&document, &categories),
        file,
    };

    if json {
        println!("{}", serde_json::to_string(&view)?);
        return Ok(());
    }

    println!("id: {}", document.id);
    println!("title: {}", document.title);
    if let Some(ref author) = document.author {
        println!("author: {author}");
    }
    println!("type: {}", document.kind);
    if let Some(ref summary) = document.summary {
        println!("summary: {summary}");
    }
    println!("imported: {}", document.imported_at);
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    if names.is_empty() {
        println!("categories: (none)");
    } else {
        println!("categories: {}", names.join(", "));
    }
    println!("route: {}", view.route);
    match view.file {
        Some(ref path) => println!("file: {}", path.display()),
        None => println!("file: {} (missing)", document.file_path),
    }
    Ok(())
}

fn document_remove(store: &RecordStore, id: u64) -> error::Result<()> {
    if !store.delete_document(id)? {
        return Err(Error::NotFound {
            kind: "document",
            name: id.to_string(),
        });
    }
    println!("Removed document #{id}");
    Ok(())
}

fn category_list(store: &RecordStore, json: bool) -> error::Result<()> {
    let categories = store.list_categories()?;

    if json {
        println!("{}", serde_json::to_string(&categories)?);
    } else if categories.is_empty() {
        println!("No categories defined.");
    } else {
        for category in &categories {
            let count = store.documents_in(category.id)?.len();
            println!("#{}\t{}\t{count} document(s)", category.id, category.name);
        }
    }
    Ok(())
}

async fn cmd_search(
    store: Arc<RecordStore>,
    args: &cli::SearchArgs,
) -> error::Result<()> {
    let settings = Settings::load(&store)?;
    let service = Arc::new(SearchService::new(settings.search)?);
    let session = SearchSession::new(service, store);

    // A failed rebuild leaves the index empty; searching still answers
    // (with nothing).
    if let Err(e) = session.initialize().await {
        eprintln!("Warning: search index unavailable: {e}");
    }

    if session.search(&args.query).await == QueryOutcome::Failed
        && let Some(message) = session.error()
    {
        eprintln!("Error: {message}");
    }

    let results = session.results();
    if args.json {
        search::format_json(&results, &args.query)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}

fn settings_document_path(
    store: &RecordStore,
    data_dir: &DataDir,
    path: Option<&Path>,
) -> error::Result<()> {
    match path {
        Some(path) => {
            let abs = Settings::set_document_path(store, path)?;
            println!("Documents directory set to {}", abs.display());
        }
        None => {
            let settings = Settings::load(store)?;
            match settings.document_path {
                Some(path) => println!("{}", path.display()),
                None => println!(
                    "{} (default)",
                    data_dir.root().join("documents").display()
                ),
            }
        }
    }
    Ok(())
}

fn settings_search_limits(
    store: &RecordStore,
    documents: Option<usize>,
    categories: Option<usize>,
) -> error::Result<()> {
    let current = Settings::load(store)?.search;
    if documents.is_none() && categories.is_none() {
        println!("documents: {}", current.documents);
        println!("categories: {}", current.categories);
        return Ok(());
    }

    let limits = SearchLimits {
        documents: documents.unwrap_or(current.documents),
        categories: categories.unwrap_or(current.categories),
    };
    Settings::set_search_limits(store, limits)?;
    println!(
        "Search returns up to {} document(s) and {} category hit(s)",
        limits.documents, limits.categories
    );
    Ok(())
}

#[derive(Serialize)]
struct Status {
    data_dir: PathBuf,
    documents_dir: PathBuf,
    documents: usize,
    uncategorized: usize,
    categories: usize,
    document_limit: usize,
    category_limit: usize,
}

fn cmd_status(store: &RecordStore, data_dir: &DataDir, json: bool) -> error::Result<()> {
    let settings = Settings::load(store)?;
    let status = Status {
        data_dir: data_dir.root().to_path_buf(),
        documents_dir: data_dir.documents_dir(settings.document_path.as_deref())?,
        documents: store.list_documents()?.len(),
        uncategorized: store.uncategorized_documents()?.len(),
        categories: store.list_categories()?.len(),
        document_limit: settings.search.documents,
        category_limit: settings.search.categories,
    };

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!("Data directory: {}", status.data_dir.display());
        println!("Documents directory: {}", status.documents_dir.display());
        println!(
            "Documents: {} ({} uncategorized)",
            status.documents, status.uncategorized
        );
        println!("Categories: {}", status.categories);
        println!(
            "Search limits: {} document(s), {} category hit(s)",
            status.document_limit, status.category_limit
        );
    }
    Ok(())
}
