//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use shelf_client::{ClientConfig, RefreshOutcome, ShelfClient};
use shelf_core::{BookFormat, BookQuery};
use shelf_reader::{EpubEngine, EpubViewer, Location, PageSurface, SharedSurface, Theme};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        email: String,

        /// Password (prefer the environment variable over the flag)
        #[arg(long, env = "SHELF_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session after this process exits
        #[arg(long)]
        remember: bool,
    },

    /// Sign out and forget stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Refresh the access token now
    Refresh,

    /// List books in the library
    Books {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long)]
        category: Option<String>,
    },

    /// Search the library
    Search { query: String },

    /// Read an EPUB from the library or from disk
    Read {
        /// Book id to download
        #[arg(required_unless_present = "file")]
        book_id: Option<String>,

        /// Local EPUB file instead of a library book
        #[arg(long, conflicts_with = "book_id")]
        file: Option<PathBuf>,

        #[arg(long, default_value = "light")]
        theme: Theme,

        /// Number of sections to print
        #[arg(long, default_value = "1")]
        sections: usize,
    },
}

impl Commands {
    pub async fn execute(self, data_dir: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
        let mut config = match config_path {
            Some(path) => ClientConfig::load_from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClientConfig::from_env().context("loading configuration")?,
        };
        config.storage_dir.get_or_insert(data_dir);

        let client = ShelfClient::from_config(&config)?;

        match self {
            Commands::Login {
                email,
                password,
                remember,
            } => login(&client, email, password, remember).await,
            Commands::Logout => {
                client.logout().await;
                println!("Signed out");
                Ok(())
            }
            Commands::Whoami => whoami(&client).await,
            Commands::Refresh => refresh(&client).await,
            Commands::Books {
                page,
                limit,
                category,
            } => {
                let query = BookQuery {
                    page: Some(page),
                    limit: Some(limit),
                    category,
                    sort: None,
                };
                list_books(&client, &query).await
            }
            Commands::Search { query } => search(&client, &query).await,
            Commands::Read {
                book_id,
                file,
                theme,
                sections,
            } => read(&client, book_id, file, theme, sections).await,
        }
    }
}

async fn login(client: &ShelfClient, email: String, password: String, remember: bool) -> Result<()> {
    let user = client.login(email, password, remember).await?;
    info!(user_id = %user.id, remember, "logged in");
    println!("Signed in as {} <{}>", user.display_name(), user.email);
    if !remember {
        println!("Session ends when this command exits; pass --remember to keep it");
    }
    Ok(())
}

fn require_session(client: &ShelfClient) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("not signed in; run `shelf login --remember <email>` first");
    }
    Ok(())
}

async fn whoami(client: &ShelfClient) -> Result<()> {
    require_session(client)?;
    let user = client.me().await?;
    println!("{} <{}>", user.display_name(), user.email);
    println!("  username:   {}", user.username);
    println!("  role:       {}", user.role);
    if let Some(school) = &user.school {
        println!("  school:     {school}");
    }
    println!(
        "  onboarding: {}",
        if user.onboarding_completed { "done" } else { "pending" }
    );
    Ok(())
}

async fn refresh(client: &ShelfClient) -> Result<()> {
    require_session(client)?;
    match client.refresh().await? {
        RefreshOutcome::Refreshed => println!("Access token refreshed"),
        RefreshOutcome::Skipped => println!("Access token already fresh"),
    }
    Ok(())
}

async fn list_books(client: &ShelfClient, query: &BookQuery) -> Result<()> {
    let page = client.list_books(query).await?;
    for book in &page.items {
        let format = match book.format {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
        };
        println!("{:<24} {:<5} {} by {}", book.id, format, book.title, book.author);
    }
    println!(
        "page {} ({} of {} books){}",
        page.page,
        page.items.len(),
        page.total,
        if page.has_more() { ", more available" } else { "" }
    );
    Ok(())
}

async fn search(client: &ShelfClient, query: &str) -> Result<()> {
    let books = client.search(query).await?;
    if books.is_empty() {
        println!("No matches for {query:?}");
    }
    for book in books {
        println!("{:<24} {} by {}", book.id, book.title, book.author);
    }
    Ok(())
}

async fn read(
    client: &ShelfClient,
    book_id: Option<String>,
    file: Option<PathBuf>,
    theme: Theme,
    sections: usize,
) -> Result<()> {
    let bytes = match (file, book_id) {
        (Some(path), _) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
        (None, Some(id)) => {
            require_session(client)?;
            client.download_book(&id).await?
        }
        (None, None) => bail!("either a book id or --file is required"),
    };

    let surface = Arc::new(Mutex::new(PageSurface::new()));
    let shared: SharedSurface = surface.clone();
    let mut viewer = EpubViewer::new(EpubEngine::new(), shared);

    let mut navigator = None;
    viewer.load(bytes, theme, |nav, metadata| {
        if let Some(title) = &metadata.title {
            println!("# {title}");
        }
        println!("{} sections, {theme} theme", metadata.sections);
        navigator = Some(nav);
    })?;

    let Some(navigator) = navigator else {
        bail!("book is empty");
    };

    print_page(&surface);
    for _ in 1..sections {
        if navigator.next()?.is_none() {
            break;
        }
        print_page(&surface);
    }
    Ok(())
}

fn print_page(surface: &Mutex<PageSurface>) {
    let surface = surface
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let Some(page) = surface.page() else {
        return;
    };
    println!("\n--- {} ---", describe(page.location));
    println!("{}", plain_text(&page.content));
}

fn describe(location: Location) -> String {
    format!(
        "section {}/{} ({:.0}%)",
        location.index + 1,
        location.total,
        location.percentage()
    )
}

/// Strip markup, keeping text and paragraph breaks
fn plain_text(markup: &str) -> String {
    let body = markup
        .find("<body")
        .map_or(markup, |start| &markup[start..]);

    let mut out = String::with_capacity(body.len());
    let mut in_tag = false;
    let mut tag = String::new();
    for c in body.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag.trim_start_matches('/');
                if name.starts_with('p') || name.starts_with("br") || name.starts_with('h') {
                    out.push('\n');
                }
            }
            _ if in_tag => tag.push(c),
            _ => out.push(c),
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_strips_tags() {
        let markup = "<html><head><title>x</title></head><body><h1>Dune</h1><p>A  desert <em>planet</em>.</p></body></html>";
        assert_eq!(plain_text(markup), "Dune\nA  desert planet.");
    }

    #[test]
    fn test_describe_location() {
        let text = describe(Location { index: 1, total: 4 });
        assert_eq!(text, "section 2/4 (50%)");
    }
}
