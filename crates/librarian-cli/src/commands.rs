//! Command definitions and execution.

use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use librarian_core::api::{ApiResponse, ListQuery, Method};
use librarian_core::config::TokenStorage;
use librarian_core::{ApiClient, ClientConfig};

use crate::format::{format_optional, truncate_string};

/// Column width for titles in list output
const TITLE_WIDTH: usize = 40;

/// Column width for authors in list output
const AUTHOR_WIDTH: usize = 24;

/// Command-line client for The Librarian.
#[derive(Debug, Parser)]
#[command(
    name = "librarian",
    version,
    about = "Command-line client for The Librarian",
    after_help = "Environment:\n  LIBRARIAN_API_URL        Backend base URL\n  LIBRARIAN_TOKEN_STORAGE  file, keyring or memory\n  RUST_LOG                 Log filter (default: warn)"
)]
pub struct Cli {
    /// Backend base URL; `config` stores it, other commands use it once
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sign in (password is prompted)
    Login { email: Option<String> },
    /// Create an account and sign in
    Register { name: String, email: String },
    /// Sign out and forget the stored token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List catalog titles
    Titles(TitleArgs),
    /// Show one title
    Title { id: String },
    /// List the copies of a title
    Copies { title_id: String },
    /// List libraries
    Libraries,
    /// Request to borrow a copy
    Borrow { copy_id: String },
    /// Return a borrowed copy
    Return { borrowing_id: String },
    /// List your borrowings
    Loans,
    /// Profile, loans and libraries at a glance
    Dashboard,
    /// Print the raw response envelope for a route
    Get { path: String },
    /// Write settings to the config file
    Config(ConfigArgs),
}

/// Paging and search flags for list commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long)]
    pub search: Option<String>,
}

impl From<&ListArgs> for ListQuery {
    fn from(args: &ListArgs) -> Self {
        ListQuery {
            page: args.page,
            limit: args.limit,
            search: args.search.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct TitleArgs {
    #[command(flatten)]
    pub list: ListArgs,
    /// Only show titles with a copy on the shelf
    #[arg(long)]
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct ConfigArgs {
    /// Token storage backend: file, keyring or memory
    #[arg(long)]
    pub token_storage: Option<String>,
}

/// Update the config file. Environment overrides are not written back.
pub fn configure(api_url: Option<&str>, args: &ConfigArgs) -> Result<bool> {
    let path = ClientConfig::config_path()?;
    let mut config = ClientConfig::load_from(&path)?;
    if let Some(url) = api_url {
        config.base_url = url.trim().to_string();
    }
    if let Some(ref storage) = args.token_storage {
        config.token_storage = storage.parse::<TokenStorage>()?;
    }
    config.validate()?;
    config.save()?;

    println!("Config written to {}", path.display());
    println!("  base_url:      {}", config.base_url);
    println!("  token_storage: {:?}", config.token_storage);
    Ok(true)
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}

/// Print the envelope's error for a failed call; hand back data otherwise.
fn report<T>(response: ApiResponse<T>) -> Option<T> {
    if let Some(message) = response.error_message() {
        eprintln!("{}", message);
        return None;
    }
    response.into_data()
}

/// Run a command. `Ok(false)` means the backend rejected it and the
/// message has already been printed.
pub async fn run(client: &ApiClient, command: Command) -> Result<bool> {
    match command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => prompt_email()?,
            };
            let password = prompt_password()?;
            let response = client.login(&email, &password).await?;
            Ok(match report(response) {
                Some(payload) => {
                    let name = payload.user.map(|u| u.name).unwrap_or(email);
                    println!("Signed in as {}", name);
                    true
                }
                None => false,
            })
        }
        Command::Register { name, email } => {
            let password = prompt_password()?;
            let response = client.register(&name, &email, &password).await?;
            Ok(match report(response) {
                Some(_) => {
                    println!("Account created. Signed in as {}", name);
                    true
                }
                None => false,
            })
        }
        Command::Logout => {
            // The local token is gone whatever the backend answered.
            // An expired token may also invalidate the session here; the
            // caller keeps quiet about that for logout.
            let result = client.logout().await;
            if let Err(e) = result {
                tracing::debug!(error = %e, "Logout request failed");
            }
            println!("Signed out");
            Ok(true)
        }
        Command::Whoami => {
            if !client.session().is_authenticated() {
                println!("Not signed in");
                return Ok(true);
            }
            let Some(user) = report(client.current_user().await?) else {
                return Ok(false);
            };
            println!("{} <{}> ({})", user.name, user.email, user.role);
            if user.role.is_staff() {
                println!("Staff access: catalog and loan management");
            }
            if let Some(since) = client.session().stored_at() {
                println!("Token stored {}", since.format("%Y-%m-%d %H:%M UTC"));
            }
            Ok(true)
        }
        Command::Titles(args) => {
            let response = client.list_titles(&ListQuery::from(&args.list)).await?;
            let pagination = response.pagination().copied();
            let Some(titles) = report(response) else {
                return Ok(false);
            };
            for title in titles.iter().filter(|t| !args.available || t.is_available()) {
                println!(
                    "{:<12} {:<title_w$} {:<author_w$} {}",
                    truncate_string(&title.id, 12),
                    truncate_string(&title.title, TITLE_WIDTH),
                    truncate_string(&title.author, AUTHOR_WIDTH),
                    title.availability_display(),
                    title_w = TITLE_WIDTH,
                    author_w = AUTHOR_WIDTH,
                );
            }
            if let Some(p) = pagination {
                println!("Page {} of {} ({} titles)", p.page, p.pages, p.total);
                if p.has_next() {
                    println!("Next page: librarian titles --page {}", p.page + 1);
                }
            }
            Ok(true)
        }
        Command::Title { id } => {
            let Some(title) = report(client.get_title(&id).await?) else {
                return Ok(false);
            };
            println!("{} by {}", title.title, title.author);
            println!("ISBN:       {}", format_optional(&title.isbn, "-"));
            println!("Publisher:  {}", format_optional(&title.publisher, "-"));
            if let Some(year) = title.published_year {
                println!("Published:  {}", year);
            }
            println!("Genre:      {}", format_optional(&title.genre, "-"));
            println!("Copies:     {}", title.availability_display());
            if let Some(description) = title.description {
                println!("\n{}", description);
            }
            Ok(true)
        }
        Command::Copies { title_id } => {
            let Some(copies) = report(client.list_copies(&title_id).await?) else {
                return Ok(false);
            };
            for copy in copies {
                println!(
                    "{:<12} {:<14} {:<16} {}",
                    truncate_string(&copy.id, 12),
                    format_optional(&copy.barcode, "-"),
                    copy.status.to_string(),
                    copy.library_id
                );
            }
            Ok(true)
        }
        Command::Libraries => {
            let Some(libraries) = report(client.list_libraries(&ListQuery::default()).await?)
            else {
                return Ok(false);
            };
            for library in libraries {
                println!(
                    "{:<12} {:<32} {}",
                    truncate_string(&library.id, 12),
                    truncate_string(&library.name, 32),
                    format_optional(&library.address, "")
                );
            }
            Ok(true)
        }
        Command::Borrow { copy_id } => {
            let Some(loan) = report(client.borrow_copy(&copy_id).await?) else {
                return Ok(false);
            };
            println!(
                "Borrowing {} is {} - due {}",
                loan.id,
                loan.status,
                loan.due_date.format("%Y-%m-%d")
            );
            Ok(true)
        }
        Command::Return { borrowing_id } => {
            let Some(loan) = report(client.return_borrowing(&borrowing_id).await?) else {
                return Ok(false);
            };
            println!("Borrowing {} is {}", loan.id, loan.status);
            Ok(true)
        }
        Command::Loans => {
            let Some(loans) = report(client.my_borrowings(&ListQuery::default()).await?) else {
                return Ok(false);
            };
            print_loans(&loans);
            Ok(true)
        }
        Command::Dashboard => dashboard(client).await,
        Command::Get { path } => {
            let response = client
                .send(Method::GET, &path, None::<&()>, Default::default())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response.envelope)?);
            Ok(response.is_success())
        }
        Command::Config(args) => configure(None, &args),
    }
}

fn print_loans(loans: &[librarian_core::models::Borrowing]) {
    if loans.is_empty() {
        println!("No borrowings");
        return;
    }
    let now = Utc::now();
    for loan in loans {
        let due = if loan.returned_at.is_some() {
            "returned".to_string()
        } else if loan.is_overdue_at(now) {
            format!("OVERDUE by {} day(s)", -loan.days_until_due(now))
        } else {
            format!("due in {} day(s)", loan.days_until_due(now))
        };
        println!(
            "{:<12} copy {:<12} {:<18} {}",
            truncate_string(&loan.id, 12),
            truncate_string(&loan.copy_id, 12),
            loan.status.to_string(),
            due
        );
    }
}

/// Fetch profile, loans and libraries concurrently.
async fn dashboard(client: &ApiClient) -> Result<bool> {
    let no_query = ListQuery::default();
    let (user, loans, libraries) = futures::join!(
        client.current_user(),
        client.my_borrowings(&no_query),
        client.list_libraries(&no_query),
    );

    let mut ok = true;
    match report(user?) {
        Some(user) => println!("{} ({})", user.name, user.role),
        None => ok = false,
    }
    println!();
    match report(loans?) {
        Some(loans) => print_loans(&loans),
        None => ok = false,
    }
    println!();
    match report(libraries?) {
        Some(libraries) => println!("{} libraries available", libraries.len()),
        None => ok = false,
    }
    Ok(ok)
}
