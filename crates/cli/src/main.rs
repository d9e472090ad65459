use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use shelf_app::modules::books::models::{BookForm, CoverUpload};
use shelf_app::Application;
use shelf_kernel::settings::Settings;

/// Manage the shelf book catalog
#[derive(Parser, Debug)]
#[command(name = "shelf", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server until Ctrl-C
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Inspect or add catalog entries
    #[command(subcommand)]
    Books(BooksCommand),
}

#[derive(Subcommand, Debug)]
enum BooksCommand {
    /// Print one page of the catalog as JSON
    List {
        /// 1-based page number
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Print a single book as JSON
    Show {
        /// Book id
        id: i64,
    },
    /// Add a book, optionally with a cover image
    Add(AddArgs),
}

#[derive(Args, Debug)]
struct AddArgs {
    /// Unique book name
    #[arg(long)]
    name: String,

    #[arg(long)]
    author: String,

    #[arg(long)]
    translator: Option<String>,

    /// Free-form date token, at most 8 characters
    #[arg(long)]
    translation_date: Option<String>,

    /// Cover image (jpg, jpeg or png)
    #[arg(long)]
    image: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("failed to load shelf settings")?;
    shelf_telemetry::init_stderr(&settings.telemetry)?;

    let app = Application::build(settings).await?;

    match cli.command {
        Command::Serve => app.serve().await,
        Command::Migrate => {
            tracing::info!("database is up to date");
            app.shutdown().await
        }
        Command::Books(command) => {
            let outcome = run_books(&app, command).await;
            app.shutdown().await?;
            outcome
        }
    }
}

async fn run_books(app: &Application, command: BooksCommand) -> anyhow::Result<()> {
    let catalog = app.catalog();
    match command {
        BooksCommand::List { page } => print_json(&catalog.browse(page).await?),
        BooksCommand::Show { id } => print_json(&catalog.get_book(id).await?),
        BooksCommand::Add(args) => {
            let image = args.image.as_deref().map(read_cover).transpose()?;
            let book = catalog
                .submit_new_book(BookForm {
                    name: args.name,
                    author: args.author,
                    translator: args.translator,
                    translation_date: args.translation_date,
                    image,
                })
                .await?;
            print_json(&book)
        }
    }
}

fn read_cover(path: &Path) -> anyhow::Result<CoverUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(CoverUpload { file_name, bytes })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
