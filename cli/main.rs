use clap::{Parser, Subcommand};
use etiquette::db::PhotoDb;
use etiquette::media::ImageToolkit;
use etiquette::search::SearchParams;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "etiquette")]
#[command(about = "Self-hosted media catalog", long_about = None)]
struct Cli {
    #[arg(long, default_value = "./catalog", help = "Catalog data directory")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory, registering every photo/video/audio file under it.
    Ingest {
        #[arg(help = "Directory to walk")]
        path: PathBuf,
    },
    /// Search the catalog by tag.
    Search {
        #[arg(short, long, help = "Tags that must be present (repeatable)")]
        tag: Vec<String>,

        #[arg(short, long, help = "Maximum number of results")]
        limit: Option<i64>,
    },
    /// Create a tag, optionally under a parent.
    Tag {
        #[arg(help = "Tag name")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), etiquette::CatalogError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let db = PhotoDb::open(&cli.data_dir, Box::new(ImageToolkit)).await?;

    match cli.command {
        Commands::Ingest { path } => {
            let photos = db.digest_directory(&path).await?;
            println!("registered {} photo(s)", photos.len());
        }
        Commands::Search { tag, limit } => {
            let params = SearchParams { tag_musts: tag, limit, ..Default::default() };
            let result = db.search(&params).await?;
            for photo in &result.photos {
                println!("{}\t{}", photo.id, photo.basename());
            }
            db.warn(&result.warnings);
        }
        Commands::Tag { name } => {
            let tag = db.new_tag(&name, None, None).await?;
            println!("created tag {} ({})", tag.name, tag.id);
        }
    }

    Ok(())
}
