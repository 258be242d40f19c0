use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use herb_grimoire::assets::LocalAssetSource;
use herb_grimoire::clipboard::{copy_report, CopyOutcome};
use herb_grimoire::config::ReportConfig;
use herb_grimoire::fonts::FontSet;
use herb_grimoire::model::non_empty_chapters;
use herb_grimoire::pagination::ReportEngine;
use herb_grimoire::raster::BitmapRasterizer;
use herb_grimoire::sink::DirectorySink;
use herb_grimoire::state::AppState;
use herb_grimoire::store::{DirectoryStore, Library};

/// Exports the herb grimoire kept in a library directory.
///
/// Fonts must be present under `assets/fonts` next to the binary or the crate manifest, or be
/// provided via the `GRIMOIRE_FONTS_DIR` environment variable, before exporting PDFs.
#[derive(Parser)]
#[command(author, version, about = "Export and inspect an herb grimoire")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LibraryArgs {
    /// Directory holding the saved favorites, categories and spells.
    #[arg(long, default_value = ".")]
    library: PathBuf,
}

#[derive(Args)]
struct OutputArgs {
    #[command(flatten)]
    library: LibraryArgs,

    /// Directory the exported files are written to.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the full paginated report.
    #[command(name = "export", aliases = ["report"])]
    Export(OutputArgs),

    /// Render one herb on a page of its own.
    #[command(name = "export-herb", aliases = ["export_herb"])]
    ExportHerb {
        /// Name of the saved herb, matched case-insensitively.
        name: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Write the clipboard report as HTML and plain text files.
    #[command(name = "copy-report", aliases = ["copy_report", "copy"])]
    CopyReport(OutputArgs),

    /// Print the collection grouped the way the report lays it out.
    #[command(name = "list", aliases = ["ls"])]
    List(LibraryArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export(args) => export(&args).await,
        Commands::ExportHerb { name, output } => export_herb(&name, &output).await,
        Commands::CopyReport(args) => copy(&args).await,
        Commands::List(args) => {
            list(&args);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn load_state(library: &Path) -> AppState {
    Library::new(DirectoryStore::new(library)).load()
}

async fn engine_for(
    library: &Path,
    config: ReportConfig,
) -> Result<(ReportEngine<BitmapRasterizer>, FontSet), Box<dyn Error>> {
    let fonts = FontSet::load_default_async().await?;
    let assets = Arc::new(LocalAssetSource::new().with_base_dir(library));
    let rasterizer = BitmapRasterizer::new(assets, &config).with_fonts(&fonts)?;
    Ok((ReportEngine::new(rasterizer, config), fonts))
}

async fn export(args: &OutputArgs) -> Result<(), Box<dyn Error>> {
    let state = load_state(&args.library.library);
    let (engine, fonts) = engine_for(&args.library.library, ReportConfig::from_env()).await?;
    let sink = DirectorySink::new(&args.out);

    let outcome = engine
        .export_report(state.favorites(), state.categories(), state.spells(), &fonts, &sink)
        .await?;

    println!(
        "Wrote {} ({} pages) to {}",
        engine.config().filename(),
        outcome.document.page_count(),
        args.out.display()
    );
    for failure in &outcome.failures {
        eprintln!(
            "  page {}: could not render {}: {}",
            failure.physical_page, failure.item, failure.reason
        );
    }
    for page in &outcome.clipped {
        eprintln!(
            "  page {}: {} did not fit and was cut off at the bottom",
            page.physical_page, page.item
        );
    }
    Ok(())
}

async fn export_herb(name: &str, args: &OutputArgs) -> Result<(), Box<dyn Error>> {
    let state = load_state(&args.library.library);
    let favorite = state
        .favorite(name)
        .ok_or_else(|| format!("\"{}\" is not in the grimoire", name))?;
    let (engine, fonts) = engine_for(&args.library.library, ReportConfig::from_env()).await?;
    let sink = DirectorySink::new(&args.out);

    let filename = engine
        .export_single(favorite, state.spells(), &fonts, &sink)
        .await?;
    println!("Wrote {} to {}", filename, args.out.display());
    Ok(())
}

async fn copy(args: &OutputArgs) -> Result<(), Box<dyn Error>> {
    let state = load_state(&args.library.library);
    let config = ReportConfig::from_env();
    let sink = DirectorySink::new(&args.out);

    match copy_report(config.title(), state.favorites(), &sink).await? {
        None => println!("The grimoire is empty; nothing to copy"),
        Some(CopyOutcome::Rich) => println!("Copied the report to {}", args.out.display()),
        Some(CopyOutcome::PlainTextOnly) => {
            println!("Copied the plain text report to {}", args.out.display())
        }
    }
    Ok(())
}

fn list(args: &LibraryArgs) {
    let state = load_state(&args.library);
    let config = ReportConfig::from_env();
    let chapters =
        non_empty_chapters(state.favorites(), state.categories(), config.category_order());

    if chapters.is_empty() {
        println!("The grimoire is empty");
        return;
    }
    for chapter in chapters {
        let marker = if chapter.is_uncategorized() { " *" } else { "" };
        println!("{}{} ({})", chapter.title(), marker, chapter.len());
        for favorite in chapter.records() {
            println!("  {} - {}", favorite.name(), favorite.herb.scientific_name);
        }
    }
    if !state.spells().is_empty() {
        println!("Spells: {}", state.spells().len());
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
