use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use fitview::config;
use fitview::error::ViewerError;
use fitview::page::Viewport;
use fitview::scale;
use fitview::selection;

#[derive(Parser)]
#[command(
    name = "fitview",
    about = "Fit-to-width image and comic archive viewer for Kitty-compatible terminals"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Image file, directory, or .cbz archive to view
    #[arg(global = true)]
    input: Option<PathBuf>,

    /// Number of scaled pages kept in the cache
    #[arg(long, global = true)]
    cache_size: Option<usize>,

    /// Vertical pan step in pixels
    #[arg(long, global = true)]
    pan_step: Option<u32>,

    /// Log output file path (enables logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Scale one image to a fixed width and write it as PNG
    Scale {
        /// Input image
        image: PathBuf,

        /// Output PNG file
        #[arg(short, long, default_value = "output.png")]
        output: PathBuf,

        /// Target width in pixels
        #[arg(long, default_value_t = 1000)]
        width: u32,

        /// Viewport height in pixels (reported pan range only)
        #[arg(long, default_value_t = 1000)]
        height: u32,
    },
    /// Print the pages a path resolves to
    List {
        /// Image file, directory, or .cbz archive
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        let file = match fs::File::create(log_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log: the terminal is in raw mode, so no logger

    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(&config::CliOverrides {
        pan_step: cli.pan_step,
        cache_capacity: cli.cache_size,
    });
    let config = cfg.resolve();

    let result = match cli.command {
        Some(Command::Scale {
            image,
            output,
            width,
            height,
        }) => cmd_scale(image, output, Viewport::new(width, height)),
        Some(Command::List { path }) => cmd_list(path),
        None => match cli.input {
            Some(p) => fitview::viewer::run(p, config.viewer),
            None => {
                eprintln!("Error: input path required (image, directory, or .cbz)");
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        // Nothing to show is a clean exit, not a failure.
        if let Some(err @ ViewerError::EmptySelection(_)) = e.downcast_ref::<ViewerError>() {
            eprintln!("{err}");
            return;
        }
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_scale(image: PathBuf, output: PathBuf, viewport: Viewport) -> Result<()> {
    let start = Instant::now();
    let page = scale::scale_image(&image, viewport)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&output, &page.raster)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(
        "cmd_scale: completed in {:.1}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );
    eprintln!(
        "scaled {} -> {} ({}x{}, pan range 0..={} px, {} bytes)",
        image.display(),
        output.display(),
        page.width,
        page.height,
        page.max_offset(viewport),
        page.raster.len()
    );
    Ok(())
}

fn cmd_list(path: PathBuf) -> Result<()> {
    let selection = selection::select(&path)?;
    if let Some(dir) = selection.extracted_dir() {
        info!("cmd_list: extracted into {}", dir.display());
    }
    for (i, page) in selection.pages.iter().enumerate() {
        let marker = if i == selection.start { '>' } else { ' ' };
        println!("{marker} {:>4}  {}", i + 1, page);
    }
    Ok(())
}
