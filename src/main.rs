use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use meaningness_epub::{parse_epub_path, AppConfig, BuildOptions, Pipeline};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "meaningness-epub")]
#[command(about = "CLI utility to turn the nested table of contents of a web book into an EPUB for offline reading")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the table of contents and every chapter, then package them
    Build {
        /// Table of contents page saved by a previous run. Leave out to download it again
        #[arg(short = 'c', long = "chapter-file")]
        chapter_file: Option<PathBuf>,

        /// Directory to download chapters to. Chapters already there are skipped
        #[arg(short = 'd', long = "chapter-directory")]
        chapter_directory: PathBuf,

        /// Output file, must end in .epub
        #[arg(short = 'o', long = "output", value_parser = parse_epub_path)]
        output: PathBuf,

        /// Download chapters again even if they already exist
        #[arg(short = 'f', long = "force-download")]
        force_download: bool,

        /// JSON file overriding site settings and book metadata
        #[arg(long = "config")]
        config: Option<PathBuf>,

        /// Seconds to wait between chapter downloads
        #[arg(long = "delay", value_parser = parse_delay)]
        delay: Option<f64>,
    },
    /// Package chapters downloaded by an earlier build without going online
    Package {
        /// Table of contents page saved by a previous run
        #[arg(short = 'c', long = "chapter-file")]
        chapter_file: PathBuf,

        /// Directory holding the downloaded chapters
        #[arg(short = 'd', long = "chapter-directory")]
        chapter_directory: PathBuf,

        /// Output file, must end in .epub
        #[arg(short = 'o', long = "output", value_parser = parse_epub_path)]
        output: PathBuf,

        /// JSON file overriding site settings and book metadata
        #[arg(long = "config")]
        config: Option<PathBuf>,
    },
}

fn parse_delay(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if value < 0.0 || Duration::try_from_secs_f64(value).is_err() {
        return Err("Must be zero or positive number of seconds.".to_string());
    }
    Ok(value)
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {}", path.display().to_string().blue());
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

async fn run(command: Commands) -> Result<()> {
    let (config, options) = match command {
        Commands::Build {
            chapter_file,
            chapter_directory,
            output,
            force_download,
            config,
            delay,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(delay) = delay {
                config.site.crawl_delay_secs = delay;
            }
            let options = BuildOptions {
                listing: chapter_file,
                out_dir: chapter_directory,
                output,
                force_download,
                offline: false,
            };
            (config, options)
        }
        Commands::Package {
            chapter_file,
            chapter_directory,
            output,
            config,
        } => {
            let config = load_config(config.as_ref())?;
            let options = BuildOptions {
                listing: Some(chapter_file),
                out_dir: chapter_directory,
                output,
                force_download: false,
                offline: true,
            };
            (config, options)
        }
    };

    Pipeline::new(config).run(&options).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    // Keep the HTTP stack quiet unless asked for
    let filter = EnvFilter::from_default_env()
        .add_directive("reqwest=warn".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("meaningness_epub=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command).await {
        error!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_must_fit_a_duration() {
        assert_eq!(parse_delay("2.5"), Ok(2.5));
        assert_eq!(parse_delay("0"), Ok(0.0));
        assert!(parse_delay("-1").is_err());
        assert!(parse_delay("1e300").is_err());
        assert!(parse_delay("inf").is_err());
        assert!(parse_delay("NaN").is_err());
        assert!(parse_delay("soon").is_err());
    }
}
