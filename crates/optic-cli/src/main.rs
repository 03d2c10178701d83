use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod workflow;

use config::{Config, Overrides};
use workflow::Pipeline;

#[derive(Parser)]
#[command(name = "optic", about = "Client for the remote vision inference API")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the faces in an image under a name
    Register {
        /// Name stored with each face (e.g., "Person1")
        #[arg(short, long)]
        name: String,
        image: PathBuf,
    },
    /// Identify the faces in an image against registered faces
    Verify { image: PathBuf },
    /// Classify an image
    Classify { image: PathBuf },
    /// Detect objects in an image
    Detect { image: PathBuf },
    /// Estimate human poses in an image
    Pose { image: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(&cli.overrides);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(run(cli.command, config));
    if let Err(e) = &result {
        tracing::error!(error = %e, "request failed");
    }
    result
}

async fn run(command: Commands, config: Config) -> Result<()> {
    tracing::info!(server = %config.server_url, "starting client");
    let pipeline = Pipeline::new(config)?;

    match command {
        Commands::Register { name, image } => {
            let outcome = pipeline.register_face(&image, &name).await?;
            println!("Registered {} face(s) as {name}", outcome.registered);
            print_output(outcome.output);
        }
        Commands::Verify { image } => {
            let outcome = pipeline.verify_face(&image).await?;
            for face in &outcome.faces {
                println!(
                    "face {}: {} (detection {:.3}, match score {:.3})",
                    face.index + 1,
                    face.identity.name,
                    face.confidence,
                    face.identity.score
                );
            }
            print_output(outcome.output);
        }
        Commands::Classify { image } => {
            let outcome = pipeline.classify_image(&image).await?;
            print_detections(&outcome.detections);
            print_output(outcome.output);
        }
        Commands::Detect { image } => {
            let outcome = pipeline.detect_objects(&image).await?;
            print_detections(&outcome.detections);
            print_output(outcome.output);
        }
        Commands::Pose { image } => {
            let outcome = pipeline.estimate_pose(&image).await?;
            print_detections(&outcome.detections);
            print_output(outcome.output);
        }
    }

    Ok(())
}

fn print_detections(detections: &[(String, f32)]) {
    if detections.is_empty() {
        println!("Nothing above the confidence threshold");
    }
    for (label, confidence) in detections {
        println!("{label} {confidence:.6}");
    }
}

fn print_output(output: Option<PathBuf>) {
    if let Some(path) = output {
        println!("Result saved to {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "optic", "register", "--name", "Person1", "face.jpg", "--url", "http://h:1", "--no-save",
        ])
        .unwrap();
        assert_eq!(cli.overrides.server_url.as_deref(), Some("http://h:1"));
        assert!(cli.overrides.no_save);
        match cli.command {
            Commands::Register { name, image } => {
                assert_eq!(name, "Person1");
                assert_eq!(image, PathBuf::from("face.jpg"));
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_flags_override_loaded_config() {
        let cli = Cli::try_parse_from([
            "optic", "-o", "/cli/out", "--font", "/cli/font.ttf", "classify", "cat.jpg",
        ])
        .unwrap();
        let mut config = Config {
            output_dir: PathBuf::from("/file/out"),
            font_path: Some(PathBuf::from("/file/font.ttf")),
            ..Config::default()
        };
        config.apply_overrides(&cli.overrides);

        assert_eq!(config.output_dir, PathBuf::from("/cli/out"));
        assert_eq!(config.font_path, Some(PathBuf::from("/cli/font.ttf")));
        // flags not given leave the config alone
        assert_eq!(config.server_url, "http://localhost:9900");
        assert!(config.save);
    }

    #[test]
    fn test_register_requires_name() {
        assert!(Cli::try_parse_from(["optic", "register", "face.jpg"]).is_err());
    }
}
