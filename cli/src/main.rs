use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use gltf_forge::io::gltf::scene_io::{get_scene_file_format, SceneFileFormat, SceneIoOptions};
use gltf_forge::prelude::*;

const APP_NAME: &str = "gltf-forge";
const MODELS_FOLDER: &str = "models";

#[derive(Parser)]
#[command(name = "gltf-forge")]
#[command(about = "Converts glTF 2.0 manifests to runtime triangle meshes and back")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Resolve relative paths against this directory instead of the
    /// application's models folder
    #[arg(long, global = true)]
    resources: Option<PathBuf>,

    /// Fail when a manifest has no loadable binary buffer
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print document statistics and the flattened model summary
    Inspect {
        /// Input .gltf manifest
        input: PathBuf,
    },
    /// Build a manifest into a single model and write it back as .gltf + .bin
    Convert {
        /// Input .gltf manifest
        input: PathBuf,
        /// Output .gltf manifest; the payload is written next to it
        output: PathBuf,
        /// Move the bounding box center to the origin
        #[arg(long)]
        center: bool,
        /// Scale the model so its largest extent is 1 (implies --center)
        #[arg(long)]
        normalize: bool,
        /// Rotate the model by this many degrees around the Y axis
        #[arg(long)]
        rotate_y: Option<f32>,
        /// Write a single-line manifest
        #[arg(long)]
        compact: bool,
    },
    /// Parse and build many manifests in parallel
    Batch {
        /// Input .gltf manifests
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Number of worker threads (defaults to the available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Write the batch report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let locator = resource_locator(cli.resources.as_deref())?;
    tracing::debug!("Resolving relative paths against {}", locator.root().display());
    let resolve = |path: &Path| locator.resolve(path);
    let parse = ParseOptions::new().with_require_binary_data(cli.strict);

    match cli.command {
        Command::Inspect { input } => inspect(&resolve(&input), parse),
        Command::Convert {
            input,
            output,
            center,
            normalize,
            rotate_y,
            compact,
        } => {
            let mut options = SceneIoOptions {
                parse,
                ..Default::default()
            };
            if compact {
                options.encode = options.encode.with_json_output_mode(JsonOutputMode::Compact);
            }
            let edits = Edits {
                center,
                normalize,
                rotate_y,
            };
            convert(&resolve(&input), &resolve(&output), &options, &edits)
        }
        Command::Batch {
            inputs,
            workers,
            report,
        } => {
            let inputs: Vec<PathBuf> = inputs.iter().map(|p| resolve(p)).collect();
            let mut config = BatchConfig::new().with_parse_options(parse);
            if let Some(workers) = workers {
                config = config.with_workers(workers);
            }
            batch(&inputs, &config, report.map(|p| resolve(&p)).as_deref())
        }
    }
}

/// `--resources` when given, otherwise the models folder of the per-user data directory.
fn resource_locator(resources: Option<&Path>) -> Result<ResourceLocator> {
    match resources {
        Some(root) => Ok(ResourceLocator::with_root(root)),
        None => Ok(ResourceLocator::for_app(APP_NAME)?.scoped(MODELS_FOLDER)?),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn ensure_gltf(path: &Path, role: &str) -> Result<()> {
    match get_scene_file_format(path) {
        SceneFileFormat::Gltf => Ok(()),
        SceneFileFormat::Glb => anyhow::bail!("{role} file must be a .gltf manifest; .glb is not supported"),
        SceneFileFormat::Unknown => anyhow::bail!("{role} file must be a .gltf manifest: {}", path.display()),
    }
}

fn inspect(input: &Path, parse: ParseOptions) -> Result<()> {
    ensure_gltf(input, "Input")?;

    let document = GltfDecoder::with_options(parse)
        .decode_from_file(input)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", input.display(), e))?;
    document.log_statistics();

    let model = ModelBuilder::new(&document)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build model: {}", e))?;
    match model {
        Some(model) => println!("{}", serde_json::to_string_pretty(&model.summary())?),
        None => println!("{} contains no mesh primitives", input.display()),
    }
    Ok(())
}

struct Edits {
    center: bool,
    normalize: bool,
    rotate_y: Option<f32>,
}

fn convert(input: &Path, output: &Path, options: &SceneIoOptions, edits: &Edits) -> Result<()> {
    ensure_gltf(input, "Input")?;
    ensure_gltf(output, "Output")?;

    let mut model = gltf_forge::io::gltf::scene_io::read_model_from_file_with_options(input, options)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;

    if let Some(degrees) = edits.rotate_y {
        ops::rotate_model(&mut model, degrees, [0.0, 1.0, 0.0]);
    }
    if edits.normalize {
        let scale = ops::normalize_size(&model).unwrap_or(1.0);
        ops::center_vertices(&mut model, scale);
    } else if edits.center {
        ops::center_vertices(&mut model, 1.0);
    }

    gltf_forge::io::gltf::scene_io::write_model_to_file_with_options(&model, output, options)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", output.display(), e))?;

    println!("{}", serde_json::to_string_pretty(&model.summary())?);
    Ok(())
}

fn batch(inputs: &[PathBuf], config: &BatchConfig, report_path: Option<&Path>) -> Result<()> {
    for input in inputs {
        ensure_gltf(input, "Input")?;
    }

    let report = ingest(inputs, config);
    for failure in &report.failures {
        tracing::warn!("{}: {}", failure.path.display(), failure.error);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match report_path {
        Some(path) => std::fs::write(path, json)
            .map_err(|e| anyhow::anyhow!("Failed to write report {}: {}", path.display(), e))?,
        None => println!("{json}"),
    }

    if !report.failures.is_empty() {
        anyhow::bail!("{} of {} files failed", report.failures.len(), report.completed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_resource_root_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let locator = resource_locator(Some(dir.path())).unwrap();
        assert_eq!(locator.resolve("in.gltf"), dir.path().join("in.gltf"));
        assert!(!dir.path().join(MODELS_FOLDER).exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn default_root_is_the_app_models_folder() {
        let data_home = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_DATA_HOME", data_home.path());

        let locator = resource_locator(None).unwrap();
        assert!(locator.root().starts_with(data_home.path()));
        assert!(locator.root().ends_with(Path::new(APP_NAME).join(MODELS_FOLDER)));
        assert!(locator.root().is_dir());
        assert_eq!(locator.resolve("in.gltf"), locator.root().join("in.gltf"));
        assert_eq!(locator.resolve("/abs/in.gltf"), PathBuf::from("/abs/in.gltf"));
    }
}
