//! segmesh command-line tool
//!
//! - `segmesh export` groups the labels of a segmentation volume and writes
//!   per-group masks and meshes plus the combined volume and 3MF scene.
//! - `segmesh inspect` prints the geometry and label histogram of a volume.
//! - `segmesh labels` prints the built-in label map as JSON.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use segmesh::config::{MESH_DIR, SEGMENTATION_FILE, VOLUME_DIR};
use segmesh::converter::{DEFAULT_REDUCTION, DEFAULT_SMOOTHING, DEFAULT_SMOOTHING_ITERATIONS};
use segmesh::{
    CommandSceneConverter, Error, ExportConfig, LabelAggregator, LabelMap, MeshParams, Volume,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Group segmentation labels and export meshes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export group masks, meshes and the combined scene
    Export(ExportArgs),
    /// Show geometry and label statistics of a volume
    Inspect(InspectArgs),
    /// Print the built-in whole-body CT label map as JSON
    Labels {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Base data directory holding segmentation.nii.gz
    #[arg(short, long, env = "SEGMESH_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Segmentation volume (default: <DATA_DIR>/segmentation.nii.gz)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output directory for mask volumes (default: <DATA_DIR>/volumes)
    #[arg(long, value_name = "DIR")]
    volume_dir: Option<PathBuf>,

    /// Output directory for meshes (default: <DATA_DIR>/meshes)
    #[arg(long, value_name = "DIR")]
    mesh_dir: Option<PathBuf>,

    /// Label map JSON file (default: built-in whole-body CT grouping)
    #[arg(short, long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Background border added around the volume, in voxels
    #[arg(long, default_value_t = segmesh::config::DEFAULT_MARGIN)]
    margin: usize,

    /// Smoothing strength in [0, 1]
    #[arg(long, default_value_t = DEFAULT_SMOOTHING)]
    smoothing: f64,

    /// Number of smoothing passes
    #[arg(long, default_value_t = DEFAULT_SMOOTHING_ITERATIONS)]
    smoothing_iterations: u32,

    /// Fraction of triangles to remove, in [0, 1)
    #[arg(long, default_value_t = DEFAULT_REDUCTION)]
    reduction: f64,

    /// Program converting the combined 3MF scene, called as `<PROGRAM> <SCENE> <OUTPUT>`
    #[arg(long, value_name = "PROGRAM")]
    scene_command: Option<PathBuf>,

    /// File extension of the scene converter output
    #[arg(long, default_value = segmesh::config::DEFAULT_SCENE_EXTENSION)]
    scene_extension: String,

    /// Write a JSON report of the run
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Volume to inspect
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Compare the volume's ids against a label map JSON file
    #[arg(short, long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Compare against the built-in label map
    #[arg(long, conflicts_with = "labels")]
    builtin_labels: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Export(args) => run_export(args),
        Command::Inspect(args) => run_inspect(args),
        Command::Labels { output } => run_labels(output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve(
    explicit: Option<PathBuf>,
    base: Option<&Path>,
    default: &str,
    what: &str,
) -> segmesh::Result<PathBuf> {
    match (explicit, base) {
        (Some(path), _) => Ok(path),
        (None, Some(base)) => Ok(base.join(default)),
        (None, None) => Err(Error::InvalidParameter(format!(
            "no {} given; pass --data-dir or set SEGMESH_DATA_DIR",
            what
        ))),
    }
}

fn load_labels(path: Option<&Path>) -> segmesh::Result<LabelMap> {
    match path {
        Some(path) => LabelMap::from_json_file(path),
        None => Ok(LabelMap::whole_body_ct()),
    }
}

fn run_export(args: ExportArgs) -> segmesh::Result<()> {
    let base = args.data_dir.as_deref();
    let input = resolve(args.input, base, SEGMENTATION_FILE, "input volume")?;
    let volume_dir = resolve(args.volume_dir, base, VOLUME_DIR, "volume directory")?;
    let mesh_dir = resolve(args.mesh_dir, base, MESH_DIR, "mesh directory")?;

    let params = MeshParams::default()
        .with_smoothing(args.smoothing)
        .with_smoothing_iterations(args.smoothing_iterations)
        .with_reduction(args.reduction);

    let mut config = ExportConfig::new(input, volume_dir, mesh_dir)
        .with_label_map(load_labels(args.labels.as_deref())?)
        .with_margin(args.margin)
        .with_mesh_params(params)
        .with_scene_extension(args.scene_extension);
    if let Some(program) = args.scene_command {
        config = config.with_scene_converter(Arc::new(CommandSceneConverter::new(program)));
    }

    let report = LabelAggregator::new(config).run()?;

    let empty: Vec<&str> = report.empty_groups().map(|g| g.name.as_str()).collect();
    info!(
        groups = report.groups.len(),
        files = report.written_files().len(),
        "Export finished"
    );
    if !empty.is_empty() {
        println!("Groups without voxels: {}", empty.join(", "));
    }
    for path in report.written_files() {
        println!("{}", path.display());
    }

    if let Some(path) = args.report {
        report.write_json(&path)?;
        info!(path = %path.display(), "Wrote report");
    }

    Ok(())
}

fn run_inspect(args: InspectArgs) -> segmesh::Result<()> {
    let volume = Volume::load(&args.file)?;
    let header = volume.header();
    let affine = volume.affine();

    println!("File:        {}", args.file.display());
    println!("Dimensions:  {:?}", volume.dims());
    println!("Spacing:     {:?}", header.spacing());
    println!("Units:       {:?}", header.spatial_unit());
    println!(
        "Transform:   {}",
        if header.sform_code > 0 {
            "sform"
        } else if header.qform_code > 0 {
            "qform"
        } else {
            "pixdim"
        }
    );
    for row in 0..3 {
        println!(
            "  [{:>10.4} {:>10.4} {:>10.4} {:>10.4}]",
            affine[(row, 0)],
            affine[(row, 1)],
            affine[(row, 2)],
            affine[(row, 3)]
        );
    }
    let description = header.description();
    if !description.is_empty() {
        println!("Description: {}", description);
    }

    let labels = if args.builtin_labels {
        Some(LabelMap::whole_body_ct())
    } else {
        args.labels.as_deref().map(LabelMap::from_json_file).transpose()?
    };

    let histogram = volume.histogram();
    println!();
    println!("{:>8}  {:>12}  group", "label", "voxels");
    for (label, count) in &histogram {
        let group = labels
            .as_ref()
            .and_then(|map| map.iter().find(|(_, g)| g.contains(*label)))
            .map(|(name, _)| name)
            .unwrap_or("");
        println!("{:>8}  {:>12}  {}", label, count, group);
    }

    if let Some(map) = labels {
        let mapped = map.all_ids();
        let missing: Vec<String> = mapped
            .iter()
            .filter(|id| !histogram.contains_key(id))
            .map(|id| id.to_string())
            .collect();
        let unmapped: Vec<String> = histogram
            .keys()
            .filter(|&&id| id != segmesh::labels::BACKGROUND_LABEL && !mapped.contains(&id))
            .map(|id| id.to_string())
            .collect();
        println!();
        println!("Label map ids absent from volume: {}", list_or_none(&missing));
        println!("Volume ids absent from label map: {}", list_or_none(&unmapped));
    }

    Ok(())
}

fn list_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

fn run_labels(output: Option<&Path>) -> segmesh::Result<()> {
    let json = LabelMap::whole_body_ct().to_json_string()?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}
