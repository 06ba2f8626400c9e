#![allow(unknown_lints)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use navgraph::collisions::{CollisionChecker, RayCaster};
use navgraph::config::{NavConfig, SimplifyStrategy};
use navgraph::constants::{DEFAULT_LAYER, JUMP_LINK_LAYER};
use navgraph::mesh::PolygonMeshData;
use navgraph::nav::Nav;
use navgraph::position::Position;
use navgraph::provider::{NavigationPath, plan_path};
use navgraph::utils::create_file_with_parents;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use simple_tqdm::{Config, ParTqdm};
use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(all(not(target_env = "msvc"), not(target_arch = "wasm32")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Build navigation graphs from polygon meshes and plan paths across them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter (trace, debug, info, warn, error). Falls back to RUST_LOG.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct SceneArgs {
    /// Navigation config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scene geometry as a `.tri` file, used for jump links and ray queries.
    #[arg(long)]
    tri: Option<PathBuf>,

    /// Collision layers the `.tri` triangles are placed on. The default serves
    /// both ray queries and jump-link discovery.
    #[arg(long, default_value_t = DEFAULT_LAYER | JUMP_LINK_LAYER)]
    tri_layer: u32,
}

#[derive(clap::Args, Debug)]
struct SmoothingArgs {
    /// Overrides the simplification stage from the config.
    #[arg(long, value_enum)]
    simplify: Option<SimplifyArg>,

    /// Snap interior waypoints onto the scene geometry.
    #[arg(long)]
    snap_to_ground: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SimplifyArg {
    Rdp,
    RdpXz,
    Shortcut,
}

impl From<SimplifyArg> for SimplifyStrategy {
    fn from(arg: SimplifyArg) -> Self {
        match arg {
            SimplifyArg::Rdp => Self::Rdp { xz_only: false },
            SimplifyArg::RdpXz => Self::Rdp { xz_only: true },
            SimplifyArg::Shortcut => Self::Shortcut,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a navigation graph from a polygon mesh
    Bake {
        /// Polygon mesh JSON
        #[arg(long)]
        mesh: PathBuf,

        /// Output file. `.json` writes JSON, anything else bincode.
        #[arg(long)]
        output: PathBuf,

        /// Reuse a cached graph keyed by mesh and config content.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        #[command(flatten)]
        scene: SceneArgs,
    },

    /// Plan a single path on a baked graph
    Path {
        /// Baked navigation graph
        #[arg(long)]
        graph: PathBuf,

        /// Start position (x,y,z)
        #[arg(long, value_parser = parse_position, allow_hyphen_values = true)]
        start: Position,

        /// End position (x,y,z)
        #[arg(long, value_parser = parse_position, allow_hyphen_values = true)]
        end: Position,

        /// Write the path JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        scene: SceneArgs,

        #[command(flatten)]
        smoothing: SmoothingArgs,
    },

    /// Plan many paths in parallel from a JSON list of requests
    Batch {
        /// Baked navigation graph
        #[arg(long)]
        graph: PathBuf,

        /// JSON array of `{"start": {x, y, z}, "end": {x, y, z}}`
        #[arg(long)]
        requests: PathBuf,

        /// Output JSON array, `null` for requests without a path.
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        scene: SceneArgs,

        #[command(flatten)]
        smoothing: SmoothingArgs,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PathRequest {
    start: Position,
    end: Position,
}

fn parse_position(s: &str) -> Result<Position, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("Position must have 3 components, got {}", parts.len()));
    }

    let mut coords = [0.0; 3];
    for (coord, part) in coords.iter_mut().zip(&parts) {
        *coord = part.trim().parse::<f64>().map_err(|e| e.to_string())?;
    }
    Ok(Position::new(coords[0], coords[1], coords[2]))
}

fn load_config(scene: &SceneArgs, smoothing: Option<&SmoothingArgs>) -> Result<NavConfig> {
    let mut config = match &scene.config {
        Some(path) => NavConfig::from_json(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => NavConfig::default(),
    };
    if let Some(args) = smoothing {
        if let Some(simplify) = args.simplify {
            config.smoothing.simplify = simplify.into();
        }
        if args.snap_to_ground {
            config.smoothing.snap_to_ground = true;
        }
    }
    Ok(config)
}

fn load_scene(scene: &SceneArgs) -> Result<Option<CollisionChecker>> {
    scene
        .tri
        .as_ref()
        .map(|path| {
            CollisionChecker::from_tri_file(path, scene.tri_layer)
                .with_context(|| format!("Failed to read triangles from {}", path.display()))
        })
        .transpose()
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn load_graph(path: &Path) -> Result<Nav> {
    let nav = if is_json(path) {
        Nav::from_json(path)
    } else {
        Nav::from_binary(path)
    };
    nav.with_context(|| format!("Failed to load navigation graph {}", path.display()))
}

fn bake(mesh_path: &Path, output: &Path, cache_dir: Option<&Path>, scene_args: &SceneArgs) -> Result<()> {
    let mesh = PolygonMeshData::from_json(mesh_path)
        .with_context(|| format!("Failed to read mesh {}", mesh_path.display()))?;
    let config = load_config(scene_args, None)?;
    let scene = load_scene(scene_args)?;
    let caster = scene.as_ref().map(|checker| checker as &dyn RayCaster);

    let nav = match cache_dir {
        Some(dir) => Nav::load_or_build(&mesh, &config, caster, dir)?,
        None => Nav::build(&mesh, &config, caster),
    };

    if is_json(output) {
        nav.save_to_json(output)?;
    } else {
        nav.save_to_binary(output)?;
    }
    let links: usize = nav.nodes.iter().map(|node| node.off_mesh_links.len()).sum();
    println!(
        "Baked {} nodes ({links} off-mesh links) to {}",
        nav.len(),
        output.display()
    );
    Ok(())
}

fn single_path(
    graph: &Path,
    start: Position,
    end: Position,
    output: Option<&Path>,
    scene_args: &SceneArgs,
    smoothing: &SmoothingArgs,
) -> Result<()> {
    let nav = load_graph(graph)?;
    let config = load_config(scene_args, Some(smoothing))?;
    let scene = load_scene(scene_args)?;
    let caster = scene.as_ref().map(|checker| checker as &dyn RayCaster);

    let path = plan_path(&nav, &config, caster, &start, &end)
        .ok_or_else(|| anyhow!("No path from {start:?} to {end:?}"))?;
    info!(
        "Found path over {} nodes with cost {:.2}",
        path.nodes.len(),
        path.cost
    );

    match output {
        Some(output) => path.save_to_json(output)?,
        None => println!("{}", serde_json::to_string_pretty(&path)?),
    }
    Ok(())
}

fn batch(
    graph: &Path,
    requests_path: &Path,
    output: &Path,
    scene_args: &SceneArgs,
    smoothing: &SmoothingArgs,
) -> Result<()> {
    let nav = load_graph(graph)?;
    let config = load_config(scene_args, Some(smoothing))?;
    let scene = load_scene(scene_args)?;
    let caster = scene.as_ref().map(|checker| checker as &dyn RayCaster);

    let file = File::open(requests_path)
        .with_context(|| format!("Failed to open requests {}", requests_path.display()))?;
    let requests: Vec<PathRequest> = serde_json::from_reader(file)?;

    let tqdm_config = Config::new().with_leave(true);
    let paths: Vec<Option<NavigationPath>> = requests
        .par_iter()
        .tqdm_config(tqdm_config.with_desc("Planning paths"))
        .map(|request| plan_path(&nav, &config, caster, &request.start, &request.end))
        .collect();

    let found = paths.iter().filter(|path| path.is_some()).count();
    let mut file = create_file_with_parents(output)?;
    serde_json::to_writer(&mut file, &paths)?;
    println!("Planned {found}/{} paths", paths.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = &cli.log_level {
        logger.parse_filters(level);
    }
    logger.init();

    match cli.command {
        Commands::Bake {
            mesh,
            output,
            cache_dir,
            scene,
        } => bake(&mesh, &output, cache_dir.as_deref(), &scene),
        Commands::Path {
            graph,
            start,
            end,
            output,
            scene,
            smoothing,
        } => single_path(&graph, start, end, output.as_deref(), &scene, &smoothing),
        Commands::Batch {
            graph,
            requests,
            output,
            scene,
            smoothing,
        } => batch(&graph, &requests, &output, &scene, &smoothing),
    }
}
