// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use distcarto::cartogram::{CartogramBuilder, MeshKind};
use distcarto::config::CartogramConfig;
use distcarto::geometry::{BoundingBox, Point};
use distcarto::io;
use distcarto::solver::{ConvergenceCriterion, ProgressInfo};

#[derive(Parser)]
#[command(
    name = "distcarto",
    version,
    about = "Grid-relaxation deformation field for distance cartograms"
)]
struct Cli {
    /// Source control points, an [n, 2] array (.npy or .mat)
    #[arg(long)]
    sources: PathBuf,

    /// Target control points, an [n, 2] array (.npy or .mat)
    #[arg(long)]
    targets: PathBuf,

    /// Variable holding the sources inside a .mat file
    #[arg(long, default_value = "sources")]
    sources_var: String,

    /// Variable holding the targets inside a .mat file
    #[arg(long, default_value = "targets")]
    targets_var: String,

    /// Lattice bounds as minx,miny,maxx,maxy (defaults to the sources' extent)
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<String>,

    /// TOML configuration file; command line flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Lattice precision (larger is finer)
    #[arg(short = 'p', long)]
    precision: Option<f64>,

    /// Fixed number of outer iterations (default: round(4 * sqrt(n)))
    #[arg(long)]
    iterations: Option<usize>,

    /// Cap on smoothing sweeps per outer iteration
    #[arg(long)]
    max_sweeps: Option<usize>,

    /// Smoothing tolerance
    #[arg(short = 't', long)]
    tolerance: Option<f64>,

    /// Smoothing stop test: "area-normalized" or "resolution-relative"
    #[arg(long)]
    criterion: Option<String>,

    /// Output file for the deformed lattice field, [height, width, 2]
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output file for the undeformed lattice field, [height, width, 2]
    #[arg(long)]
    source_grid: Option<PathBuf>,

    /// Output file for the lattice cells as closed quads, [cells, 5, 2]
    #[arg(long)]
    mesh: Option<PathBuf>,

    /// Node positions used for --mesh: "source" or "deformed"
    #[arg(long, default_value = "deformed")]
    mesh_kind: String,

    /// Output file for the realized control positions, [n, 2]
    #[arg(long)]
    realized: Option<PathBuf>,

    /// Write a JSON summary of the solve to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Point to map through the field, as x,y (repeatable); printed to stdout
    #[arg(long, num_args = 1, allow_hyphen_values = true)]
    query: Vec<String>,

    /// Number of Rayon worker threads for transforms
    #[arg(long)]
    threads: Option<usize>,

    /// Print per-iteration progress to stderr
    #[arg(long)]
    progress: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_floats(s: &str, count: usize, flag: &str) -> Result<Vec<f64>> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {}: expected comma-separated floats", flag))?;
    if parts.len() != count {
        bail!(
            "{} has {} components, expected {}",
            flag,
            parts.len(),
            count
        );
    }
    Ok(parts)
}

fn parse_bbox(s: &str) -> Result<BoundingBox> {
    let v = parse_floats(s, 4, "--bbox")?;
    let bbox = BoundingBox::from_array([v[0], v[1], v[2], v[3]]);
    if bbox.min_x >= bbox.max_x || bbox.min_y >= bbox.max_y {
        bail!("--bbox must satisfy minx < maxx and miny < maxy, got {}", s);
    }
    Ok(bbox)
}

fn parse_query(s: &str) -> Result<Point> {
    let v = parse_floats(s, 2, "--query")?;
    Ok(Point::new(v[0], v[1]))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> Result<CartogramConfig> {
    let mut config = match &cli.config {
        Some(path) => CartogramConfig::load(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => CartogramConfig::default(),
    };
    if let Some(precision) = cli.precision {
        config.precision = precision;
    }
    if let Some(threads) = cli.threads {
        config.threads = Some(threads);
    }
    if let Some(iterations) = cli.iterations {
        config.solver.iterations = Some(iterations);
    }
    if let Some(max_sweeps) = cli.max_sweeps {
        config.solver.max_sweeps = max_sweeps;
    }
    if let Some(tolerance) = cli.tolerance {
        config.solver.tolerance = tolerance;
    }
    if let Some(criterion) = &cli.criterion {
        config.solver.criterion = criterion.parse::<ConvergenceCriterion>()?;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let mesh_kind: MeshKind = cli.mesh_kind.parse()?;
    let queries = cli
        .query
        .iter()
        .map(|q| parse_query(q))
        .collect::<Result<Vec<_>>>()?;

    let sources = io::load_points(&cli.sources, &cli.sources_var)
        .with_context(|| format!("failed to load sources from {:?}", cli.sources))?;
    let targets = io::load_points(&cli.targets, &cli.targets_var)
        .with_context(|| format!("failed to load targets from {:?}", cli.targets))?;
    info!(points = sources.len(), "loaded control points");

    let mut solver = config.solver.build_solver()?;
    if cli.progress {
        solver = solver.with_progress(Box::new(|info: ProgressInfo| {
            eprintln!(
                "[{:.1}s] iteration {}/{} sweeps={} residual={:.3e}",
                info.elapsed.as_secs_f64(),
                info.iteration,
                info.total_iterations,
                info.sweeps,
                info.residual,
            );
        }));
    }

    let mut builder = CartogramBuilder::new(&sources, &targets)?
        .with_precision(config.precision)?
        .with_solver(solver);
    if let Some(bbox) = &cli.bbox {
        builder = builder.with_bounds(parse_bbox(bbox)?);
    }
    if let Some(threads) = config.threads {
        builder = builder.with_threads(threads);
    }
    let cartogram = builder.build()?;

    if let Some(path) = &cli.output {
        io::save_lattice(cartogram.lattice(), MeshKind::Deformed, path)
            .with_context(|| format!("failed to write deformed field to {:?}", path))?;
    }
    if let Some(path) = &cli.source_grid {
        io::save_lattice(cartogram.lattice(), MeshKind::Source, path)
            .with_context(|| format!("failed to write source field to {:?}", path))?;
    }
    if let Some(path) = &cli.mesh {
        io::save_mesh(&cartogram.mesh(mesh_kind), path)
            .with_context(|| format!("failed to write mesh to {:?}", path))?;
    }
    if let Some(path) = &cli.realized {
        io::save_points(&cartogram.realized_positions()?, path, "realized")
            .with_context(|| format!("failed to write realized points to {:?}", path))?;
    }

    let summary = cartogram.summary()?;
    info!(
        max_residual = summary.max_residual,
        mean_residual = summary.mean_residual,
        sweeps = summary.total_sweeps,
        "solve complete"
    );
    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {:?}", path))?;
    }

    for (q, mapped) in queries.iter().zip(cartogram.sample_many(&queries)?) {
        println!("{} {} -> {} {}", q.x, q.y, mapped.x, mapped.y);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_parse() {
        let cli = Cli::try_parse_from([
            "distcarto",
            "--sources",
            "a.npy",
            "--targets",
            "b.npy",
            "--bbox",
            "-50,-50,50,50",
            "--query",
            "-10,5",
            "--query",
            "-0.5,-7.25",
        ])
        .unwrap();

        let bbox = parse_bbox(cli.bbox.as_deref().unwrap()).unwrap();
        assert_eq!(bbox, BoundingBox::new(-50.0, -50.0, 50.0, 50.0));

        let queries: Vec<Point> = cli.query.iter().map(|q| parse_query(q).unwrap()).collect();
        assert_eq!(
            queries,
            vec![Point::new(-10.0, 5.0), Point::new(-0.5, -7.25)]
        );
    }

    #[test]
    fn malformed_bbox_rejected() {
        assert!(parse_bbox("-50,-50,50").is_err());
        assert!(parse_bbox("50,-50,-50,50").is_err());
        assert!(parse_query("1,two").is_err());
    }
}
