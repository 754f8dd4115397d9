// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use airway_laplace::boundary::DEFAULT_REGION_RADIUS;
use airway_laplace::components::Connectivity;
use airway_laplace::io;
use airway_laplace::labels::{BoundaryConditions, LabelScheme};
use airway_laplace::landmarks::{trachea_plane_at_carina, CuttingPlane, NasalLandmarks};
use airway_laplace::pipeline::{AirwayLaplaceSolver, LaplaceEquationSolver, LaplaceSolution};
use airway_laplace::region::{Sphere, WindowShape};

#[derive(Parser)]
#[command(
    name = "airway-laplace",
    about = "Laplace potential between the nose and trachea of an airway segmentation"
)]
struct Cli {
    /// Segmentation volume (.npy or .mat); nonzero voxels are airway
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// MAT variable holding the volume (defaults to the file's only array)
    #[arg(long)]
    mat_variable: Option<String>,

    /// Output field path (.npy or .mat)
    #[arg(short = 'o', long, default_value = "laplace.npy")]
    output: PathBuf,

    /// Also write the boundary label grid here (.npy or .mat)
    #[arg(long)]
    labels_output: Option<PathBuf>,

    /// Also write the mask of voxels whose potential lies between the boundary values
    #[arg(long)]
    mask_output: Option<PathBuf>,

    /// Voxel spacing in mm, comma-separated x,y,z
    #[arg(long, default_value = "1,1,1")]
    spacing: String,

    /// Physical position of voxel (0,0,0), comma-separated x,y,z
    #[arg(long, default_value = "0,0,0")]
    origin: String,

    /// Nose landmark point x,y,z
    #[arg(long)]
    nasal_point: Option<String>,

    /// Head of the nose plane normal, x,y,z (normal = head - point)
    #[arg(long)]
    nasal_vector_head: Option<String>,

    /// Nose plane from landmarks: spine, tip, columella, left ala, right ala (15 values)
    #[arg(long, conflicts_with_all = ["nasal_point", "nasal_vector_head"])]
    nasal_landmarks: Option<String>,

    /// Trachea landmark point x,y,z
    #[arg(long)]
    tracheal_point: Option<String>,

    /// Head of the trachea plane normal, x,y,z (normal = head - point)
    #[arg(long)]
    tracheal_vector_head: Option<String>,

    /// Trachea plane through the carina, facing +z
    #[arg(long, conflicts_with_all = ["tracheal_point", "tracheal_vector_head"])]
    carina: Option<String>,

    /// Half-width in mm of the window around each landmark
    #[arg(long, default_value_t = DEFAULT_REGION_RADIUS)]
    region_radius: f64,

    /// Use a spherical landmark window instead of a box
    #[arg(long)]
    sphere_window: bool,

    /// Input is already labeled; skip boundary labeling
    #[arg(long)]
    prelabeled: bool,

    /// Keep only the largest connected region of the segmentation
    #[arg(long)]
    largest_component: bool,

    /// Clear the segmentation inside a sphere before labeling, x,y,z,radius (repeatable)
    #[arg(long = "exclude-sphere", value_name = "X,Y,Z,R")]
    exclude_spheres: Vec<String>,

    /// Use 6-connectivity for --largest-component (default 26)
    #[arg(long, requires = "largest_component")]
    face_connectivity: bool,

    /// Label of voxels to solve for
    #[arg(long, default_value = "11")]
    solution_label: i32,

    /// Label of zero-flux boundary voxels
    #[arg(long, default_value = "6")]
    neumann_label: i32,

    /// Label of nose boundary voxels
    #[arg(long, default_value = "4")]
    nose_label: i32,

    /// Label of trachea boundary voxels
    #[arg(long, default_value = "5")]
    trachea_label: i32,

    /// Fixed potential on the nose boundary
    #[arg(long, default_value = "0.0")]
    nose_value: f64,

    /// Fixed potential on the trachea boundary
    #[arg(long, default_value = "1.0")]
    trachea_value: f64,

    /// Relative residual tolerance
    #[arg(short = 't', long, default_value = "1e-10")]
    tolerance: f64,

    /// Iteration cap (default: twice the number of unknowns)
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,
}

fn parse_floats(s: &str, flag: &str, count: usize) -> Result<Vec<f64>> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: expected comma-separated numbers", flag))?;
    if parts.len() != count {
        bail!("--{} has {} components, expected {}", flag, parts.len(), count);
    }
    Ok(parts)
}

fn parse_point(s: &str, flag: &str) -> Result<[f64; 3]> {
    let p = parse_floats(s, flag, 3)?;
    Ok([p[0], p[1], p[2]])
}

fn nose_plane(cli: &Cli) -> Result<CuttingPlane> {
    if let Some(s) = &cli.nasal_landmarks {
        let v = parse_floats(s, "nasal-landmarks", 15)?;
        let at = |i: usize| [v[3 * i], v[3 * i + 1], v[3 * i + 2]];
        let landmarks = NasalLandmarks {
            nasal_spine: at(0),
            nose_tip: at(1),
            columella: at(2),
            left_ala_rim: at(3),
            right_ala_rim: at(4),
        };
        return landmarks.plane().context("nose plane");
    }
    match (&cli.nasal_point, &cli.nasal_vector_head) {
        (Some(point), Some(head)) => CuttingPlane::from_vector_head(
            parse_point(point, "nasal-point")?,
            parse_point(head, "nasal-vector-head")?,
        )
        .context("nose plane"),
        _ => bail!(
            "the nose plane needs --nasal-point and --nasal-vector-head, or --nasal-landmarks"
        ),
    }
}

fn trachea_plane(cli: &Cli) -> Result<CuttingPlane> {
    if let Some(s) = &cli.carina {
        return trachea_plane_at_carina(parse_point(s, "carina")?).context("trachea plane");
    }
    match (&cli.tracheal_point, &cli.tracheal_vector_head) {
        (Some(point), Some(head)) => CuttingPlane::from_vector_head(
            parse_point(point, "tracheal-point")?,
            parse_point(head, "tracheal-vector-head")?,
        )
        .context("trachea plane"),
        _ => bail!(
            "the trachea plane needs --tracheal-point and --tracheal-vector-head, or --carina"
        ),
    }
}

fn label_scheme(cli: &Cli) -> LabelScheme {
    LabelScheme {
        solution: cli.solution_label,
        neumann: cli.neumann_label,
        nose: cli.nose_label,
        trachea: cli.trachea_label,
        ..LabelScheme::default()
    }
}

fn solve_prelabeled(cli: &Cli, labels: &airway_laplace::VoxelGrid<i32>) -> Result<LaplaceSolution> {
    let conditions =
        BoundaryConditions::from_scheme(&label_scheme(cli), cli.nose_value, cli.trachea_value)?;
    let mut solver = LaplaceEquationSolver::new(conditions).with_tolerance(cli.tolerance)?;
    if let Some(max_iterations) = cli.max_iterations {
        solver = solver.with_max_iterations(max_iterations);
    }
    if let Some(threads) = cli.threads {
        solver = solver.with_threads(threads);
    }
    Ok(solver.solve(labels)?)
}

fn solve_segmentation(
    cli: &Cli,
    segmentation: &airway_laplace::VoxelGrid<i32>,
) -> Result<LaplaceSolution> {
    let mut solver = AirwayLaplaceSolver::new(nose_plane(cli)?, trachea_plane(cli)?)
        .with_labels(label_scheme(cli))?
        .with_region_radius(cli.region_radius)?
        .with_nose_value(cli.nose_value)?
        .with_trachea_value(cli.trachea_value)?
        .with_tolerance(cli.tolerance)?;
    if cli.sphere_window {
        solver = solver.with_window_shape(WindowShape::Sphere);
    }
    for s in &cli.exclude_spheres {
        let v = parse_floats(s, "exclude-sphere", 4)?;
        let sphere = Sphere::new([v[0], v[1], v[2]], v[3]).context("excluded sphere")?;
        solver = solver.with_excluded_sphere(sphere);
    }
    if cli.largest_component {
        let connectivity = if cli.face_connectivity {
            Connectivity::Face
        } else {
            Connectivity::Full
        };
        solver = solver.with_largest_component(connectivity);
    }
    if let Some(max_iterations) = cli.max_iterations {
        solver = solver.with_max_iterations(max_iterations);
    }
    if let Some(threads) = cli.threads {
        solver = solver.with_threads(threads);
    }

    let (labels, solution) = solver.solve_with_labels(segmentation)?;
    if let Some(path) = &cli.labels_output {
        io::save_labels(&labels.labels, path)
            .with_context(|| format!("writing labels to {}", path.display()))?;
        log::info!("wrote labels to {}", path.display());
    }
    Ok(solution)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.threads == Some(0) {
        bail!("--threads must be at least 1");
    }
    if cli.prelabeled && cli.labels_output.is_some() {
        bail!("--labels-output has no effect with --prelabeled");
    }
    if cli.prelabeled && !cli.exclude_spheres.is_empty() {
        bail!("--exclude-sphere has no effect with --prelabeled");
    }

    let spacing = parse_point(&cli.spacing, "spacing")?;
    let origin = parse_point(&cli.origin, "origin")?;
    let volume = io::load_grid(&cli.input, cli.mat_variable.as_deref(), spacing, origin)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    log::info!(
        "loaded {:?} volume from {}",
        volume.shape(),
        cli.input.display()
    );

    let solution = if cli.prelabeled {
        solve_prelabeled(&cli, &volume)?
    } else {
        solve_segmentation(&cli, &volume)?
    };

    io::save_field(&solution.field, &cli.output)
        .with_context(|| format!("writing field to {}", cli.output.display()))?;
    log::info!(
        "wrote field ({} unknowns, {} iterations) to {}",
        solution.num_unknowns,
        solution.iterations,
        cli.output.display()
    );

    if let Some(path) = &cli.mask_output {
        let lo = cli.nose_value.min(cli.trachea_value);
        let hi = cli.nose_value.max(cli.trachea_value);
        let mask = solution.field.threshold_mask(lo, hi).map(|&m| i32::from(m));
        io::save_labels(&mask, path)
            .with_context(|| format!("writing mask to {}", path.display()))?;
    }

    Ok(())
}
