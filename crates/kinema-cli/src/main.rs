//! kinema CLI - assembly solver front end
//!
//! Solves, simulates and exports kinema assembly documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kinema::{AssemblySolver, Settings};
use kinema_ir::Document;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "kinema")]
#[command(about = "Assembly constraint solver", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve an assembly and write the solved document
    Solve {
        /// Input document (.json)
        input: PathBuf,
        /// Output document (default: overwrite input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a named simulation and dump every frame
    Simulate {
        /// Input document (.json)
        input: PathBuf,
        /// Simulation name
        name: String,
        /// Dump only this frame
        #[arg(short, long)]
        frame: Option<usize>,
        /// Output frames file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the solver model in ASMT text form
    Export {
        /// Input document (.json)
        input: PathBuf,
        /// Output .asmt file
        output: PathBuf,
    },
    /// Display information about an assembly document
    Info {
        /// Path to the document
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinema=info,kinema_solver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Solve { input, output } => {
            solve_file(&input, output.as_deref().unwrap_or(input.as_path()), &settings)?;
        }
        Commands::Simulate {
            input,
            name,
            frame,
            output,
        } => {
            simulate_file(&input, &name, frame, output.as_deref(), &settings)?;
        }
        Commands::Export { input, output } => {
            export_file(&input, &output, &settings)?;
        }
        Commands::Info { file } => {
            show_info(&file)?;
        }
    }

    Ok(())
}

fn load_document(path: &Path) -> Result<Document> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc = Document::from_json(&json)?;
    tracing::debug!(
        "loaded {}: {} objects, {} joints",
        path.display(),
        doc.objects.len(),
        doc.joints.len()
    );
    Ok(doc)
}

fn solve_file(input: &Path, output: &Path, settings: &Settings) -> Result<()> {
    let doc = load_document(input)?;
    let mut solver = AssemblySolver::from_settings(doc, settings);
    let result = solver.solve();
    let code = kinema::status_code(&result);
    result.with_context(|| format!("solve failed with status {code}"))?;

    let doc = solver.into_document();
    fs::write(output, doc.to_json()?)?;
    println!("Solved assembly written to {}", output.display());
    Ok(())
}

/// One recorded frame: object id → position and yaw/pitch/roll in degrees.
#[derive(Serialize)]
struct FrameRecord {
    index: usize,
    placements: BTreeMap<String, PlacementRecord>,
}

#[derive(Serialize)]
struct PlacementRecord {
    position: [f64; 3],
    yaw_pitch_roll: [f64; 3],
}

fn simulate_file(
    input: &Path,
    name: &str,
    frame: Option<usize>,
    output: Option<&Path>,
    settings: &Settings,
) -> Result<()> {
    let doc = load_document(input)?;
    let mut solver = AssemblySolver::from_settings(doc, settings);
    solver.generate_simulation(name)?;

    let indices = match frame {
        Some(index) => index..index + 1,
        None => 0..solver.number_of_frames(),
    };
    let mut frames = Vec::with_capacity(indices.len());
    for index in indices {
        solver.update_for_frame(index)?;
        let placements = solver
            .arena()
            .iter()
            .filter_map(|(id, _)| {
                let plc = solver.document().placement(id)?;
                let p = plc.position();
                let (yaw, pitch, roll) = plc.yaw_pitch_roll();
                Some((
                    id.clone(),
                    PlacementRecord {
                        position: [p.x, p.y, p.z],
                        yaw_pitch_roll: [yaw.to_degrees(), pitch.to_degrees(), roll.to_degrees()],
                    },
                ))
            })
            .collect();
        frames.push(FrameRecord { index, placements });
    }

    let json = serde_json::to_string_pretty(&frames)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            println!("Wrote {} frames to {}", frames.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn export_file(input: &Path, output: &Path, settings: &Settings) -> Result<()> {
    let doc = load_document(input)?;
    let mut solver = AssemblySolver::from_settings(doc, settings);
    solver.export_as_asmt(output)?;
    println!("Exported ASMT to {}", output.display());
    Ok(())
}

fn show_info(file: &Path) -> Result<()> {
    let doc = load_document(file)?;
    let solver = AssemblySolver::new(doc, kinema_solver::RapierEngine::new());
    let doc = solver.document();

    println!("kinema document: {}", file.display());
    println!("  Version: {}", doc.version);
    println!("  Assembly: {}", doc.assembly);
    println!("  Objects: {}", doc.objects.len());
    println!("  Joints: {}", doc.joints.len());
    println!("  Motions: {}", doc.motions.len());
    println!("  Simulations: {}", doc.simulations.len());

    let grounded = solver.grounded_parts();
    if grounded.is_empty() {
        println!("\nNo grounded part: the assembly cannot be solved.");
    } else {
        println!("\nGrounded:");
        for part in &grounded {
            println!("  {part}");
        }
    }

    let active = solver.active_joints();
    if !active.edges.is_empty() {
        println!("\nJoints:");
        for edge in &active.edges {
            let state = if solver.is_part_connected(&edge.part1) {
                ""
            } else {
                " (unconnected)"
            };
            println!(
                "  {}: {:?} {} - {}{}",
                edge.name, edge.joint_type, edge.part1, edge.part2, state
            );
        }
    }
    for name in &active.rejected {
        println!("  {name}: bad endpoints, ignored");
    }

    Ok(())
}
