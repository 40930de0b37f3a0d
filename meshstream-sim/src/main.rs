//! Command-line simulator for the meshstream block mesh scheduler.
//!
//! Walks a simulated viewer in a circle through a simulated scanning service's block grid,
//! meshing blocks on a background thread, and reports what the scheduler did.

// Crate-specific lint settings. (General settings can be found in the workspace manifest.)
#![forbid(unsafe_code)]

use std::thread;

use anyhow::Context as _;
use clap::Parser as _;

use meshstream::math::{FreeCoordinate, FreePoint, Rotation};
use meshstream::time::{Instant, TimeStats};
use meshstream::{BlockMeshStream, SceneChange, StreamUpdateInfo, ViewerTransform};
use meshstream_base::util::{Refmt as _, StatusText};

mod command_options;
use command_options::{SimArgs, next_level_of_detail};
mod logging;
mod scanner;
use scanner::Scanner;
mod worker;
use worker::{SimMesh, ThreadedGenerator};

/// Running totals of what the scene sink was told.
#[derive(Clone, Debug, Default)]
struct SceneTotals {
    added: usize,
    updated: usize,
    removed: usize,
    cleared: usize,
}

fn main() -> Result<(), anyhow::Error> {
    let args = SimArgs::parse();
    logging::install(&args.logging)?;

    let scanner = Scanner::new(args.seed, args.block_size, args.churn()?);
    let generator =
        ThreadedGenerator::new(args.latency()).context("failed to start mesh generator")?;
    let mut stream = BlockMeshStream::new(
        scanner,
        generator,
        args.stream_config(),
        args.mesh_settings(),
    );
    stream.start();

    let mut totals = SceneTotals::default();
    let mut sink = |change: SceneChange<'_, SimMesh>| match change {
        SceneChange::Added(_) => totals.added += 1,
        SceneChange::Updated(_) => totals.updated += 1,
        SceneChange::Removed(_) => totals.removed += 1,
        SceneChange::Cleared => totals.cleared += 1,
        _ => {}
    };

    let mut batch_latency = TimeStats::default();
    let mut last_info = StreamUpdateInfo::default();
    let start_time = Instant::now();
    for tick in 0..args.ticks {
        if args.change_settings_at == Some(tick) {
            let lod = next_level_of_detail(stream.settings().level_of_detail);
            log::info!("tick {tick}: changing level of detail to {lod:?}");
            stream.set_level_of_detail(lod);
        }

        let viewer = viewer_at(tick, args.ticks, args.radius);
        let info = stream
            .tick(&viewer, Instant::now(), &mut sink)
            .with_context(|| format!("scheduler halted at tick {tick}"))?;
        log::debug!("tick {tick}:\n{}", info.refmt(&StatusText));
        batch_latency += info.batch_latency;
        last_info = info;

        thread::sleep(args.tick_length());
    }
    let elapsed = start_time.elapsed();

    let resolved = stream.scene().len();
    let triangles: usize = stream.scene().iter().map(|e| e.geometry.triangles).sum();
    let queries = stream.source().queries();
    let SceneTotals {
        added,
        updated,
        removed,
        cleared,
    } = totals;
    println!(
        "{ticks} ticks in {elapsed:.2?}: {queries} polls, {added} added, {updated} updated, \
        {removed} removed, {cleared} cleared",
        ticks = args.ticks,
    );
    println!("{resolved} blocks resolved, {triangles} triangles");
    println!("batch latency {batch_latency}");
    println!("{}", last_info.refmt(&StatusText));
    Ok(())
}

/// Position and orientation of the viewer at `tick`, walking once around a circle of
/// `radius` over `ticks` ticks while facing along the path.
fn viewer_at(tick: usize, ticks: usize, radius: FreeCoordinate) -> ViewerTransform {
    let angle = euclid::Angle::two_pi() * (tick as FreeCoordinate / ticks.max(1) as FreeCoordinate);
    ViewerTransform {
        position: FreePoint::new(radius * angle.radians.cos(), 0.0, radius * angle.radians.sin()),
        rotation: Rotation::around_y(-angle),
    }
}
