#[macro_use]
extern crate log;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use gcroots::cli::*;
use gcroots::*;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

type Gate = NearestGcRoot<DumpGraph, MemoryIndex>;

fn open_gate(args: &Args) -> Result<Gate> {
    let start = Instant::now();
    let HeapSnapshot { graph, index } = HeapSnapshot::open(&args.path)?;
    info!(
        "Finish loading the heapdump, {} objects and {} roots in {} ms",
        graph.object_count(),
        graph.roots().len(),
        start.elapsed().as_micros() as f64 / 1000f64
    );
    let state = match &args.state {
        Some(state) if state.exists() => state,
        _ => return Ok(NearestGcRoot::new(graph, index, args.options())),
    };
    let mut input = BufReader::new(File::open(state)?);
    let restored = MemoryIndex::read_from(&mut input)?;
    if restored.len() != index.len() {
        anyhow::bail!(
            "{} holds {} records but the heap dump has {} objects",
            state.display(),
            restored.len(),
            index.len()
        );
    }
    let gate = NearestGcRoot::read_from(graph, restored, args.options(), &mut input)?;
    info!(
        "Restored reachability state from {} (complete: {})",
        state.display(),
        gate.is_computed()
    );
    Ok(gate)
}

fn save_state(gate: &Gate, state: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(state)?);
    gate.index().write_to(&mut out)?;
    gate.write_to(&mut out)?;
    out.flush()?;
    info!("Saved reachability state to {}", state.display());
    Ok(())
}

fn compute(gate: &Gate) -> Result<()> {
    let start = Instant::now();
    let outputs = gate.compute_reachability()?;
    let elapsed = start.elapsed();
    if cfg!(debug_assertions) {
        let references = SpecialReferences::locate(gate.graph())?;
        let index = gate.index();
        let reachable = sanity_trace(gate.graph(), &*index, &references)?;
        info!(
            "Sanity trace reporting {} reachable objects",
            reachable.len()
        );
        assert_eq!(verify_nearest_roots(gate.graph(), &*index, &reachable), 0);
    }

    println!("============================ Tabulate Statistics ============================");
    match outputs.stats() {
        Some(stats) => {
            println!("objects\tlevels\texpanded\tclaimed\tleaves\tpending\tmulti_parents\tdangling\ttime");
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                gate.graph().object_count(),
                stats.levels,
                stats.expanded,
                stats.claimed,
                stats.leaves,
                stats.pending_parents,
                stats.multiple_parents,
                stats.dangling,
                elapsed.as_micros()
            );
        }
        None => {
            println!("objects\tpending\tmulti_parents");
            println!(
                "{}\t{}\t{}",
                gate.graph().object_count(),
                outputs.leaves().len(),
                outputs.multiple_parents().len()
            );
        }
    }
    println!("-------------------------- End Tabulate Statistics --------------------------");
    Ok(())
}

fn print_paths(gate: &Gate, ids: &[u64]) -> Result<()> {
    for &id in ids {
        match gate.path_to_root(id)? {
            Some(path) => {
                let chain: Vec<String> = path.iter().map(|o| format!("0x{:x}", o)).collect();
                let root = path.last().copied().unwrap_or(id);
                println!(
                    "{} ({})",
                    chain.join(" <- "),
                    gate.graph().root_kind(root).unwrap_or("unknown")
                );
            }
            None => println!("0x{:x} is not reachable from any GC root", id),
        }
    }
    Ok(())
}

fn synthesize(args: &Args, synthesize_args: SynthesizeArgs) -> Result<()> {
    let heapdump = match synthesize_args.workload {
        Workload::LinkedList => synthetic::linked_list(synthesize_args.size),
        Workload::BinaryTree => synthetic::binary_tree(synthesize_args.size as u32),
        Workload::FanIn => synthetic::fan_in(synthesize_args.size),
    };
    heapdump.to_binpb_zst(&args.path)?;
    info!(
        "Wrote {} objects to {}",
        heapdump.objects.len(),
        args.path.display()
    );
    Ok(())
}

fn get_git_info() -> String {
    match (built_info::GIT_COMMIT_HASH, built_info::GIT_DIRTY) {
        (Some(hash), Some(dirty)) => format!(
            "{}{}",
            hash.split_at(7).0,
            if dirty { "-dirty" } else { "" }
        ),
        (Some(hash), None) => format!("{}{}", hash.split_at(7).0, "-?"),
        _ => "unknown-git-version".to_string(),
    }
}

pub fn main() -> Result<()> {
    env_logger::init();
    println!("gcroots {}", get_git_info());
    let args = Args::parse();
    if let Commands::Synthesize(s) = &args.command {
        return synthesize(&args, *s);
    }
    let gate = open_gate(&args)?;
    match &args.command {
        Commands::Compute => compute(&gate)?,
        Commands::Path(p) => print_paths(&gate, &p.ids)?,
        Commands::Export(e) => {
            gate.compute_reachability()?;
            export::export(&gate.index(), e.format, &e.output_path)?;
        }
        Commands::Synthesize(_) => unreachable!(),
    }
    if let Some(state) = &args.state {
        if gate.is_computed() {
            save_state(&gate, state)?;
        }
    }
    Ok(())
}
