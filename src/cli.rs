use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::constants::DEFAULT_CHUNK_LEN;
use crate::nearest_root::ReachabilityOptions;
use crate::util::parse_object_id;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
pub enum ExportFormat {
    Csv,
    Parquet,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
#[clap(rename_all = "kebab-case")]
pub enum Workload {
    LinkedList,
    BinaryTree,
    FanIn,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Heap dump (.binpb.zst)
    #[arg(required = true)]
    pub path: PathBuf,

    /// 64-bit values held in memory per buffer before spilling
    #[arg(long, default_value_t = DEFAULT_CHUNK_LEN)]
    pub chunk_len: usize,

    #[arg(long)]
    pub spill_dir: Option<PathBuf>,

    /// Reachability state file, restored if it exists and written otherwise
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    pub fn options(&self) -> ReachabilityOptions {
        ReachabilityOptions {
            chunk_len: self.chunk_len,
            spill_dir: self.spill_dir.clone(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PathArgs {
    /// Object ids, hex with a 0x prefix or decimal
    #[arg(required = true, value_parser = parse_object_id)]
    pub ids: Vec<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    #[arg(short, long)]
    pub output_path: PathBuf,
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct SynthesizeArgs {
    #[arg(short, long, value_enum)]
    pub workload: Workload,
    /// List length, tree depth or fan-in width
    #[arg(short, long, default_value_t = 16)]
    pub size: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute nearest GC roots and print statistics
    Compute,
    /// Print the path from each object to its nearest GC root
    Path(PathArgs),
    /// Export reachability records
    Export(ExportArgs),
    /// Write a synthetic heap dump to the heap dump path
    Synthesize(SynthesizeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_ids() {
        let args = Args::parse_from(["gcroots", "dump.binpb.zst", "path", "0x1010", "4128"]);
        assert_eq!(args.options().chunk_len, DEFAULT_CHUNK_LEN);
        match args.command {
            Commands::Path(p) => assert_eq!(p.ids, vec![0x1010, 4128]),
            c => panic!("unexpected command {:?}", c),
        }
    }

    #[test]
    fn test_parse_options() {
        let args = Args::parse_from([
            "gcroots",
            "dump.binpb.zst",
            "--chunk-len",
            "64",
            "--spill-dir",
            "/tmp",
            "export",
            "-o",
            "out.parquet",
            "-f",
            "parquet",
        ]);
        let options = args.options();
        assert_eq!(options.chunk_len, 64);
        assert_eq!(options.spill_dir, Some(PathBuf::from("/tmp")));
        assert!(matches!(
            args.command,
            Commands::Export(ExportArgs {
                format: ExportFormat::Parquet,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_synthesize() {
        let args = Args::parse_from([
            "gcroots",
            "tree.binpb.zst",
            "synthesize",
            "-w",
            "binary-tree",
            "-s",
            "4",
        ]);
        assert!(matches!(
            args.command,
            Commands::Synthesize(SynthesizeArgs {
                workload: Workload::BinaryTree,
                size: 4
            })
        ));
    }
}
