use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use polars::prelude::*;

use crate::cli::ExportFormat;
use crate::object_model::MemoryIndex;

pub fn export(index: &MemoryIndex, format: ExportFormat, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    match format {
        ExportFormat::Csv => {
            let mut out = BufWriter::new(file);
            export_csv(index, &mut out)?;
            out.flush()?;
        }
        ExportFormat::Parquet => export_parquet(index, file)?,
    }
    info!(
        "Exported {} reachability records to {}",
        index.len(),
        output_path.display()
    );
    Ok(())
}

/// One line per record, retained seeds as raw values (0 unset, -1 pending)
pub fn export_csv<W: Write>(index: &MemoryIndex, out: &mut W) -> Result<()> {
    writeln!(out, "id,offset,nearest_root,references,leaf,retained")?;
    for (id, e) in index.iter() {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            id,
            e.offset(),
            e.nearest_root_pointer(),
            e.reference_count(),
            e.is_leaf() as u8,
            e.retained_seed().to_raw()
        )?;
    }
    Ok(())
}

pub fn export_parquet(index: &MemoryIndex, file: File) -> Result<()> {
    let mut df = records_frame(index)?;
    df.as_single_chunk_par();
    let writer = ParquetWriter::new(file);
    writer.finish(&mut df)?;
    Ok(())
}

fn records_frame(index: &MemoryIndex) -> PolarsResult<DataFrame> {
    let len = index.len();
    let mut ids = Vec::with_capacity(len);
    let mut offsets = Vec::with_capacity(len);
    let mut nearest_roots = Vec::with_capacity(len);
    let mut references = Vec::with_capacity(len);
    let mut leaves = Vec::with_capacity(len);
    let mut retained = Vec::with_capacity(len);
    for (id, e) in index.iter() {
        ids.push(id);
        offsets.push(e.offset());
        nearest_roots.push(e.nearest_root_pointer());
        references.push(e.reference_count());
        leaves.push(e.is_leaf());
        retained.push(e.retained_seed().to_raw());
    }
    df! {
        "id" => ids,
        "offset" => offsets,
        "nearest_root" => nearest_roots,
        "references" => references,
        "leaf" => leaves,
        "retained" => retained
    }
}
