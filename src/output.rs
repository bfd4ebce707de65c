//! output.rs
//!
//! Writes the produced structures to disk as pretty-printed JSON. Field
//! naming lives on the data types themselves (serde renames), so this is
//! just buffered file plumbing.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs::File, io::BufWriter, path::Path};

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing {:?}", path))?;
    Ok(())
}
