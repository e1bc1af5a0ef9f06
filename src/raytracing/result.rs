use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::SelectionMethod;
use crate::error::{RaytracerError, Result};
use crate::geometry::Vector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathMethod {
    Direct,
    Reflection,
}

/// Obstructed columns of a path by class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObstructionCounts {
    pub ground: usize,
    pub vegetation: usize,
    pub infrastructure: usize,
}

impl ObstructionCounts {
    /// Classify per-column flags of the DGM, DOM_MASKED and DOM passes.
    ///
    /// Terrain wins over everything; a masked-surface hit is vegetation;
    /// what only the full surface blocks is infrastructure.
    pub fn classify(dgm: &[bool], masked: &[bool], dom: &[bool]) -> Self {
        let mut counts = Self::default();
        for i in 0..dgm.len() {
            let g = dgm[i];
            let m = masked.get(i).copied().unwrap_or(false);
            let d = dom.get(i).copied().unwrap_or(false);
            if g {
                counts.ground += 1;
            } else if m {
                counts.vegetation += 1;
            } else if d {
                counts.infrastructure += 1;
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.ground + self.vegetation + self.infrastructure
    }
}

impl std::ops::Add for ObstructionCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            ground: self.ground + rhs.ground,
            vegetation: self.vegetation + rhs.vegetation,
            infrastructure: self.infrastructure + rhs.infrastructure,
        }
    }
}

/// One evaluated path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaytracingResult {
    pub method: PathMethod,
    pub start: Vector,
    pub end: Vector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflect: Option<Vector>,
    pub distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflecting_polygon_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflecting_polygon_area: Option<f64>,
    pub selection_method: SelectionMethod,
    pub counts: ObstructionCounts,
}

/// Append-only JSON array of [`RaytracingResult`] records.
///
/// The closing bracket is written by [`ResultSink::finish`] or, failing
/// that, on drop.
pub struct ResultSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl ResultSink {
    pub fn create(path: &Path) -> Result<Self> {
        let sink_err = |e: std::io::Error| RaytracerError::Sink(format!("{}: {e}", path.display()));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(sink_err)?;
        }
        let mut writer = BufWriter::new(File::create(path).map_err(sink_err)?);
        writer.write_all(b"[").map_err(sink_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn append(&mut self, record: &RaytracingResult) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(RaytracerError::Sink(format!("{} already closed", self.path.display())));
        };
        let separator: &[u8] = if self.written == 0 { b"\n  " } else { b",\n  " };
        writer.write_all(separator)?;
        serde_json::to_writer(&mut *writer, record)
            .map_err(|e| RaytracerError::Sink(format!("{}: {e}", self.path.display())))?;
        self.written += 1;
        Ok(())
    }

    /// Close the array and flush; returns the number of records.
    pub fn finish(mut self) -> Result<usize> {
        self.close()?;
        Ok(self.written)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.write_all(b"\n]\n")?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close result sink");
        }
    }
}
