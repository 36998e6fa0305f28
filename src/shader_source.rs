//! GPU program sources.
//!
//! Every pass is one fragment program sharing a fullscreen vertex program.
//! Sources come from embedded defaults, optionally overridden by `.wgsl`
//! files in a directory, and the pipeline is only constructed once all of
//! them are present.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::render_graph::ProgramLayout;

/// Name of the vertex program shared by all passes.
pub const VERTEX: &str = "vertex";

/// Every source the pipeline needs.
pub const REQUIRED: [&str; 6] = [VERTEX, "tracer", "accumulate", "variance", "wavelet", "draw"];

/// Program source texts keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ShaderSources {
    sources: BTreeMap<String, String>,
}

impl ShaderSources {
    /// An empty set; sources are added as the loader delivers them.
    pub fn new() -> Self {
        Self::default()
    }

    /// The programs compiled into the binary.
    pub fn embedded() -> Self {
        let mut sources = Self::new();
        sources.insert(VERTEX, include_str!("shaders/vertex.wgsl"));
        sources.insert("tracer", include_str!("shaders/tracer.wgsl"));
        sources.insert("accumulate", include_str!("shaders/accumulate.wgsl"));
        sources.insert("variance", include_str!("shaders/variance.wgsl"));
        sources.insert("wavelet", include_str!("shaders/wavelet.wgsl"));
        sources.insert("draw", include_str!("shaders/draw.wgsl"));
        sources
    }

    /// Embedded programs, overridden by any `<name>.wgsl` found in `dir`.
    pub fn with_overrides(dir: impl AsRef<Path>) -> Result<Self> {
        let mut sources = Self::embedded();
        for name in REQUIRED {
            let path = dir.as_ref().join(format!("{name}.wgsl"));
            if path.is_file() {
                sources.insert(name, fs::read_to_string(&path)?);
                tracing::info!(program = name, path = %path.display(), "using program override");
            }
        }
        Ok(sources)
    }

    pub fn insert(&mut self, name: &str, source: impl Into<String>) {
        self.sources.insert(name.to_string(), source.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    /// Required sources not delivered yet.
    pub fn missing(&self) -> Vec<&'static str> {
        REQUIRED
            .iter()
            .copied()
            .filter(|name| !self.sources.contains_key(*name))
            .collect()
    }

    /// Fail unless every required source is present.
    pub fn require_all(&self) -> Result<()> {
        match self.missing().first() {
            Some(name) => Err(PipelineError::MissingSource((*name).to_string())),
            None => Ok(()),
        }
    }

    /// Full source for a program: generated bindings, vertex and fragment stage.
    pub fn program(&self, layout: &ProgramLayout) -> Result<String> {
        let name = layout.kind.source_name();
        let vertex = self
            .get(VERTEX)
            .ok_or_else(|| PipelineError::MissingSource(VERTEX.to_string()))?;
        let fragment = self
            .get(name)
            .ok_or_else(|| PipelineError::MissingSource(name.to_string()))?;
        Ok(format!("{}\n{vertex}\n{fragment}", layout.prelude()))
    }
}
