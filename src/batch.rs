use std::io::Write;

use tracing::info;

use crate::{
    diagnostics::{FailurePolicy, Result},
    driver::{self, Flow},
    environment::Namespace,
    host, loader,
};

/// Runs whole programs. Any failure is fatal to the run.
pub struct BatchRunner {
    namespace: Namespace,
}

impl BatchRunner {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    /// Loads `paths` as one buffer and runs it once.
    pub fn run_files<P: AsRef<str>>(&mut self, paths: &[P], out: &mut dyn Write) -> Result<Flow> {
        let source = loader::load_sources(paths)?;
        info!(files = paths.len(), "running batch");
        self.run_source(&source, out)
    }

    pub fn run_source(&mut self, source: &str, out: &mut dyn Write) -> Result<Flow> {
        let flow = driver::run_source(
            source,
            &mut self.namespace,
            out,
            FailurePolicy::Fatal,
            &mut driver::discard,
        )?;
        out.flush()?;
        Ok(flow)
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(host::prelude())
    }
}
