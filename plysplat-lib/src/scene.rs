use crate::error::Result;
use crate::structures::{Dataset, ParseOptions};
use log::info;
use std::sync::Arc;

/// Holder of the dataset currently on display.
///
/// A new dataset is installed only once it is completely built; the previous
/// one is handed back to the caller and released after the swap.
#[derive(Debug, Default)]
pub struct Scene {
    current: Option<Arc<Dataset>>,
    generation: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.current.as_ref()
    }

    /// Incremented on every successful install.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn install(&mut self, dataset: Dataset) -> Option<Arc<Dataset>> {
        self.install_shared(Arc::new(dataset))
    }

    pub fn install_shared(&mut self, dataset: Arc<Dataset>) -> Option<Arc<Dataset>> {
        let points = dataset.point_count();
        let previous = self.current.replace(dataset);
        self.generation += 1;
        info!("installed dataset #{} with {} points", self.generation, points);
        previous
    }

    /// Parses `raw_data` and installs the result. On failure the current
    /// dataset stays in place.
    pub fn load_bytes(&mut self, raw_data: &[u8], options: &ParseOptions) -> Result<Arc<Dataset>> {
        let dataset = Arc::new(crate::parse_splat_with(raw_data, options, |_| {})?);
        let previous = self.install_shared(Arc::clone(&dataset));
        drop(previous);
        Ok(dataset)
    }
}
