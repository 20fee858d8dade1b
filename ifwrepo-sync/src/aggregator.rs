//! Manifest aggregator: the only state shared between cells.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use ifwrepo_core::{ApplicationHeader, Manifest, PackageDescriptor};
use ifwrepo_renderer::ManifestRenderer;

use crate::error::SyncError;

/// Collects descriptors from concurrently running cells.
///
/// Entries keep the order of [`add`](Self::add) calls. `has_new_work` is true
/// once any cell reports a freshly built archive; reused archives contribute
/// an entry but never set it.
#[derive(Debug)]
pub struct ManifestAggregator {
    header: ApplicationHeader,
    packages: Mutex<Vec<PackageDescriptor>>,
    new_work: AtomicBool,
}

impl ManifestAggregator {
    pub fn new(header: ApplicationHeader) -> Self {
        ManifestAggregator {
            header,
            packages: Mutex::new(Vec::new()),
            new_work: AtomicBool::new(false),
        }
    }

    pub fn add(&self, descriptor: PackageDescriptor, is_new: bool) {
        // Poisoning only means some cell panicked; the list itself is intact.
        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(descriptor);
        if is_new {
            self.new_work.store(true, Ordering::SeqCst);
        }
    }

    pub fn has_new_work(&self) -> bool {
        self.new_work.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the header and every entry added so far.
    pub fn manifest(&self) -> Manifest {
        let packages = self
            .packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Manifest {
            header: self.header.clone(),
            packages,
        }
    }

    pub fn render(&self, renderer: &ManifestRenderer) -> Result<String, SyncError> {
        Ok(renderer.render(&self.manifest())?)
    }
}
