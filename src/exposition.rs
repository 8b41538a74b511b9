//! Exposition Layer
//!
//! Bridges the private instrument sets of collection units into one shared
//! Prometheus registry.
//!
//! - [`RegistryFragment`]: the instruments owned by one unit, registered as a
//!   single Prometheus collector
//! - [`SharedRegistry`]: the process-wide registry rendered at `/metrics`
//! - [`MergedFragment`]: handle for a merged fragment; unmerges on drop
//!
//! Merging or unmerging a fragment is one `register`/`unregister` call, so
//! concurrent units never observe a partially merged set.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts, Registry, TextEncoder};

use crate::schema::MetricKind;

/// A live metric vector.
#[derive(Clone, Debug)]
pub enum Instrument {
    Counter(CounterVec),
    Gauge(GaugeVec),
}

impl Instrument {
    /// Create an instrument with fixed variable label names.
    pub fn new(kind: MetricKind, opts: Opts, labels: &[&str]) -> Result<Self, prometheus::Error> {
        Ok(match kind {
            MetricKind::Counter => Self::Counter(CounterVec::new(opts, labels)?),
            MetricKind::Gauge => Self::Gauge(GaugeVec::new(opts, labels)?),
        })
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }

    fn collector(&self) -> &dyn Collector {
        match self {
            Self::Counter(c) => c,
            Self::Gauge(g) => g,
        }
    }
}

/// Instruments owned by one collection unit.
#[derive(Clone, Debug)]
pub struct RegistryFragment {
    name: String,
    instruments: Vec<Instrument>,
}

impl RegistryFragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruments: Vec::new(),
        }
    }

    /// Add an instrument.
    ///
    /// Fails if a descriptor with the same name and constant labels is
    /// already part of this fragment.
    pub fn add(&mut self, instrument: Instrument) -> Result<(), prometheus::Error> {
        for desc in instrument.collector().desc() {
            if self.desc().iter().any(|d| d.id == desc.id) {
                return Err(prometheus::Error::AlreadyReg);
            }
        }
        self.instruments.push(instrument);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl Collector for RegistryFragment {
    fn desc(&self) -> Vec<&Desc> {
        self.instruments
            .iter()
            .flat_map(|i| i.collector().desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.instruments
            .iter()
            .flat_map(|i| i.collector().collect())
            .collect()
    }
}

/// Process-wide exposition registry.
///
/// Cheap to clone; all clones share the same underlying registry.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    registry: Registry,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fragment into the registry.
    ///
    /// The fragment stays visible until the returned handle is unmerged or
    /// dropped.
    ///
    /// # Errors
    /// Fails without side effects if any of the fragment's metrics clashes
    /// with one already registered.
    pub fn merge(&self, fragment: RegistryFragment) -> Result<MergedFragment, prometheus::Error> {
        let name = fragment.name.clone();
        if fragment.is_empty() {
            tracing::debug!(fragment = %name, "Skipping empty registry fragment");
            return Ok(MergedFragment {
                registry: self.registry.clone(),
                name,
                fragment: None,
            });
        }

        self.registry.register(Box::new(fragment.clone()))?;
        tracing::debug!(fragment = %name, instruments = fragment.len(), "Registry fragment merged");
        Ok(MergedFragment {
            registry: self.registry.clone(),
            name,
            fragment: Some(fragment),
        })
    }

    /// Snapshot of every merged metric family.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render the registry in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.gather())
    }
}

impl std::fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegistry").finish_non_exhaustive()
    }
}

/// A fragment currently merged into a [`SharedRegistry`].
#[derive(Debug)]
pub struct MergedFragment {
    registry: Registry,
    name: String,
    fragment: Option<RegistryFragment>,
}

impl MergedFragment {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the fragment from the registry.
    pub fn unmerge(mut self) -> Result<(), prometheus::Error> {
        self.take_and_unregister()
    }

    fn take_and_unregister(&mut self) -> Result<(), prometheus::Error> {
        match self.fragment.take() {
            Some(fragment) => {
                self.registry.unregister(Box::new(fragment))?;
                tracing::debug!(fragment = %self.name, "Registry fragment unmerged");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for MergedFragment {
    fn drop(&mut self) {
        if let Err(e) = self.take_and_unregister() {
            tracing::warn!(fragment = %self.name, error = %e, "Failed to unmerge registry fragment");
        }
    }
}
