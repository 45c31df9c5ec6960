// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Index lifecycle
//!
//! A collection holds at most one index. Its state moves
//! `NoIndex -> Building -> Ready`, back through `Building` on replace, and to
//! `NoIndex` on drop. Planning a build resolves the method against the
//! engine's capabilities and fills in default parameters; every rejection
//! happens here, before any statement reaches the backend.

use crate::core::error::{Result, VecsError};
use crate::hnsw::HnswArgs;
use crate::index::{IndexArgs, IndexDescriptor, IndexMeasure, IndexMethod, IndexParameters};
use crate::ivf::{default_n_lists, IvfFlatArgs};
use crate::storage::capabilities::Capabilities;

/// Lifecycle state of a collection's index
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IndexState {
    #[default]
    NoIndex,
    Building {
        previous: Option<IndexDescriptor>,
        next: IndexDescriptor,
    },
    Ready(IndexDescriptor),
}

impl IndexState {
    pub fn from_descriptor(descriptor: Option<IndexDescriptor>) -> Self {
        match descriptor {
            Some(d) => IndexState::Ready(d),
            None => IndexState::NoIndex,
        }
    }

    /// The index queries are served by right now.
    pub fn current(&self) -> Option<&IndexDescriptor> {
        match self {
            IndexState::NoIndex => None,
            IndexState::Building { previous, .. } => previous.as_ref(),
            IndexState::Ready(d) => Some(d),
        }
    }

    pub fn is_building(&self) -> bool {
        matches!(self, IndexState::Building { .. })
    }

    /// Enter `Building`. An existing index is only replaced when `replace` is set.
    pub fn begin_build(&mut self, next: IndexDescriptor, replace: bool) -> Result<()> {
        let previous = match std::mem::take(self) {
            IndexState::NoIndex => None,
            IndexState::Ready(existing) => {
                if !replace {
                    let name = existing.name.clone();
                    *self = IndexState::Ready(existing);
                    return Err(VecsError::arg(format!(
                        "replace is set to false but an index exists: {}",
                        name
                    )));
                }
                Some(existing)
            }
            building @ IndexState::Building { .. } => {
                *self = building;
                return Err(VecsError::arg("an index build is already in progress"));
            }
        };
        *self = IndexState::Building { previous, next };
        Ok(())
    }

    /// `Building -> Ready` once the backend committed the new index.
    pub fn finish_build(&mut self) -> Option<&IndexDescriptor> {
        if let IndexState::Building { next, .. } = std::mem::take(self) {
            *self = IndexState::Ready(next);
        }
        self.current()
    }

    /// Restore the previous state after a failed build.
    pub fn abort_build(&mut self) {
        if let IndexState::Building { previous, .. } = std::mem::take(self) {
            *self = IndexState::from_descriptor(previous);
        }
    }

    /// Move to `NoIndex`, returning whatever index was active or pending.
    pub fn drop_index(&mut self) -> Option<IndexDescriptor> {
        match std::mem::take(self) {
            IndexState::NoIndex => None,
            IndexState::Ready(d) => Some(d),
            IndexState::Building { previous, next } => previous.or(Some(next)),
        }
    }

    pub fn coverage(&self, measure: IndexMeasure) -> IndexCoverage {
        match self.current() {
            None => IndexCoverage::Unindexed,
            Some(d) if d.covers(measure) => IndexCoverage::Covered,
            Some(d) => IndexCoverage::MeasureMismatch { indexed: d.measure },
        }
    }
}

/// Whether a query measure is served by the collection's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCoverage {
    Covered,
    Unindexed,
    MeasureMismatch { indexed: IndexMeasure },
}

impl IndexCoverage {
    pub fn is_covered(&self) -> bool {
        matches!(self, IndexCoverage::Covered)
    }
}

/// Arguments of `Collection::create_index`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexRequest {
    pub measure: IndexMeasure,
    pub method: IndexMethod,
    pub args: Option<IndexArgs>,
    pub replace: bool,
}

impl Default for IndexRequest {
    fn default() -> Self {
        Self {
            measure: IndexMeasure::CosineDistance,
            method: IndexMethod::Auto,
            args: None,
            replace: true,
        }
    }
}

impl IndexRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measure(mut self, measure: IndexMeasure) -> Self {
        self.measure = measure;
        self
    }

    pub fn method(mut self, method: IndexMethod) -> Self {
        self.method = method;
        self
    }

    pub fn args(mut self, args: impl Into<IndexArgs>) -> Self {
        self.args = Some(args.into());
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

/// Pick the concrete method for a request.
pub fn resolve_method(
    method: IndexMethod,
    args: Option<&IndexArgs>,
    caps: &Capabilities,
) -> Result<IndexMethod> {
    let resolved = match method {
        IndexMethod::Auto => {
            if args.is_some() {
                return Err(VecsError::arg(
                    "index args can only be supplied once a concrete method is chosen",
                ));
            }
            if caps.supports_hnsw() {
                IndexMethod::Hnsw
            } else {
                IndexMethod::IvfFlat
            }
        }
        concrete => {
            if !caps.supports_method(concrete) {
                return Err(VecsError::arg(format!(
                    "index method {} requires a newer vector extension than {}",
                    concrete, caps.version
                )));
            }
            concrete
        }
    };

    if let Some(args) = args {
        if args.method() != resolved {
            return Err(VecsError::arg(format!(
                "{} args supplied for index method {}",
                args.method(),
                resolved
            )));
        }
    }
    Ok(resolved)
}

/// Validate a request and produce the descriptor to build.
pub fn plan_index(
    request: &IndexRequest,
    caps: &Capabilities,
    n_records: usize,
) -> Result<IndexDescriptor> {
    let method = resolve_method(request.method, request.args.as_ref(), caps)?;

    if request.measure == IndexMeasure::L1Distance {
        if !caps.supports_l1() {
            return Err(VecsError::arg(format!(
                "l1_distance requires a newer vector extension than {}",
                caps.version
            )));
        }
        if method != IndexMethod::Hnsw {
            return Err(VecsError::arg("l1_distance can only be indexed with hnsw"));
        }
    }

    let parameters = match (method, request.args) {
        (IndexMethod::IvfFlat, args) => {
            let args = match args {
                Some(IndexArgs::IvfFlat(a)) => a,
                _ => IvfFlatArgs::new(default_n_lists(n_records)),
            };
            args.validate()?;
            IndexParameters::IvfFlat {
                n_lists: args.n_lists,
            }
        }
        (IndexMethod::Hnsw, args) => {
            let args = match args {
                Some(IndexArgs::Hnsw(a)) => a,
                _ => HnswArgs::default(),
            };
            args.validate()?;
            IndexParameters::Hnsw {
                m: args.m(),
                ef_construction: args.ef_construction(),
            }
        }
        (IndexMethod::Auto, _) => {
            return Err(VecsError::arg("index method did not resolve"));
        }
    };

    Ok(IndexDescriptor::new(request.measure, parameters))
}
