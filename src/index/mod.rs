// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Similarity index vocabulary
//!
//! Methods, measures and the persisted descriptor of a built index.

pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::VecsError;
use crate::hnsw::HnswArgs;
use crate::ivf::IvfFlatArgs;

pub use manager::{plan_index, resolve_method, IndexCoverage, IndexRequest, IndexState};

/// Index algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexMethod {
    /// Most capable method the engine supports
    #[default]
    Auto,
    #[serde(rename = "ivfflat")]
    IvfFlat,
    Hnsw,
}

impl IndexMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMethod::Auto => "auto",
            IndexMethod::IvfFlat => "ivfflat",
            IndexMethod::Hnsw => "hnsw",
        }
    }
}

impl fmt::Display for IndexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexMethod {
    type Err = VecsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(IndexMethod::Auto),
            "ivfflat" => Ok(IndexMethod::IvfFlat),
            "hnsw" => Ok(IndexMethod::Hnsw),
            other => Err(VecsError::arg(format!("Invalid index method: {}", other))),
        }
    }
}

/// Distance measure used for ordering and by an index's operator class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexMeasure {
    #[default]
    CosineDistance,
    L2Distance,
    MaxInnerProduct,
    L1Distance,
}

impl IndexMeasure {
    pub const ALL: [IndexMeasure; 4] = [
        IndexMeasure::CosineDistance,
        IndexMeasure::L2Distance,
        IndexMeasure::MaxInnerProduct,
        IndexMeasure::L1Distance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMeasure::CosineDistance => "cosine_distance",
            IndexMeasure::L2Distance => "l2_distance",
            IndexMeasure::MaxInnerProduct => "max_inner_product",
            IndexMeasure::L1Distance => "l1_distance",
        }
    }

    /// Operator class an index must be built with to serve this measure.
    pub fn operator_class(&self) -> &'static str {
        match self {
            IndexMeasure::CosineDistance => "vector_cosine_ops",
            IndexMeasure::L2Distance => "vector_l2_ops",
            IndexMeasure::MaxInnerProduct => "vector_ip_ops",
            IndexMeasure::L1Distance => "vector_l1_ops",
        }
    }

    /// Ordering operator; smaller is closer for every measure.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            IndexMeasure::CosineDistance => "<=>",
            IndexMeasure::L2Distance => "<->",
            IndexMeasure::MaxInnerProduct => "<#>",
            IndexMeasure::L1Distance => "<+>",
        }
    }
}

impl fmt::Display for IndexMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexMeasure {
    type Err = VecsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexMeasure::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| VecsError::arg(format!("Invalid index measure: {}", s)))
    }
}

/// Caller supplied construction arguments, tied to one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IndexArgs {
    #[serde(rename = "ivfflat")]
    IvfFlat(IvfFlatArgs),
    Hnsw(HnswArgs),
}

impl IndexArgs {
    pub fn method(&self) -> IndexMethod {
        match self {
            IndexArgs::IvfFlat(_) => IndexMethod::IvfFlat,
            IndexArgs::Hnsw(_) => IndexMethod::Hnsw,
        }
    }
}

impl From<IvfFlatArgs> for IndexArgs {
    fn from(args: IvfFlatArgs) -> Self {
        IndexArgs::IvfFlat(args)
    }
}

impl From<HnswArgs> for IndexArgs {
    fn from(args: HnswArgs) -> Self {
        IndexArgs::Hnsw(args)
    }
}

/// Fully resolved construction parameters of a built index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IndexParameters {
    #[serde(rename = "ivfflat")]
    IvfFlat { n_lists: usize },
    Hnsw { m: u32, ef_construction: u32 },
}

impl IndexParameters {
    pub fn method(&self) -> IndexMethod {
        match self {
            IndexParameters::IvfFlat { .. } => IndexMethod::IvfFlat,
            IndexParameters::Hnsw { .. } => IndexMethod::Hnsw,
        }
    }

    pub(crate) fn name_tag(&self) -> String {
        match self {
            IndexParameters::IvfFlat { n_lists } => format!("ivfflat_nl{}", n_lists),
            IndexParameters::Hnsw { m, ef_construction } => {
                format!("hnsw_m{}_efc{}", m, ef_construction)
            }
        }
    }

    /// Storage parameters clause for `create index ... with (...)`.
    pub fn with_clause(&self) -> String {
        match self {
            IndexParameters::IvfFlat { n_lists } => format!("lists = {}", n_lists),
            IndexParameters::Hnsw { m, ef_construction } => {
                format!("m = {}, ef_construction = {}", m, ef_construction)
            }
        }
    }
}

/// Persisted record of the single active index of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub measure: IndexMeasure,
    pub parameters: IndexParameters,
    pub created_at: DateTime<Utc>,
}

impl IndexDescriptor {
    pub fn new(measure: IndexMeasure, parameters: IndexParameters) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "ix_{}_{}_{}",
            measure.operator_class(),
            parameters.name_tag(),
            &suffix[..8]
        );
        Self {
            name,
            measure,
            parameters,
            created_at: Utc::now(),
        }
    }

    pub fn method(&self) -> IndexMethod {
        self.parameters.method()
    }

    pub fn covers(&self, measure: IndexMeasure) -> bool {
        self.measure == measure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_parsing() {
        assert_eq!(
            "max_inner_product".parse::<IndexMeasure>().unwrap(),
            IndexMeasure::MaxInnerProduct
        );
        assert!(matches!(
            "hamming".parse::<IndexMeasure>(),
            Err(VecsError::Arg(_))
        ));
    }

    #[test]
    fn test_operator_classes() {
        assert_eq!(IndexMeasure::CosineDistance.operator_class(), "vector_cosine_ops");
        assert_eq!(IndexMeasure::L1Distance.sql_operator(), "<+>");
    }

    #[test]
    fn test_descriptor_name_encodes_parameters() {
        let descriptor = IndexDescriptor::new(
            IndexMeasure::L2Distance,
            IndexParameters::Hnsw {
                m: 16,
                ef_construction: 64,
            },
        );
        assert!(descriptor.name.starts_with("ix_vector_l2_ops_hnsw_m16_efc64_"));
        assert_eq!(descriptor.method(), IndexMethod::Hnsw);
        assert!(descriptor.covers(IndexMeasure::L2Distance));
        assert!(!descriptor.covers(IndexMeasure::CosineDistance));
    }

    #[test]
    fn test_descriptor_serde_shape() {
        let descriptor = IndexDescriptor::new(
            IndexMeasure::CosineDistance,
            IndexParameters::IvfFlat { n_lists: 30 },
        );
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["measure"], "cosine_distance");
        assert_eq!(value["parameters"]["method"], "ivfflat");
        assert_eq!(value["parameters"]["n_lists"], 30);

        let back: IndexDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_serde_method_names_match_sql_names() {
        for method in [IndexMethod::Auto, IndexMethod::IvfFlat, IndexMethod::Hnsw] {
            let value = serde_json::to_value(method).unwrap();
            assert_eq!(value, method.as_str());
        }
        let args = serde_json::to_value(IndexArgs::from(IvfFlatArgs::new(4))).unwrap();
        assert_eq!(args["method"], IndexMethod::IvfFlat.to_string());

        let parsed: IndexParameters =
            serde_json::from_value(serde_json::json!({"method": "ivfflat", "n_lists": 7}))
                .unwrap();
        assert_eq!(parsed, IndexParameters::IvfFlat { n_lists: 7 });
    }
}
