// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::index::IndexMeasure;

pub fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn cosine_distance_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);

    // Zero vectors have no direction; treat them as orthogonal to everything.
    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }

    1.0 - dot_product_scalar(a, b) / (mag_a * mag_b)
}

pub fn euclidean_distance_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Negated inner product, so smaller still means closer.
pub fn negative_inner_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    -dot_product_scalar(a, b)
}

pub fn manhattan_distance_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Distance between two vectors under `measure`, ordered ascending by closeness.
pub fn distance(measure: IndexMeasure, a: &[f32], b: &[f32]) -> f64 {
    let d = match measure {
        IndexMeasure::CosineDistance => cosine_distance_scalar(a, b),
        IndexMeasure::L2Distance => euclidean_distance_scalar(a, b),
        IndexMeasure::MaxInnerProduct => negative_inner_product_scalar(a, b),
        IndexMeasure::L1Distance => manhattan_distance_scalar(a, b),
    };
    d as f64
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
pub fn normalize(vector: &mut [f32]) {
    let mag = magnitude(vector);
    if mag == 0.0 {
        return;
    }
    for v in vector.iter_mut() {
        *v /= mag;
    }
}
