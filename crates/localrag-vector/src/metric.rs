use localrag_core::config::DistanceMetric;

/// Similarity of `a` and `b` under `metric`, always within `[0, 1]`.
pub fn score(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_score(a, b),
        DistanceMetric::L2 { midpoint } => l2_score(squared_l2(a, b), midpoint),
    }
}

pub fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    let cos = if denom > 0.0 { dot / denom } else { 0.0 };
    ((1.0 + cos) / 2.0).clamp(0.0, 1.0)
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Logistic falloff: 0.5 at `midpoint`, towards 1 for close vectors.
pub fn l2_score(distance: f32, midpoint: f32) -> f32 {
    let s = 1.0 / (1.0 + (distance - midpoint).exp());
    if s.is_nan() { 0.0 } else { s.clamp(0.0, 1.0) }
}
