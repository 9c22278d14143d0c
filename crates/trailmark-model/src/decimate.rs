//! Point-count decimation
//!
//! Keeps every k-th point starting at index 0, then re-appends the original
//! endpoint if striding dropped it. The stride is the smallest `k >= 2` whose
//! result fits the limit, so an already-decimated sequence passes through
//! unchanged.

use crate::point::Point;

/// Reduce `points` to at most `limit` entries while keeping the first and
/// last point. A limit of zero is treated as one.
pub fn decimate(points: &[Point], limit: usize) -> Vec<Point> {
    let limit = limit.max(1);
    if points.len() <= limit {
        return points.to_vec();
    }
    let Some(&last) = points.last() else {
        return Vec::new();
    };
    if limit == 1 {
        return vec![last];
    }

    // ceil(len / k) <= limit needs k >= ceil(len / limit); start there.
    let mut stride = points.len().div_ceil(limit).max(2);
    loop {
        let mut kept: Vec<Point> = points.iter().step_by(stride).copied().collect();
        if kept.last() != Some(&last) {
            kept.push(last);
        }
        if kept.len() <= limit {
            return kept;
        }
        stride += 1;
    }
}
