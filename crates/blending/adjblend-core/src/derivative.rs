//! Helpers for computing time derivatives of sampled [`Value`]s.

use adjblend_api_core::Value;

/// Compute `(forward - backward) / dt` for a [`Value`].
///
/// Returns `None` when `dt <= 0` or the shapes differ.
pub(crate) fn difference_quotient(forward: &Value, backward: &Value, dt: f32) -> Option<Value> {
    if dt <= 0.0 {
        return None;
    }
    let inv_dt = dt.recip();
    forward.zip_with(backward, |f, b| (f - b) * inv_dt).ok()
}

/// Per-sample derivative of a sampled signal.
///
/// Interior samples use the symmetric difference over their neighbours; the first
/// and last sample use one-sided differences. A single sample has a zero derivative.
pub(crate) fn finite_differences(times: &[f32], values: &[Value]) -> Vec<Value> {
    let n = values.len().min(times.len());
    match n {
        0 => Vec::new(),
        1 => vec![values[0].zeros_like()],
        _ => (0..n)
            .map(|i| {
                let (lo, hi) = match i {
                    0 => (0, 1),
                    i if i == n - 1 => (n - 2, n - 1),
                    i => (i - 1, i + 1),
                };
                difference_quotient(&values[hi], &values[lo], times[hi] - times[lo])
                    .unwrap_or_else(|| values[i].zeros_like())
            })
            .collect(),
    }
}

/// Speed of each sample relative to its slower neighbour.
///
/// A sample is at rest when it is stationary relative to either neighbour, so a
/// plateau keeps its edge samples even though the symmetric difference there is large.
pub(crate) fn rest_speeds(times: &[f32], values: &[Value]) -> Vec<f32> {
    let n = values.len().min(times.len());
    if n < 2 {
        return vec![0.0; n];
    }
    let segment: Vec<f32> = (0..n - 1)
        .map(|i| {
            difference_quotient(&values[i + 1], &values[i], times[i + 1] - times[i])
                .map(|d| d.magnitude())
                .unwrap_or(0.0)
        })
        .collect();
    (0..n)
        .map(|i| match i {
            0 => segment[0],
            i if i == n - 1 => segment[n - 2],
            i => segment[i - 1].min(segment[i]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars(v: &[f32]) -> Vec<Value> {
        v.iter().map(|x| Value::f(*x)).collect()
    }

    #[test]
    fn central_interior_one_sided_edges() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let d = finite_differences(&times, &scalars(&[0.0, 1.0, 4.0, 9.0]));
        assert_eq!(d, scalars(&[1.0, 2.0, 4.0, 5.0]));
    }

    #[test]
    fn vector_derivative_is_component_wise() {
        let times = [0.0, 0.5];
        let values = vec![Value::Vec2([0.0, 1.0]), Value::Vec2([1.0, 0.0])];
        let d = finite_differences(&times, &values);
        assert_eq!(d[0], Value::Vec2([2.0, -2.0]));
        assert_eq!(d[1], Value::Vec2([2.0, -2.0]));
    }

    #[test]
    fn single_sample_has_zero_derivative() {
        let d = finite_differences(&[3.0], &[Value::vec3(1.0, 2.0, 3.0)]);
        assert_eq!(d, vec![Value::vec3(0.0, 0.0, 0.0)]);
    }

    #[test]
    fn plateau_edges_are_at_rest() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0];
        let r = rest_speeds(&times, &scalars(&[0.0, 0.0, 5.0, 5.0, 5.0]));
        assert_eq!(r, vec![0.0, 0.0, 0.0, 0.0, 0.0]);
        let moving = rest_speeds(&times, &scalars(&[0.0, 1.0, 2.0, 3.0, 4.0]));
        assert_eq!(moving, vec![1.0; 5]);
    }
}
