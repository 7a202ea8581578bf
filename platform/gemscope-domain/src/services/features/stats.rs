pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.max(0.0).sqrt())
}

pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Pearson correlation over the common tail of both series. `None` when
/// fewer than `min_points` aligned points exist or either side is flat.
pub fn tail_correlation(a: &[f64], b: &[f64], min_points: usize) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < min_points.max(2) {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let ma = mean(a)?;
    let mb = mean(b)?;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va <= f64::EPSILON || vb <= f64::EPSILON {
        return None;
    }
    let r = cov / (va.sqrt() * vb.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::{sample_std, simple_returns, tail_correlation};

    #[test]
    fn sample_std_needs_two_points() {
        assert_eq!(sample_std(&[1.0]), None);
        let std = sample_std(&[1.0, 3.0]).expect("std");
        assert!((std - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn returns_are_fractional() {
        let r = simple_returns(&[100.0, 110.0, 99.0]);
        assert!((r[0] - 0.1).abs() < 1e-12);
        assert!((r[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn correlation_aligns_tails() {
        let a = [9.0, 1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let r = tail_correlation(&a, &b, 3).expect("corr");
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(tail_correlation(&a, &b, 5), None);
        assert_eq!(tail_correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], 2), None);
    }
}
