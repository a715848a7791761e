//! Summary statistics over latency and throughput samples.

/// Arithmetic mean, zero for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Population standard deviation, zero for an empty input.
pub fn std_dev(values: impl IntoIterator<Item = f64> + Clone) -> f64 {
    let mu = mean(values.clone());
    let (sq, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sq, count), v| (sq + (v - mu).powi(2), count + 1));
    if count == 0 {
        0.0
    } else {
        (sq / count as f64).sqrt()
    }
}

/// Largest value, zero for an empty input.
pub fn max(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .fold(None, |acc: Option<f64>, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })
        .unwrap_or(0.0)
}

/// `part / whole`, zero when `whole` is zero.
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_are_zero() {
        assert_eq!(mean(Vec::<f64>::new()), 0.0);
        assert_eq!(std_dev(Vec::<f64>::new()), 0.0);
        assert_eq!(max(Vec::<f64>::new()), 0.0);
        assert_eq!(ratio(3, 0), 0.0);
    }

    #[test]
    fn population_std_dev() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(values.clone()) - 5.0).abs() < 1e-12);
        assert!((std_dev(values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn max_picks_largest() {
        assert_eq!(max(vec![0.2, 0.9, 0.1]), 0.9);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
