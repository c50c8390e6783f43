//! Numeric helpers shared by the predictors, selector and monitor
//!
//! All functions are total: empty or degenerate input yields 0 rather than
//! NaN so downstream scores stay comparable.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divides by n)
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Lower and upper quartile taken at `floor(n * 0.25)` and `floor(n * 0.75)`
pub fn quartiles(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let sorted = sorted(values);
    let n = sorted.len();
    let q1 = sorted[((n as f64 * 0.25).floor() as usize).min(n - 1)];
    let q3 = sorted[((n as f64 * 0.75).floor() as usize).min(n - 1)];
    (q1, q3)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Pearson correlation over the common prefix of `x` and `y`
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    let denom = (vx * vy).sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    cov / denom
}

/// Correlation between the series and itself shifted by `lag`
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if lag == 0 || lag >= values.len() {
        return 0.0;
    }
    pearson(&values[..values.len() - lag], &values[lag..])
}

/// Calculate linear regression slope against the sample index
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Least-squares fit of `y` on `x`: (slope, intercept)
pub fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n < 2 {
        return (0.0, mean(y));
    }
    let (x, y) = (&x[..n], &y[..n]);
    let (mx, my) = (mean(x), mean(y));
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if sxx < f64::EPSILON {
        return (0.0, my);
    }
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let slope = sxy / sxx;
    (slope, my - slope * mx)
}

pub fn skewness(values: &[f64]) -> f64 {
    let sd = std_dev(values);
    if values.len() < 3 || sd < f64::EPSILON {
        return 0.0;
    }
    let m = mean(values);
    mean(&values.iter().map(|v| ((v - m) / sd).powi(3)).collect::<Vec<_>>())
}

/// Excess kurtosis (normal distribution is 0)
pub fn kurtosis(values: &[f64]) -> f64 {
    let sd = std_dev(values);
    if values.len() < 4 || sd < f64::EPSILON {
        return 0.0;
    }
    let m = mean(values);
    mean(&values.iter().map(|v| ((v - m) / sd).powi(4)).collect::<Vec<_>>()) - 3.0
}

pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    std_dev(values) / m.abs()
}

pub fn mae(predictions: &[f64], actuals: &[f64]) -> f64 {
    let n = predictions.len().min(actuals.len());
    if n == 0 {
        return 0.0;
    }
    (0..n).map(|i| (predictions[i] - actuals[i]).abs()).sum::<f64>() / n as f64
}

pub fn rmse(predictions: &[f64], actuals: &[f64]) -> f64 {
    let n = predictions.len().min(actuals.len());
    if n == 0 {
        return 0.0;
    }
    ((0..n).map(|i| (predictions[i] - actuals[i]).powi(2)).sum::<f64>() / n as f64).sqrt()
}

/// Mean absolute percentage error, skipping zero actuals
pub fn mape(predictions: &[f64], actuals: &[f64]) -> f64 {
    let errors: Vec<f64> = predictions
        .iter()
        .zip(actuals)
        .filter(|(_, a)| a.abs() > f64::EPSILON)
        .map(|(p, a)| ((p - a) / a).abs())
        .collect();
    mean(&errors) * 100.0
}

/// Coefficient of determination; a constant target scores 1 only on a perfect fit
pub fn r_squared(predictions: &[f64], actuals: &[f64]) -> f64 {
    let n = predictions.len().min(actuals.len());
    if n == 0 {
        return 0.0;
    }
    let m = mean(&actuals[..n]);
    let ss_tot: f64 = actuals[..n].iter().map(|a| (a - m).powi(2)).sum();
    let ss_res: f64 = (0..n).map(|i| (actuals[i] - predictions[i]).powi(2)).sum();
    if ss_tot < f64::EPSILON {
        return if ss_res < f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(linear_regression_slope(&[]), 0.0);
        assert_eq!(pearson(&[], &[]), 0.0);
        assert_eq!(mape(&[], &[]), 0.0);
    }

    #[test]
    fn test_variance_calculation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((variance(&values) - 4.0).abs() < 1e-9);
        assert!((std_dev(&values) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_regression_slope() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((linear_regression_slope(&values) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_linear_fit() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = linear_fit(&x, &y);
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_signs() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        assert!((pearson(&x, &[2.0, 4.0, 6.0, 8.0]) - 1.0).abs() < 1e-9);
        assert!((pearson(&x, &[8.0, 6.0, 4.0, 2.0]) + 1.0).abs() < 1e-9);
        assert_eq!(pearson(&x, &[3.0, 3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn test_mape_skips_zero_actuals() {
        let predictions = vec![1.0, 110.0, 5.0];
        let actuals = vec![0.0, 100.0, 0.0];
        let value = mape(&predictions, &actuals);
        assert!(value.is_finite());
        assert!((value - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_r_squared_constant_target() {
        assert_eq!(r_squared(&[3.0, 3.0], &[3.0, 3.0]), 1.0);
        assert_eq!(r_squared(&[2.0, 4.0], &[3.0, 3.0]), 0.0);
        assert!((r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_quartiles() {
        let values: Vec<f64> = (1..=8).map(|v| v as f64).collect();
        assert_eq!(quartiles(&values), (3.0, 7.0));
    }

    #[test]
    fn test_shape_statistics() {
        let symmetric = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(skewness(&symmetric).abs() < 1e-9);
        let right_tailed = vec![1.0, 1.0, 1.0, 1.0, 10.0];
        assert!(skewness(&right_tailed) > 0.0);
        assert!(kurtosis(&right_tailed) > 0.0);
    }
}
