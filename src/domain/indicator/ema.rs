//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n samples, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k) through the rest of the series.
//! Returns 0.0 with fewer than n samples.

pub fn calculate_ema(values: &[f64], period: usize) -> f64 {
    if period == 0 || values.len() < period {
        return 0.0;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    values[period..]
        .iter()
        .fold(seed, |ema, &x| x * k + ema * (1.0 - k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_seed_is_sma() {
        // exactly n samples: EMA == SMA
        assert_relative_eq!(calculate_ema(&[10.0, 20.0, 30.0], 3), 20.0);
    }

    #[test]
    fn ema_smooths_after_seed() {
        // period 3, k = 0.5: seed 20, then 40*0.5 + 20*0.5 = 30, then 50*0.5 + 30*0.5 = 40
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_relative_eq!(calculate_ema(&values, 3), 40.0);
    }

    #[test]
    fn ema_constant_series() {
        let values = [100.0; 30];
        assert_relative_eq!(calculate_ema(&values, 10), 100.0, epsilon = 1e-10);
    }

    #[test]
    fn ema_insufficient_data() {
        assert_eq!(calculate_ema(&[1.0, 2.0], 3), 0.0);
        assert_eq!(calculate_ema(&[1.0, 2.0], 0), 0.0);
    }

    #[test]
    fn ema_follows_trend_faster_than_sma() {
        let values: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let ema = calculate_ema(&values, 10);
        let sma = crate::domain::indicator::calculate_sma(&values, 10);
        assert!(ema < 40.0);
        // both lag a linear trend by roughly (n-1)/2
        assert_relative_eq!(ema, sma, epsilon = 0.5);
    }
}
