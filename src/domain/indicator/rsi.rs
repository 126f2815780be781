//! RSI (Relative Strength Index).
//!
//! Simple averages of the gains and losses over the last n changes (n+1
//! samples), no Wilder smoothing.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100. With too little history: RSI = 50.

use crate::domain::indicator::trailing;

pub const NEUTRAL_RSI: f64 = 50.0;

pub fn calculate_rsi(values: &[f64], period: usize) -> f64 {
    let Some(window) = trailing(values, period + 1).filter(|_| period > 0) else {
        return NEUTRAL_RSI;
    };

    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gain, loss), change| {
            if change > 0.0 {
                (gain + change, loss)
            } else {
                (gain, loss - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
