pub mod model;
pub mod pool;
pub mod utxo;

pub use model::{Transaction, TxInput, TxOutput};
pub use pool::{PoolEntry, SelectionPolicy, TransactionPool};
pub use utxo::{OutPoint, UtxoEntry, UtxoSet, UtxoStatus};

/// Base units per coin.
pub const COIN: u64 = 100_000_000;

/// Convert a coin amount from the API into base units, rounding to the nearest unit.
pub fn coins_to_units(coins: f64) -> Option<u64> {
    if !coins.is_finite() || coins < 0.0 {
        return None;
    }
    let units = (coins * COIN as f64).round();
    if units > u64::MAX as f64 {
        return None;
    }
    Some(units as u64)
}

pub fn units_to_coins(units: u64) -> f64 {
    units as f64 / COIN as f64
}

/// Signed coin difference `received - sent`.
pub fn net_coins(received: u64, sent: u64) -> f64 {
    if received >= sent {
        units_to_coins(received - sent)
    } else {
        -units_to_coins(sent - received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_conversion_rounds_to_units() {
        assert_eq!(coins_to_units(10.0), Some(10 * COIN));
        assert_eq!(coins_to_units(0.01), Some(1_000_000));
        assert_eq!(coins_to_units(4.99), Some(499_000_000));
        assert_eq!(coins_to_units(-1.0), None);
        assert_eq!(coins_to_units(f64::NAN), None);
        assert_eq!(units_to_coins(1_000_000), 0.01);
    }

    #[test]
    fn net_coins_is_signed() {
        assert_eq!(net_coins(45 * COIN, 50 * COIN), -5.0);
        assert_eq!(net_coins(50 * COIN, 0), 50.0);
        assert_eq!(net_coins(COIN, COIN), 0.0);
    }
}
