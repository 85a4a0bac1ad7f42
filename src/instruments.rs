//! Instrument specifications: tick increments, tick values, and per-symbol
//! detector tuning profiles.

/// Contract specification for a tradeable instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentSpec {
    pub tick_size: f64,
    /// Dollar value per tick per contract
    pub tick_value: f64,
}

/// Per-symbol detector tuning.
#[derive(Debug, Clone, Copy)]
pub struct SymbolProfile {
    pub imbalance_min_volume: u32,
    pub absorption_min_volume: u32,
    pub typical_bar_volume: u32,
    pub stop_ticks: u32,
    pub target_ticks: u32,
}

const DEFAULT_SPEC: InstrumentSpec = InstrumentSpec {
    tick_size: 0.25,
    tick_value: 1.25,
};

/// Look up the contract spec for a symbol. Continuous-contract suffixes
/// ("ESH4", "MES.c.0") resolve through the root symbol.
pub fn instrument_spec(symbol: &str) -> InstrumentSpec {
    match root_symbol(symbol) {
        "ES" => InstrumentSpec { tick_size: 0.25, tick_value: 12.50 },
        "MES" => InstrumentSpec { tick_size: 0.25, tick_value: 1.25 },
        "NQ" => InstrumentSpec { tick_size: 0.25, tick_value: 5.00 },
        "MNQ" => InstrumentSpec { tick_size: 0.25, tick_value: 0.50 },
        "CL" => InstrumentSpec { tick_size: 0.01, tick_value: 10.00 },
        "GC" => InstrumentSpec { tick_size: 0.10, tick_value: 10.00 },
        "SI" => InstrumentSpec { tick_size: 0.005, tick_value: 25.00 },
        "RTY" => InstrumentSpec { tick_size: 0.10, tick_value: 5.00 },
        "M2K" => InstrumentSpec { tick_size: 0.10, tick_value: 0.50 },
        "YM" => InstrumentSpec { tick_size: 1.0, tick_value: 5.00 },
        "MYM" => InstrumentSpec { tick_size: 1.0, tick_value: 0.50 },
        _ => DEFAULT_SPEC,
    }
}

/// Detector tuning for a symbol; unknown symbols get the MES profile.
pub fn symbol_profile(symbol: &str) -> SymbolProfile {
    match root_symbol(symbol) {
        "ES" => SymbolProfile {
            imbalance_min_volume: 20,
            absorption_min_volume: 150,
            typical_bar_volume: 5000,
            stop_ticks: 16,
            target_ticks: 24,
        },
        "NQ" => SymbolProfile {
            imbalance_min_volume: 15,
            absorption_min_volume: 100,
            typical_bar_volume: 3000,
            stop_ticks: 20,
            target_ticks: 32,
        },
        "MNQ" => SymbolProfile {
            imbalance_min_volume: 5,
            absorption_min_volume: 25,
            typical_bar_volume: 300,
            stop_ticks: 20,
            target_ticks: 32,
        },
        "CL" => SymbolProfile {
            imbalance_min_volume: 30,
            absorption_min_volume: 200,
            typical_bar_volume: 8000,
            stop_ticks: 20,
            target_ticks: 30,
        },
        "GC" => SymbolProfile {
            imbalance_min_volume: 15,
            absorption_min_volume: 100,
            typical_bar_volume: 2000,
            stop_ticks: 20,
            target_ticks: 30,
        },
        // MES and anything unrecognized
        _ => SymbolProfile {
            imbalance_min_volume: 5,
            absorption_min_volume: 30,
            typical_bar_volume: 500,
            stop_ticks: 16,
            target_ticks: 24,
        },
    }
}

/// Round a price to the instrument's valid tick increment.
pub fn normalize_price(price: f64, tick_size: f64) -> f64 {
    (price / tick_size).round() * tick_size
}

/// Strip month codes / continuous-contract suffixes down to the root.
fn root_symbol(symbol: &str) -> &str {
    let base: &str = symbol.split('.').next().unwrap_or(symbol);
    // Try 3-char roots first (MES, MNQ, M2K, MYM, RTY), then 2-char
    for len in [3, 2] {
        if base.len() >= len {
            let candidate = &base[..len];
            if is_known_root(candidate) {
                return candidate;
            }
        }
    }
    base
}

fn is_known_root(s: &str) -> bool {
    matches!(
        s,
        "ES" | "MES" | "NQ" | "MNQ" | "CL" | "GC" | "SI" | "RTY" | "M2K" | "YM" | "MYM"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_price() {
        assert_eq!(normalize_price(5000.13, 0.25), 5000.25);
        assert_eq!(normalize_price(5000.12, 0.25), 5000.0);
        assert_eq!(normalize_price(5000.375, 0.25), 5000.5);
        assert!((normalize_price(78.456, 0.01) - 78.46).abs() < 1e-9);
    }

    #[test]
    fn test_root_resolution() {
        assert_eq!(instrument_spec("MES").tick_value, 1.25);
        assert_eq!(instrument_spec("MESH5").tick_value, 1.25);
        assert_eq!(instrument_spec("ES.c.0").tick_value, 12.50);
        assert_eq!(instrument_spec("ESH4").tick_value, 12.50);
        assert_eq!(instrument_spec("UNKNOWN").tick_size, 0.25);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(symbol_profile("ES").imbalance_min_volume, 20);
        assert_eq!(symbol_profile("MES").imbalance_min_volume, 5);
        assert_eq!(symbol_profile("NQ").stop_ticks, 20);
        // Unknown symbols fall back to the micro profile
        assert_eq!(symbol_profile("ZB").absorption_min_volume, 30);
    }
}
