use chartbands_core::{Bar, Tick};

/// Split a bar into the four prints a live feed would have produced:
/// open, the nearer extreme, the farther extreme, close. Volume is spread
/// evenly across them and every print carries the bar's timestamp.
pub fn bar_to_ticks(bar: &Bar) -> [Tick; 4] {
    let (first, second) = if bar.close >= bar.open {
        (bar.low, bar.high)
    } else {
        (bar.high, bar.low)
    };
    let volume = bar.volume / 4.0;
    [bar.open, first, second, bar.close].map(|price| Tick {
        timestamp: bar.timestamp,
        price,
        volume,
    })
}
