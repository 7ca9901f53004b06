//! Device allowed-value tables and the quantizer
//!
//! The stimulator only accepts parameter values from fixed, device-defined
//! tables. Every setter quantizes its numeric inputs to the nearest table
//! entry before encoding. Tables are ascending; entries are in the wire
//! unit of the parameter (tenths of Hz, tenths of ms, and so on).

use std::sync::LazyLock;

/// Build an ascending table from inclusive `(start, end, step)` ranges.
fn stepped(ranges: &[(i32, i32, i32)]) -> Vec<i32> {
    let mut table = Vec::new();
    for &(start, end, step) in ranges {
        let mut v = start;
        while v <= end {
            table.push(v);
            v += step;
        }
    }
    table
}

/// Repetition rate in tenths of Hz: 0.1-0.9 Hz in 0.1 Hz steps, then
/// 1-100 Hz in 1 Hz steps.
pub static REPETITION_RATE: LazyLock<Vec<i32>> =
    LazyLock::new(|| stepped(&[(1, 9, 1), (10, 1000, 10)]));

/// Pulses in a train: 1..1000.
pub static PULSES_IN_TRAIN: LazyLock<Vec<i32>> = LazyLock::new(|| stepped(&[(1, 1000, 1)]));

/// Number of trains in a sequence: 1..500.
pub static NUMBER_OF_TRAINS: LazyLock<Vec<i32>> = LazyLock::new(|| stepped(&[(1, 500, 1)]));

/// Inter-train interval in tenths of seconds: 0.1-120.0 s.
pub static INTER_TRAIN_INTERVAL: LazyLock<Vec<i32>> = LazyLock::new(|| stepped(&[(1, 1200, 1)]));

/// Trigger input delay in tenths of ms: 0-0.9 ms fine, then 1-100 ms in
/// 1 ms steps.
pub static TRIGGER_IN_DELAY: LazyLock<Vec<i32>> =
    LazyLock::new(|| stepped(&[(0, 9, 1), (10, 1000, 10)]));

/// Trigger output delay in tenths of ms. Negative entries lead the pulse;
/// resolution is finest around zero.
pub static TRIGGER_OUT_DELAY: LazyLock<Vec<i32>> = LazyLock::new(|| {
    stepped(&[
        (-1000, -100, 100),
        (-90, -10, 10),
        (-9, 9, 1),
        (10, 90, 10),
        (100, 1000, 100),
    ])
});

/// Charge delay in ms: 0-900 ms in 10 ms steps, then 1-10 s in 1 s steps.
pub static CHARGE_DELAY: LazyLock<Vec<i32>> =
    LazyLock::new(|| stepped(&[(0, 900, 10), (1000, 10000, 1000)]));

/// Quantize `x` to the nearest entry of an ascending `table`.
///
/// Above the table range the last entry is returned. On an exact tie
/// between two neighbours, non-negative inputs round down and negative
/// inputs round up; the asymmetry matches the device front panel.
pub fn nearest_allowed_value(x: f64, table: &[i32]) -> i32 {
    let i = match table.iter().position(|&t| f64::from(t) >= x) {
        None => return table[table.len() - 1],
        Some(0) => return table[0],
        Some(i) => i,
    };
    let lower = x - f64::from(table[i - 1]);
    let upper = f64::from(table[i]) - x;
    if upper > lower || (upper == lower && x >= 0.0) {
        table[i - 1]
    } else {
        table[i]
    }
}

/// B/A pulse ratio table: 0.20..5.00 in 0.05 steps, indexed 0..=96.
pub const PULSE_RATIO_MIN: f64 = 0.20;
/// Step between adjacent ratio entries.
pub const PULSE_RATIO_STEP: f64 = 0.05;
/// Highest valid ratio index (0.20 + 96 * 0.05 = 5.00).
pub const PULSE_RATIO_STEPS: u8 = 96;

/// Ratio value for a wire index, or NaN when the index is out of range.
pub fn pulse_ratio_from_index(index: u8) -> f64 {
    if index <= PULSE_RATIO_STEPS {
        PULSE_RATIO_MIN + PULSE_RATIO_STEP * f64::from(index)
    } else {
        f64::NAN
    }
}

/// Wire index for a ratio, clamped into the table domain.
pub fn pulse_ratio_index(ratio: f64) -> u8 {
    let max = PULSE_RATIO_MIN + PULSE_RATIO_STEP * f64::from(PULSE_RATIO_STEPS);
    let clamped = ratio.clamp(PULSE_RATIO_MIN, max);
    ((clamped - PULSE_RATIO_MIN) / PULSE_RATIO_STEP).round() as u8
}

// Inter-pulse interval tables. Both run downward from their maximum in
// 0.1 ms steps; the index is the distance from the top. The burst table
// is indexed by a single byte, the wide table by a 16-bit index.
const BURST_IPI_MAX_TENTHS: i32 = 1000; // 100.0 ms
const BURST_IPI_MIN_TENTHS: i32 = 5; // 0.5 ms
const WIDE_IPI_MAX_TENTHS: i32 = 30000; // 3000.0 ms
const WIDE_IPI_MIN_TENTHS: i32 = 10; // 1.0 ms

/// Inter-pulse interval in ms for a biphasic-burst index, or NaN when the
/// index falls outside the table.
pub fn burst_ipi_from_index(index: u16) -> f64 {
    let tenths = BURST_IPI_MAX_TENTHS - i32::from(index);
    if tenths >= BURST_IPI_MIN_TENTHS {
        f64::from(tenths) / 10.0
    } else {
        f64::NAN
    }
}

/// Inter-pulse interval in ms for a wide-table index, or NaN when the
/// index falls outside the table.
pub fn wide_ipi_from_index(index: u16) -> f64 {
    let tenths = WIDE_IPI_MAX_TENTHS - i32::from(index);
    if tenths >= WIDE_IPI_MIN_TENTHS {
        f64::from(tenths) / 10.0
    } else {
        f64::NAN
    }
}

/// Wire index for a biphasic-burst interval, clamped into the table.
pub fn burst_ipi_index(ipi_ms: f64) -> u16 {
    ipi_index(ipi_ms, BURST_IPI_MIN_TENTHS, BURST_IPI_MAX_TENTHS)
}

/// Wire index for a wide-table interval, clamped into the table.
pub fn wide_ipi_index(ipi_ms: f64) -> u16 {
    ipi_index(ipi_ms, WIDE_IPI_MIN_TENTHS, WIDE_IPI_MAX_TENTHS)
}

fn ipi_index(ipi_ms: f64, min_tenths: i32, max_tenths: i32) -> u16 {
    let tenths = (ipi_ms * 10.0).round().clamp(f64::from(min_tenths), f64::from(max_tenths));
    (f64::from(max_tenths) - tenths) as u16
}
