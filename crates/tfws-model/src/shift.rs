//! Bin-wise helpers for turning systematic variations into envelopes.
//!
//! All shift functions take the nominal (`norm`) and the up/down variations
//! and return a histogram named after the up variation. Bins with
//! `norm[i] == 0` get a zero envelope.

use tfws_core::{Error, Histogram, Result};

/// Default fraction of the reference total a template must exceed.
pub const DEFAULT_THRESHOLD: f64 = 0.2;

/// Element-wise `1/h`, computed as `h / h / h` so errors follow the
/// division convention of [`Histogram::divide`].
pub fn reciprocal(h: &Histogram) -> Result<Histogram> {
    let mut out = h.clone_named(format!("{}_reciprocal", h.name));
    out.divide(h)?;
    out.divide(h)?;
    Ok(out)
}

/// Per-bin `max(|up/norm - 1|, |dn/norm - 1|)`.
pub fn fractional_shift(
    norm: &Histogram,
    up: &Histogram,
    dn: &Histogram,
    use_reciprocal: bool,
) -> Result<Histogram> {
    let name = strip_suffix(&up.name, "Up").to_string();
    shift_with(norm, up, dn, use_reciprocal, name, |n, u, d| {
        let upshift = u / n - 1.0;
        let dnshift = d / n - 1.0;
        upshift.abs().max(dnshift.abs())
    })
}

/// Per-bin `0.5 · ((up - norm) + (dn - norm))`.
pub fn average_shift(
    norm: &Histogram,
    up: &Histogram,
    dn: &Histogram,
    use_reciprocal: bool,
) -> Result<Histogram> {
    let name = format!("{}Avg", strip_suffix(&up.name, "Up"));
    shift_with(norm, up, dn, use_reciprocal, name, |n, u, d| 0.5 * ((u - n) + (d - n)))
}

/// Per-bin `0.5 · ((up - norm) - (dn - norm))`.
pub fn shift_envelope(
    norm: &Histogram,
    up: &Histogram,
    dn: &Histogram,
    use_reciprocal: bool,
) -> Result<Histogram> {
    let name = format!("{}Shift", strip_suffix(&up.name, "Up"));
    shift_with(norm, up, dn, use_reciprocal, name, |n, u, d| 0.5 * ((u - n) - (d - n)))
}

fn shift_with(
    norm: &Histogram,
    up: &Histogram,
    dn: &Histogram,
    use_reciprocal: bool,
    name: String,
    per_bin: impl Fn(f64, f64, f64) -> f64,
) -> Result<Histogram> {
    for h in [up, dn] {
        if h.n_bins() != norm.n_bins() {
            return Err(Error::BinMismatch {
                context: format!("shift of '{}' against '{}'", h.name, norm.name),
                expected: norm.n_bins(),
                found: h.n_bins(),
            });
        }
    }
    let (up, dn) = if use_reciprocal {
        (reciprocal(up)?, reciprocal(dn)?)
    } else {
        (up.clone(), dn.clone())
    };

    let mut out = up.clone_named(name);
    out.reset();
    for i in 0..norm.n_bins() {
        let n = norm.content(i);
        let value = if n != 0.0 { per_bin(n, up.content(i), dn.content(i)) } else { 0.0 };
        out.set_content(i, value);
    }
    Ok(out)
}

fn strip_suffix<'a>(name: &'a str, suffix: &str) -> &'a str {
    name.strip_suffix(suffix).unwrap_or(name)
}

/// Whether `h` carries more than `threshold · total` events.
pub fn is_valid_histogram(h: &Histogram, total: f64, threshold: f64) -> bool {
    h.integral() > threshold * total
}

/// Whether an up/down pair is usable as a nuisance: the two differ somewhere
/// and both have a positive integral.
pub fn is_valid_shape(up: &Histogram, dn: &Histogram) -> bool {
    if up.n_bins() != dn.n_bins() {
        return false;
    }
    let differs = up.contents.iter().zip(&dn.contents).any(|(u, d)| u != d);
    differs
        && is_valid_histogram(up, 0.0, DEFAULT_THRESHOLD)
        && is_valid_histogram(dn, 0.0, DEFAULT_THRESHOLD)
}
