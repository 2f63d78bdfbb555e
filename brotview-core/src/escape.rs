use crate::complex::Complex;

/// Squared escape radius. An orbit with `|z|² > 4` has escaped.
pub const ESCAPE_RADIUS_SQ: f64 = 4.0;

/// Count iterations of `z ← z² + c` (from `z₀ = 0`) before the orbit escapes.
///
/// Returns a value in `[0, max_iterations]`. A point that escapes on the
/// very first step returns `0`; a point that stays bounded for the whole
/// budget returns `max_iterations`, which callers treat as "interior".
///
/// Pure and allocation-free, so workers call it concurrently.
#[inline]
pub fn escape_iterations(c: Complex, max_iterations: u32) -> u32 {
    let mut z = Complex::ZERO;
    let mut n = 0;
    while n < max_iterations {
        z = z.square_add(c);
        if z.norm_sq() > ESCAPE_RADIUS_SQ {
            break;
        }
        n += 1;
    }
    n
}
