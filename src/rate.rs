//! Null-safe ratio arithmetic shared by every metric table.
//!
//! Every value is reported with two decimals, rounded half away from zero.
//! Count ratios are computed in integer hundredths; means of measured values
//! are rounded on their shortest decimal form, so a mean that prints as
//! `1.005` becomes `1.01` just like the matching count ratio.

/// `numerator / denominator` in hundredths, rounded half up.
fn hundredths(numerator: u128, denominator: u128) -> u128 {
    let scaled = numerator * 100;
    let mut q = scaled / denominator;
    if (scaled % denominator) * 2 >= denominator {
        q += 1;
    }
    q
}

/// `100 * numerator / denominator`, or `None` when the denominator is zero.
pub fn conversion_rate(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(hundredths(numerator as u128 * 100, denominator as u128) as f64 / 100.0)
}

/// Mean of the present values; missing values count in neither the sum nor
/// the denominator. `None` when nothing is present.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0_f64, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { None } else { Some(round2(sum / n as f64)) }
}

/// Ratio of two counts that is not a percentage (e.g. searches per user).
pub fn per_unit(numerator: usize, denominator: usize) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(hundredths(numerator as u128, denominator as u128) as f64 / 100.0)
}

/// Two decimals, half away from zero, decided on the nine-digit decimal
/// rendering of `x` rather than on its binary value.
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let text = format!("{:.9}", x.abs());
    let Some((whole, frac)) = text.split_once('.') else { return x };
    let (Ok(whole), Ok(cents)) = (whole.parse::<u128>(), frac[..2].parse::<u128>()) else {
        return x;
    };
    let round_up = frac.as_bytes()[2] >= b'5';
    let magnitude = (whole * 100 + cents + u128::from(round_up)) as f64 / 100.0;
    if x < 0.0 && magnitude > 0.0 { -magnitude } else { magnitude }
}
