//! Turbo colormap.
//!
//! Uses the published polynomial approximation of Google's Turbo map:
//! each channel is a degree-5 polynomial in `x = v / 255`, clamped to
//! `[0, 1]`. Low values are dark blue, the middle is green/yellow and
//! high values are dark red.

use image::Rgb;

const RED: [f64; 6] = [
    0.135_721_38,
    4.615_392_60,
    -42.660_322_58,
    132.131_082_34,
    -152.942_393_96,
    59.286_379_43,
];

const GREEN: [f64; 6] = [
    0.091_402_61,
    2.194_188_39,
    4.842_966_58,
    -14.185_033_33,
    4.277_298_57,
    2.829_566_04,
];

const BLUE: [f64; 6] = [
    0.106_673_30,
    12.641_946_08,
    -60.582_048_36,
    110.362_767_71,
    -89.903_109_12,
    27.348_249_73,
];

/// Map an 8-bit value to its Turbo color.
#[must_use]
pub fn turbo(value: u8) -> Rgb<u8> {
    let x = f64::from(value) / 255.0;
    Rgb([channel(&RED, x), channel(&GREEN, x), channel(&BLUE, x)])
}

/// All 256 Turbo colors, indexed by input value.
#[must_use]
pub fn turbo_lut() -> [Rgb<u8>; 256] {
    std::array::from_fn(|i| turbo(u8::try_from(i).unwrap_or(u8::MAX)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(coefficients: &[f64; 6], x: f64) -> u8 {
    // Horner evaluation of c0 + c1 x + ... + c5 x^5.
    let v = coefficients
        .iter()
        .rev()
        .fold(0.0_f64, |acc, &c| acc.mul_add(x, c));
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
