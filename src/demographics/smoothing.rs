//! Triangular-kernel moving average over the age axis

/// Normalised triangular weights for offsets `-half_width..=half_width`
///
/// Weight at offset `d` is proportional to `half_width + 1 - |d|`, so the kernel
/// peaks at the centre and falls linearly toward zero at the window edges.
pub fn triangular_weights(half_width: usize) -> Vec<f64> {
    let h = half_width as i64;
    let total = ((h + 1) * (h + 1)) as f64;
    (-h..=h)
        .map(|d| (h + 1 - d.abs()) as f64 / total)
        .collect()
}

/// One pass of the weighted moving average over `(age, value)` points sorted by age
///
/// Near the ends of the age range the window is cut off asymmetrically: only the
/// neighbours that exist contribute, and their weights are renormalised. Ages
/// absent from the series inside a window drop out the same way.
pub fn weighted_moving_average(points: &[(u32, f64)], half_width: usize) -> Vec<f64> {
    let h = half_width as i64;

    points
        .iter()
        .map(|&(age, value)| {
            let age = age as i64;
            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            for &(other_age, other_value) in points {
                let d = (other_age as i64 - age).abs();
                if d > h {
                    continue;
                }
                let w = (h + 1 - d) as f64;
                weighted += w * other_value;
                weight_sum += w;
            }

            if weight_sum > 0.0 {
                weighted / weight_sum
            } else {
                value
            }
        })
        .collect()
}
