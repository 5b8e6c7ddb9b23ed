//! Analysis windows.
//!
//! The slope function is sin(pi/2 * sin^2((i+0.5)/n * pi)); a block transitioning
//! between sizes uses the smaller slope on the transitional side, centered in the
//! larger block with zero fill outside it.

/// Half-window slope for a block of size `n` (the table holds `n/2` points).
pub fn half_window(n: usize) -> Vec<f32> {
    let half = n / 2;
    let pi = std::f64::consts::PI;
    (0..half)
        .map(|i| {
            let s = ((i as f64 + 0.5) / half as f64 * (pi / 2.0)).sin();
            ((pi / 2.0) * s * s).sin() as f32
        })
        .collect()
}

/// Apply the analysis window in place to one block of samples.
///
/// `blocksizes` are the short/long sizes, `w` selects the current block size and
/// `lw`/`nw` the previous/next ones (forced short when the current block is
/// short).
pub fn apply_window(
    pcm: &mut [f32],
    windows: [&[f32]; 2],
    blocksizes: [usize; 2],
    lw: usize,
    w: usize,
    nw: usize,
) {
    let lw = if w != 0 { lw } else { 0 };
    let nw = if w != 0 { nw } else { 0 };

    let n = blocksizes[w];
    let ln = blocksizes[lw];
    let rn = blocksizes[nw];

    let left_begin = n / 4 - ln / 4;
    let left_end = left_begin + ln / 2;
    let right_begin = n / 2 + n / 4 - rn / 4;
    let right_end = right_begin + rn / 2;

    for x in pcm.iter_mut().take(left_begin) {
        *x = 0.0;
    }
    for i in left_begin..left_end {
        pcm[i] *= windows[lw][i - left_begin];
    }
    for i in right_begin..right_end {
        pcm[i] *= windows[nw][right_end - i - 1];
    }
    for x in pcm.iter_mut().take(n).skip(right_end) {
        *x = 0.0;
    }
}
