//! Linear prediction for stream edge extrapolation.
//!
//! The analysis window needs data beyond both ends of the stream; a short
//! LPC filter trained on the nearest real samples synthesizes it.

/// Derive `m` LPC coefficients from `data[offset..offset+n]` via
/// Levinson-Durbin. Returns the residual error power.
pub fn lpc_from_data(data: &[f32], offset: usize, lpci: &mut [f32], n: usize, m: usize) -> f32 {
    let mut aut = vec![0.0f64; m + 1];
    let mut lpc = vec![0.0f64; m];

    // autocorrelation, m+1 lag coefficients
    for (j, a) in aut.iter_mut().enumerate() {
        let mut d = 0.0f64;
        for i in j..n {
            d += data[offset + i] as f64 * data[offset + i - j] as f64;
        }
        *a = d;
    }

    let mut error = aut[0];

    for i in 0..m {
        let mut r = -aut[i + 1];

        if error == 0.0 {
            for c in lpci.iter_mut() {
                *c = 0.0;
            }
            return 0.0;
        }

        for j in 0..i {
            r -= lpc[j] * aut[i - j];
        }
        r /= error;

        lpc[i] = r;
        let half = i / 2;
        for j in 0..half {
            let tmp = lpc[j];
            lpc[j] += r * lpc[i - 1 - j];
            lpc[i - 1 - j] += r * tmp;
        }
        if i % 2 > 0 {
            lpc[half] += lpc[half] * r;
        }

        error *= 1.0 - r * r;
    }

    for (out, &c) in lpci.iter_mut().zip(lpc.iter()) {
        *out = c as f32;
    }
    error as f32
}

/// Run the predictor: prime with `data[offset1..offset1+m]`, write `n`
/// predicted samples starting at `data[offset2]`.
pub fn lpc_predict(coeff: &[f32], data: &mut [f32], offset1: usize, m: usize, offset2: usize, n: usize) {
    let mut work = vec![0.0f32; m + n];
    work[..m].copy_from_slice(&data[offset1..offset1 + m]);

    for i in 0..n {
        let mut y = 0.0f32;
        let mut o = i;
        let mut p = m;
        for _ in 0..m {
            p -= 1;
            y -= work[o] * coeff[p];
            o += 1;
        }
        work[o] = y;
        data[offset2 + i] = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_signal_extends_flat() {
        let mut data = vec![0.5f32; 96];
        data.extend(std::iter::repeat(0.0).take(32));
        let mut lpc = vec![0.0f32; 8];
        lpc_from_data(&data.clone(), 0, &mut lpc, 96, 8);
        lpc_predict(&lpc, &mut data, 88, 8, 96, 32);
        for &v in &data[96..] {
            assert!((v - 0.5).abs() < 0.05, "predicted {v}");
        }
    }

    #[test]
    fn test_sine_continues_in_phase() {
        let n = 256;
        let mut data: Vec<f32> = (0..n)
            .map(|i| (i as f32 * 0.2).sin())
            .collect();
        data.extend(std::iter::repeat(0.0).take(64));
        let mut lpc = vec![0.0f32; 16];
        lpc_from_data(&data.clone(), 0, &mut lpc, n, 16);
        lpc_predict(&lpc, &mut data, n - 16, 16, n, 64);
        for (i, &v) in data[n..].iter().enumerate() {
            let expect = ((n + i) as f32 * 0.2).sin();
            assert!((v - expect).abs() < 0.05, "sample {i}: {v} vs {expect}");
        }
    }

    #[test]
    fn test_silence_yields_zero_filter() {
        let data = vec![0.0f32; 64];
        let mut lpc = vec![1.0f32; 8];
        let err = lpc_from_data(&data, 0, &mut lpc, 64, 8);
        assert_eq!(err, 0.0);
        assert!(lpc.iter().all(|&c| c == 0.0));
    }
}
