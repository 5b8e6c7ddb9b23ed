//! Real FFT for tonal estimation.
//!
//! The spectral packer wants the real-signal spectrum laid out as
//! `[re0, re1, im1, re2, im2, ...]` so the masking pass can walk magnitude pairs.
//! Tonality only needs magnitudes, so a plain iterative radix-2 transform with
//! precomputed twiddles is enough.

/// Precomputed FFT state for one transform size.
#[derive(Debug, Clone)]
pub struct Fft {
    n: usize,
    twiddle_re: Vec<f32>,
    twiddle_im: Vec<f32>,
    rev: Vec<usize>,
}

impl Fft {
    /// Build tables for an `n`-point transform; `n` must be a power of two.
    pub fn new(n: usize) -> Self {
        assert!(n.is_power_of_two() && n >= 2, "fft size {n}");
        let bits = n.trailing_zeros();
        let pi = std::f64::consts::PI;

        let mut twiddle_re = vec![0.0f32; n / 2];
        let mut twiddle_im = vec![0.0f32; n / 2];
        for (k, (re, im)) in twiddle_re.iter_mut().zip(twiddle_im.iter_mut()).enumerate() {
            let ang = -2.0 * pi * k as f64 / n as f64;
            *re = ang.cos() as f32;
            *im = ang.sin() as f32;
        }

        let rev = (0..n)
            .map(|i| (i.reverse_bits() >> (usize::BITS - bits)) as usize)
            .collect();

        Fft {
            n,
            twiddle_re,
            twiddle_im,
            rev,
        }
    }

    /// Transform size.
    pub fn n(&self) -> usize {
        self.n
    }

    /// In-place forward transform of a real signal.
    ///
    /// On return `buf[0]` is the DC component and `buf[2k-1]`, `buf[2k]` hold the
    /// real and imaginary parts of bin `k`; the Nyquist bin is dropped.
    pub fn forward(&self, buf: &mut [f32]) {
        let n = self.n;
        debug_assert!(buf.len() >= n);

        let mut re = vec![0.0f32; n];
        let mut im = vec![0.0f32; n];
        for i in 0..n {
            re[i] = buf[self.rev[i]];
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            let mut base = 0;
            while base < n {
                for k in 0..half {
                    let (wr, wi) = (self.twiddle_re[k * step], self.twiddle_im[k * step]);
                    let (tr, ti) = (
                        re[base + half + k] * wr - im[base + half + k] * wi,
                        re[base + half + k] * wi + im[base + half + k] * wr,
                    );
                    re[base + half + k] = re[base + k] - tr;
                    im[base + half + k] = im[base + k] - ti;
                    re[base + k] += tr;
                    im[base + k] += ti;
                }
                base += len;
            }
            len <<= 1;
        }

        buf[0] = re[0];
        for k in 1..n / 2 {
            buf[2 * k - 1] = re[k];
            buf[2 * k] = im[k];
        }
        if n >= 2 {
            buf[n - 1] = re[n / 2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_signal() {
        let fft = Fft::new(8);
        let mut buf = vec![1.0f32; 8];
        fft.forward(&mut buf);
        assert!((buf[0] - 8.0).abs() < 1e-5);
        // all other bins near zero
        for (i, v) in buf.iter().enumerate().skip(1) {
            assert!(v.abs() < 1e-4, "bin {i} = {v}");
        }
    }

    #[test]
    fn test_single_tone_lands_in_one_bin() {
        let n = 64;
        let fft = Fft::new(n);
        let k = 5;
        let mut buf: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * k as f32 * i as f32 / n as f32).cos())
            .collect();
        fft.forward(&mut buf);
        // bin k magnitude should be n/2, everything else near zero
        let mag = (buf[2 * k - 1] * buf[2 * k - 1] + buf[2 * k] * buf[2 * k]).sqrt();
        assert!((mag - n as f32 / 2.0).abs() < 1e-3);
        let other = (buf[2 * (k + 3) - 1].powi(2) + buf[2 * (k + 3)].powi(2)).sqrt();
        assert!(other < 1e-3);
    }
}
