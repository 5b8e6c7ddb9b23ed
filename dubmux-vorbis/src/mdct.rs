//! Modified discrete cosine transform.
//!
//! Power-of-two MDCT with precomputed trig and bit-reversal tables. The forward
//! transform takes `n` windowed samples and produces `n/2` spectral coefficients
//! scaled by `4/n`; the backward transform is its inverse up to the windowing
//! overlap-add.

const CPI1_8: f32 = 0.923_879_5;
const CPI2_8: f32 = std::f32::consts::FRAC_1_SQRT_2;
const CPI3_8: f32 = 0.382_683_43;

/// Precomputed MDCT state for one transform size.
#[derive(Debug, Clone)]
pub struct Mdct {
    n: usize,
    log2n: u32,
    trig: Vec<f32>,
    bitrev: Vec<usize>,
    scale: f32,
}

impl Mdct {
    /// Build lookup tables for a transform of `n` points; `n` must be a power of
    /// two and at least 64.
    pub fn new(n: usize) -> Self {
        assert!(n.is_power_of_two() && n >= 64, "mdct size {n}");
        let log2n = n.trailing_zeros();
        let n2 = n >> 1;
        let pi = std::f64::consts::PI;

        let mut trig = vec![0.0f32; n + n / 4];
        for i in 0..n / 4 {
            trig[i * 2] = ((pi / n as f64) * (4 * i) as f64).cos() as f32;
            trig[i * 2 + 1] = -((pi / n as f64) * (4 * i) as f64).sin() as f32;
            trig[n2 + i * 2] = ((pi / (2 * n) as f64) * (2 * i + 1) as f64).cos() as f32;
            trig[n2 + i * 2 + 1] = ((pi / (2 * n) as f64) * (2 * i + 1) as f64).sin() as f32;
        }
        for i in 0..n / 8 {
            trig[n + i * 2] = (((pi / n as f64) * (4 * i + 2) as f64).cos() * 0.5) as f32;
            trig[n + i * 2 + 1] = (-((pi / n as f64) * (4 * i + 2) as f64).sin() * 0.5) as f32;
        }

        let mut bitrev = vec![0usize; n / 4];
        let mask = (1usize << (log2n - 1)) - 1;
        let msb = 1usize << (log2n - 2);
        for i in 0..n / 8 {
            let mut acc = 0usize;
            let mut j = 0;
            while (msb >> j) != 0 {
                if ((msb >> j) & i) != 0 {
                    acc |= 1 << j;
                }
                j += 1;
            }
            bitrev[i * 2] = ((!acc) & mask) - 1;
            bitrev[i * 2 + 1] = acc;
        }

        Mdct {
            n,
            log2n,
            trig,
            bitrev,
            scale: 4.0 / n as f32,
        }
    }

    /// Transform size.
    pub fn n(&self) -> usize {
        self.n
    }

    fn butterfly_8(x: &mut [f32], off: usize) {
        let mut r0 = x[off + 6] + x[off + 2];
        let r1 = x[off + 6] - x[off + 2];
        let mut r2 = x[off + 4] + x[off];
        let r3 = x[off + 4] - x[off];

        x[off + 6] = r0 + r2;
        x[off + 4] = r0 - r2;

        r0 = x[off + 5] - x[off + 1];
        r2 = x[off + 7] - x[off + 3];
        x[off] = r1 + r0;
        x[off + 2] = r1 - r0;

        r0 = x[off + 5] + x[off + 1];
        let r1 = x[off + 7] + x[off + 3];
        x[off + 3] = r2 + r3;
        x[off + 1] = r2 - r3;
        x[off + 7] = r1 + r0;
        x[off + 5] = r1 - r0;
    }

    fn butterfly_16(x: &mut [f32], off: usize) {
        let mut r0 = x[off + 1] - x[off + 9];
        let mut r1 = x[off] - x[off + 8];

        x[off + 8] += x[off];
        x[off + 9] += x[off + 1];
        x[off] = (r0 + r1) * CPI2_8;
        x[off + 1] = (r0 - r1) * CPI2_8;

        r0 = x[off + 3] - x[off + 11];
        r1 = x[off + 10] - x[off + 2];
        x[off + 10] += x[off + 2];
        x[off + 11] += x[off + 3];
        x[off + 2] = r0;
        x[off + 3] = r1;

        r0 = x[off + 12] - x[off + 4];
        r1 = x[off + 13] - x[off + 5];
        x[off + 12] += x[off + 4];
        x[off + 13] += x[off + 5];
        x[off + 4] = (r0 - r1) * CPI2_8;
        x[off + 5] = (r0 + r1) * CPI2_8;

        r0 = x[off + 14] - x[off + 6];
        r1 = x[off + 15] - x[off + 7];
        x[off + 14] += x[off + 6];
        x[off + 15] += x[off + 7];
        x[off + 6] = r0;
        x[off + 7] = r1;

        Self::butterfly_8(x, off);
        Self::butterfly_8(x, off + 8);
    }

    fn butterfly_32(x: &mut [f32], off: usize) {
        let mut r0 = x[off + 30] - x[off + 14];
        let mut r1 = x[off + 31] - x[off + 15];

        x[off + 30] += x[off + 14];
        x[off + 31] += x[off + 15];
        x[off + 14] = r0;
        x[off + 15] = r1;

        r0 = x[off + 28] - x[off + 12];
        r1 = x[off + 29] - x[off + 13];
        x[off + 28] += x[off + 12];
        x[off + 29] += x[off + 13];
        x[off + 12] = r0 * CPI1_8 - r1 * CPI3_8;
        x[off + 13] = r0 * CPI3_8 + r1 * CPI1_8;

        r0 = x[off + 26] - x[off + 10];
        r1 = x[off + 27] - x[off + 11];
        x[off + 26] += x[off + 10];
        x[off + 27] += x[off + 11];
        x[off + 10] = (r0 - r1) * CPI2_8;
        x[off + 11] = (r0 + r1) * CPI2_8;

        r0 = x[off + 24] - x[off + 8];
        r1 = x[off + 25] - x[off + 9];
        x[off + 24] += x[off + 8];
        x[off + 25] += x[off + 9];
        x[off + 8] = r0 * CPI3_8 - r1 * CPI1_8;
        x[off + 9] = r1 * CPI3_8 + r0 * CPI1_8;

        r0 = x[off + 22] - x[off + 6];
        r1 = x[off + 7] - x[off + 23];
        x[off + 22] += x[off + 6];
        x[off + 23] += x[off + 7];
        x[off + 6] = r1;
        x[off + 7] = r0;

        r0 = x[off + 4] - x[off + 20];
        r1 = x[off + 5] - x[off + 21];
        x[off + 20] += x[off + 4];
        x[off + 21] += x[off + 5];
        x[off + 4] = r1 * CPI1_8 + r0 * CPI3_8;
        x[off + 5] = r1 * CPI3_8 - r0 * CPI1_8;

        r0 = x[off + 2] - x[off + 18];
        r1 = x[off + 3] - x[off + 19];
        x[off + 18] += x[off + 2];
        x[off + 19] += x[off + 3];
        x[off + 2] = (r1 + r0) * CPI2_8;
        x[off + 3] = (r1 - r0) * CPI2_8;

        r0 = x[off] - x[off + 16];
        r1 = x[off + 1] - x[off + 17];
        x[off + 16] += x[off];
        x[off + 17] += x[off + 1];
        x[off] = r1 * CPI3_8 + r0 * CPI1_8;
        x[off + 1] = r1 * CPI1_8 - r0 * CPI3_8;

        Self::butterfly_16(x, off);
        Self::butterfly_16(x, off + 16);
    }

    fn butterfly_first(t: &[f32], x: &mut [f32], off: usize, points: usize) {
        let mut x1 = off + points - 8;
        let mut x2 = off + (points >> 1) - 8;
        let mut ti = 0;

        loop {
            let mut r0 = x[x1 + 6] - x[x2 + 6];
            let mut r1 = x[x1 + 7] - x[x2 + 7];
            x[x1 + 6] += x[x2 + 6];
            x[x1 + 7] += x[x2 + 7];
            x[x2 + 6] = r1 * t[ti + 1] + r0 * t[ti];
            x[x2 + 7] = r1 * t[ti] - r0 * t[ti + 1];

            r0 = x[x1 + 4] - x[x2 + 4];
            r1 = x[x1 + 5] - x[x2 + 5];
            x[x1 + 4] += x[x2 + 4];
            x[x1 + 5] += x[x2 + 5];
            x[x2 + 4] = r1 * t[ti + 5] + r0 * t[ti + 4];
            x[x2 + 5] = r1 * t[ti + 4] - r0 * t[ti + 5];

            r0 = x[x1 + 2] - x[x2 + 2];
            r1 = x[x1 + 3] - x[x2 + 3];
            x[x1 + 2] += x[x2 + 2];
            x[x1 + 3] += x[x2 + 3];
            x[x2 + 2] = r1 * t[ti + 9] + r0 * t[ti + 8];
            x[x2 + 3] = r1 * t[ti + 8] - r0 * t[ti + 9];

            r0 = x[x1] - x[x2];
            r1 = x[x1 + 1] - x[x2 + 1];
            x[x1] += x[x2];
            x[x1 + 1] += x[x2 + 1];
            x[x2] = r1 * t[ti + 13] + r0 * t[ti + 12];
            x[x2 + 1] = r1 * t[ti + 12] - r0 * t[ti + 13];

            if x2 == off {
                break;
            }
            x1 -= 8;
            x2 -= 8;
            ti += 16;
        }
    }

    fn butterfly_generic(t: &[f32], x: &mut [f32], off: usize, points: usize, trigint: usize) {
        let mut x1 = off + points - 8;
        let mut x2 = off + (points >> 1) - 8;
        let mut ti = 0;

        loop {
            let mut r0 = x[x1 + 6] - x[x2 + 6];
            let mut r1 = x[x1 + 7] - x[x2 + 7];
            x[x1 + 6] += x[x2 + 6];
            x[x1 + 7] += x[x2 + 7];
            x[x2 + 6] = r1 * t[ti + 1] + r0 * t[ti];
            x[x2 + 7] = r1 * t[ti] - r0 * t[ti + 1];

            ti += trigint;

            r0 = x[x1 + 4] - x[x2 + 4];
            r1 = x[x1 + 5] - x[x2 + 5];
            x[x1 + 4] += x[x2 + 4];
            x[x1 + 5] += x[x2 + 5];
            x[x2 + 4] = r1 * t[ti + 1] + r0 * t[ti];
            x[x2 + 5] = r1 * t[ti] - r0 * t[ti + 1];

            ti += trigint;

            r0 = x[x1 + 2] - x[x2 + 2];
            r1 = x[x1 + 3] - x[x2 + 3];
            x[x1 + 2] += x[x2 + 2];
            x[x1 + 3] += x[x2 + 3];
            x[x2 + 2] = r1 * t[ti + 1] + r0 * t[ti];
            x[x2 + 3] = r1 * t[ti] - r0 * t[ti + 1];

            ti += trigint;

            r0 = x[x1] - x[x2];
            r1 = x[x1 + 1] - x[x2 + 1];
            x[x1] += x[x2];
            x[x1 + 1] += x[x2 + 1];
            x[x2] = r1 * t[ti + 1] + r0 * t[ti];
            x[x2 + 1] = r1 * t[ti] - r0 * t[ti + 1];

            ti += trigint;

            if x2 == off {
                break;
            }
            x1 -= 8;
            x2 -= 8;
        }
    }

    fn butterflies(&self, x: &mut [f32], off: usize, points: usize) {
        let mut stages = self.log2n as i32 - 5;

        stages -= 1;
        if stages > 0 {
            Self::butterfly_first(&self.trig, x, off, points);
        }

        let mut i = 1;
        loop {
            stages -= 1;
            if stages <= 0 {
                break;
            }
            for j in 0..(1usize << i) {
                Self::butterfly_generic(&self.trig, x, off + (points >> i) * j, points >> i, 4 << i);
            }
            i += 1;
        }

        let mut j = 0;
        while j < points {
            Self::butterfly_32(x, off + j);
            j += 32;
        }
    }

    fn bitreverse(&self, x: &mut [f32]) {
        let n = self.n;
        let mut bit = 0;
        let mut w0 = 0usize;
        let mut w1 = n >> 1;
        let xoff = n >> 1;
        let mut t = n;
        let trig = &self.trig;

        loop {
            let mut x0 = xoff + self.bitrev[bit];
            let mut x1 = xoff + self.bitrev[bit + 1];

            let mut r0 = x[x0 + 1] - x[x1 + 1];
            let mut r1 = x[x0] + x[x1];
            let mut r2 = r1 * trig[t] + r0 * trig[t + 1];
            let mut r3 = r1 * trig[t + 1] - r0 * trig[t];

            w1 -= 4;

            r0 = (x[x0 + 1] + x[x1 + 1]) * 0.5;
            r1 = (x[x0] - x[x1]) * 0.5;

            x[w0] = r0 + r2;
            x[w1 + 2] = r0 - r2;
            x[w0 + 1] = r1 + r3;
            x[w1 + 3] = r3 - r1;

            x0 = xoff + self.bitrev[bit + 2];
            x1 = xoff + self.bitrev[bit + 3];

            r0 = x[x0 + 1] - x[x1 + 1];
            r1 = x[x0] + x[x1];
            r2 = r1 * trig[t + 2] + r0 * trig[t + 3];
            r3 = r1 * trig[t + 3] - r0 * trig[t + 2];

            r0 = (x[x0 + 1] + x[x1 + 1]) * 0.5;
            r1 = (x[x0] - x[x1]) * 0.5;

            x[w0 + 2] = r0 + r2;
            x[w1] = r0 - r2;
            x[w0 + 3] = r1 + r3;
            x[w1 + 1] = r3 - r1;

            t += 4;
            bit += 4;
            w0 += 4;

            if w0 >= w1 {
                break;
            }
        }
    }

    /// Forward transform: `input` holds `n` windowed samples, `output` receives
    /// the first `n/2` coefficients.
    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        let n = self.n;
        let n2 = n >> 1;
        let n4 = n >> 2;
        let n8 = n >> 3;
        debug_assert!(input.len() >= n && output.len() >= n2);

        let mut w = vec![0.0f32; n];
        let w2 = n2;

        // window + rotate + step 1
        let mut x0 = n2 + n4;
        let mut x1 = x0 + 1;
        let mut t = n2;
        let mut i = 0;

        while i < n8 {
            x0 -= 4;
            t -= 2;
            let r0 = input[x0 + 2] + input[x1];
            let r1 = input[x0] + input[x1 + 2];
            w[w2 + i] = r1 * self.trig[t + 1] + r0 * self.trig[t];
            w[w2 + i + 1] = r1 * self.trig[t] - r0 * self.trig[t + 1];
            x1 += 4;
            i += 2;
        }

        x1 = 1;
        while i < n2 - n8 {
            t -= 2;
            x0 -= 4;
            let r0 = input[x0 + 2] - input[x1];
            let r1 = input[x0] - input[x1 + 2];
            w[w2 + i] = r1 * self.trig[t + 1] + r0 * self.trig[t];
            w[w2 + i + 1] = r1 * self.trig[t] - r0 * self.trig[t + 1];
            x1 += 4;
            i += 2;
        }

        x0 = n;
        while i < n2 {
            t -= 2;
            x0 -= 4;
            let r0 = -input[x0 + 2] - input[x1];
            let r1 = -input[x0] - input[x1 + 2];
            w[w2 + i] = r1 * self.trig[t + 1] + r0 * self.trig[t];
            w[w2 + i + 1] = r1 * self.trig[t] - r0 * self.trig[t + 1];
            x1 += 4;
            i += 2;
        }

        self.butterflies(&mut w, n2, n2);
        self.bitreverse(&mut w);

        // rotate + window
        let mut t = n2;
        let mut x0 = n2;
        let mut w1 = 0;
        for i in 0..n4 {
            x0 -= 1;
            output[i] = (w[w1] * self.trig[t] + w[w1 + 1] * self.trig[t + 1]) * self.scale;
            output[x0] = (w[w1] * self.trig[t + 1] - w[w1 + 1] * self.trig[t]) * self.scale;
            w1 += 2;
            t += 2;
        }
    }

    /// Inverse transform: `input` holds `n/2` coefficients, `output` receives `n`
    /// time-domain samples (still to be windowed and overlap-added).
    pub fn backward(&self, input: &[f32], output: &mut [f32]) {
        let n = self.n;
        let n2 = (n >> 1) as isize;
        let n4 = (n >> 2) as isize;
        debug_assert!(input.len() >= n / 2 && output.len() >= n);

        let trig = &self.trig;

        // rotate
        let mut ix = n2 - 7;
        let mut ox = n2 + n4;
        let mut t = n4;
        loop {
            ox -= 4;
            let (o, i, ti) = (ox as usize, ix as usize, t as usize);
            output[o] = -input[i + 2] * trig[ti + 3] - input[i] * trig[ti + 2];
            output[o + 1] = input[i] * trig[ti + 3] - input[i + 2] * trig[ti + 2];
            output[o + 2] = -input[i + 6] * trig[ti + 1] - input[i + 4] * trig[ti];
            output[o + 3] = input[i + 4] * trig[ti + 1] - input[i + 6] * trig[ti];
            ix -= 8;
            t += 4;
            if ix < 0 {
                break;
            }
        }

        let mut ix = n2 - 8;
        let mut ox = n2 + n4;
        let mut t = n4;
        loop {
            t -= 4;
            let (o, i, ti) = (ox as usize, ix as usize, t as usize);
            output[o] = input[i + 4] * trig[ti + 3] + input[i + 6] * trig[ti + 2];
            output[o + 1] = input[i + 4] * trig[ti + 2] - input[i + 6] * trig[ti + 3];
            output[o + 2] = input[i] * trig[ti + 1] + input[i + 2] * trig[ti];
            output[o + 3] = input[i] * trig[ti] - input[i + 2] * trig[ti + 1];
            ix -= 8;
            ox += 4;
            if ix < 0 {
                break;
            }
        }

        self.butterflies(output, n2 as usize, n2 as usize);
        self.bitreverse(output);

        // rotate + window
        let mut ox1 = (n2 + n4) as usize;
        let mut ox2 = (n2 + n4) as usize;
        let mut ix = 0usize;
        let mut t = n2 as usize;
        loop {
            ox1 -= 4;

            output[ox1 + 3] = output[ix] * trig[t + 1] - output[ix + 1] * trig[t];
            output[ox2] = -(output[ix] * trig[t] + output[ix + 1] * trig[t + 1]);

            output[ox1 + 2] = output[ix + 2] * trig[t + 3] - output[ix + 3] * trig[t + 2];
            output[ox2 + 1] = -(output[ix + 2] * trig[t + 2] + output[ix + 3] * trig[t + 3]);

            output[ox1 + 1] = output[ix + 4] * trig[t + 5] - output[ix + 5] * trig[t + 4];
            output[ox2 + 2] = -(output[ix + 4] * trig[t + 4] + output[ix + 5] * trig[t + 5]);

            output[ox1] = output[ix + 6] * trig[t + 7] - output[ix + 7] * trig[t + 6];
            output[ox2 + 3] = -(output[ix + 6] * trig[t + 6] + output[ix + 7] * trig[t + 7]);

            ox2 += 4;
            ix += 8;
            t += 8;
            if ix >= ox1 {
                break;
            }
        }

        let mut ix = (n2 + n4) as usize;
        let mut ox1 = n4 as usize;
        let mut ox2 = ox1;
        loop {
            ox1 -= 4;
            ix -= 4;

            output[ox1 + 3] = output[ix + 3];
            output[ox2] = -output[ix + 3];
            output[ox1 + 2] = output[ix + 2];
            output[ox2 + 1] = -output[ix + 2];
            output[ox1 + 1] = output[ix + 1];
            output[ox2 + 2] = -output[ix + 1];
            output[ox1] = output[ix];
            output[ox2 + 3] = -output[ix];

            ox2 += 4;
            if ox2 >= ix {
                break;
            }
        }

        let mut ix = (n2 + n4) as usize;
        let mut ox1 = (n2 + n4) as usize;
        let ox2 = n2 as usize;
        loop {
            ox1 -= 4;
            output[ox1] = output[ix + 3];
            output[ox1 + 1] = output[ix + 2];
            output[ox1 + 2] = output[ix + 1];
            output[ox1 + 3] = output[ix];
            ix += 4;
            if ox1 <= ox2 {
                break;
            }
        }
    }
}
