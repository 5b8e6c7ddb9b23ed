//! Piecewise-linear spectral floor.
//!
//! The floor is a set of posts on a fixed x grid; fitting runs a greedy
//! split of least-squares line segments against the masking curve, encoding
//! predicts each post from its neighbors and wraps the deviation into the
//! nonnegative range the scalar book covers.

use crate::codebook::Codebook;
use crate::tables::{db_quant, ilog, render_line0, render_point};
use dubmux_core::BitPacker;

/// Floor configuration as carried in the setup header.
#[derive(Debug, Clone)]
pub struct Floor1Info {
    pub partitions: usize,
    pub partitionclass: Vec<usize>,
    pub class_dim: Vec<usize>,
    pub class_subs: Vec<u32>,
    pub class_book: Vec<usize>,
    pub class_subbook: Vec<Vec<i32>>,
    /// Amplitude quantization granularity, 1..=4.
    pub mult: usize,
    /// Post x positions; `postlist[0] = 0` and `postlist[1]` is the range end.
    pub postlist: Vec<i32>,
    pub maxover: f32,
    pub maxunder: f32,
    pub maxerr: f32,
    pub twofitatten: f32,
    pub twofitweight: i64,
}

impl Floor1Info {
    /// Serialize into the setup header.
    pub fn pack(&self, opb: &mut BitPacker) {
        let maxposit = self.postlist[1];
        let mut maxclass = 0usize;

        opb.write(self.partitions as u32, 5);
        for &c in &self.partitionclass {
            opb.write(c as u32, 4);
            if c > maxclass {
                maxclass = c;
            }
        }

        for j in 0..=maxclass {
            opb.write(self.class_dim[j] as u32 - 1, 3);
            opb.write(self.class_subs[j], 2);
            if self.class_subs[j] > 0 {
                opb.write(self.class_book[j] as u32, 8);
            }
            for k in 0..(1usize << self.class_subs[j]) {
                opb.write((self.class_subbook[j][k] + 1) as u32, 8);
            }
        }

        opb.write(self.mult as u32 - 1, 2);
        let rangebits = ilog(maxposit as u32 - 1);
        opb.write(rangebits, 4);

        let mut count = 0usize;
        let mut k = 0usize;
        for j in 0..self.partitions {
            count += self.class_dim[self.partitionclass[j]];
            while k < count {
                opb.write(self.postlist[k + 2] as u32, rangebits);
                k += 1;
            }
        }
    }
}

/// Derived lookup for one floor configuration.
#[derive(Debug, Clone)]
pub struct Floor1Look {
    pub info: Floor1Info,
    /// Spectrum length covered (`postlist[1]`).
    pub n: usize,
    pub posts: usize,
    pub quant_q: i32,
    /// Sorted position -> post number.
    pub forward_index: Vec<usize>,
    /// Post number -> sorted position.
    pub reverse_index: Vec<usize>,
    /// Post x values in sorted order.
    pub sorted_index: Vec<i32>,
    /// Decode-side bracketing neighbors for post i+2.
    pub loneighbor: Vec<usize>,
    pub hineighbor: Vec<usize>,
}

impl Floor1Look {
    pub fn new(info: Floor1Info) -> Self {
        let mut posts = 2usize;
        for j in 0..info.partitions {
            posts += info.class_dim[info.partitionclass[j]];
        }
        let n = info.postlist[1] as usize;

        let mut forward_index: Vec<usize> = (0..posts).collect();
        forward_index.sort_by_key(|&i| info.postlist[i]);
        let mut reverse_index = vec![0usize; posts];
        for (sortpos, &post) in forward_index.iter().enumerate() {
            reverse_index[post] = sortpos;
        }
        let sorted_index: Vec<i32> = forward_index.iter().map(|&i| info.postlist[i]).collect();

        let quant_q = match info.mult {
            1 => 256,
            2 => 128,
            3 => 86,
            _ => 64,
        };

        let mut loneighbor = vec![0usize; posts - 2];
        let mut hineighbor = vec![0usize; posts - 2];
        for i in 0..posts - 2 {
            let mut lo = 0usize;
            let mut hi = 1usize;
            let mut lx = 0i32;
            let mut hx = n as i32;
            let currentx = info.postlist[i + 2];
            for j in 0..i + 2 {
                let x = info.postlist[j];
                if x > lx && x < currentx {
                    lo = j;
                    lx = x;
                }
                if x < hx && x > currentx {
                    hi = j;
                    hx = x;
                }
            }
            loneighbor[i] = lo;
            hineighbor[i] = hi;
        }

        Floor1Look {
            info,
            n,
            posts,
            quant_q,
            forward_index,
            reverse_index,
            sorted_index,
            loneighbor,
            hineighbor,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LsfitAcc {
    x0: i32,
    x1: i32,
    xa: i64,
    ya: i64,
    x2a: i64,
    xya: i64,
    an: i64,
}

fn accumulate_fit(
    flr: &[f32],
    mdct: &[f32],
    x0: i32,
    x1: i32,
    a: &mut LsfitAcc,
    n: usize,
    info: &Floor1Info,
) -> i64 {
    let (mut xa, mut ya, mut x2a, mut xya, mut na) = (0i64, 0i64, 0i64, 0i64, 0i64);
    let (mut xb, mut yb, mut x2b, mut xyb, mut nb) = (0i64, 0i64, 0i64, 0i64, 0i64);

    *a = LsfitAcc { x0, x1, ..Default::default() };
    let x1 = x1.min(n as i32 - 1);

    for i in x0..=x1 {
        let iu = i as usize;
        let quantized = db_quant(flr[iu]) as i64;
        if quantized > 0 {
            if mdct[iu] + info.twofitatten >= flr[iu] {
                xa += i as i64;
                ya += quantized;
                x2a += (i * i) as i64;
                xya += i as i64 * quantized;
                na += 1;
            } else {
                xb += i as i64;
                yb += quantized;
                x2b += (i * i) as i64;
                xyb += i as i64 * quantized;
                nb += 1;
            }
        }
    }

    xb += xa;
    yb += ya;
    x2b += x2a;
    xyb += xya;
    nb += na;

    // weight toward the audible bins when they clear the threshold
    let weight = nb * info.twofitweight / (na + 1);
    a.xa = xa * weight + xb;
    a.ya = ya * weight + yb;
    a.x2a = x2a * weight + x2b;
    a.xya = xya * weight + xyb;
    a.an = na * weight + nb;

    na
}

/// Least-squares line through the accumulated ranges, optionally anchored at
/// preset endpoint values. Returns false when the fit is degenerate.
fn fit_line(a: &[LsfitAcc], y0: &mut i32, y1: &mut i32) -> bool {
    let (mut x, mut y, mut x2, mut xy, mut an) = (0i64, 0i64, 0i64, 0i64, 0i64);
    let x0 = a[0].x0 as i64;
    let x1 = a[a.len() - 1].x1 as i64;

    for acc in a {
        x += acc.xa;
        y += acc.ya;
        x2 += acc.x2a;
        xy += acc.xya;
        an += acc.an;
    }

    if *y0 >= 0 {
        x += x0;
        y += *y0 as i64;
        x2 += x0 * x0;
        xy += *y0 as i64 * x0;
        an += 1;
    }
    if *y1 >= 0 {
        x += x1;
        y += *y1 as i64;
        x2 += x1 * x1;
        xy += *y1 as i64 * x1;
        an += 1;
    }

    let denom = an * x2 - x * x;
    if denom > 0 {
        let a0 = (y * x2 - xy * x) as f64 / denom as f64;
        let b0 = (an * xy - x * y) as f64 / denom as f64;
        *y0 = ((a0 + b0 * x0 as f64).round() as i32).clamp(0, 1023);
        *y1 = ((a0 + b0 * x1 as f64).round() as i32).clamp(0, 1023);
        true
    } else {
        *y0 = 0;
        *y1 = 0;
        false
    }
}

fn inspect_error(x0: i32, x1: i32, y0: i32, y1: i32, mask: &[f32], mdct: &[f32], info: &Floor1Info) -> bool {
    let dy = y1 - y0;
    let adx = x1 - x0;
    let mut ady = dy.abs();
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let mut x = x0;
    let mut y = y0;
    let mut err = 0;
    let mut val = db_quant(mask[x as usize]);
    let mut mse: i64;
    let mut n = 1i64;

    ady -= (base * adx).abs();

    mse = ((y - val) * (y - val)) as i64;
    if mdct[x as usize] + info.twofitatten >= mask[x as usize] {
        if (y as f32) + info.maxover < val as f32 {
            return true;
        }
        if (y as f32) - info.maxunder > val as f32 {
            return true;
        }
    }

    loop {
        x += 1;
        if x >= x1 {
            break;
        }
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }

        val = db_quant(mask[x as usize]);
        mse += ((y - val) * (y - val)) as i64;
        n += 1;
        if mdct[x as usize] + info.twofitatten >= mask[x as usize] && val > 0 {
            if (y as f32) + info.maxover < val as f32 {
                return true;
            }
            if (y as f32) - info.maxunder > val as f32 {
                return true;
            }
        }
    }

    if info.maxover * info.maxover / n as f32 > info.maxerr {
        return false;
    }
    if info.maxunder * info.maxunder / n as f32 > info.maxerr {
        return false;
    }
    mse as f32 / n as f32 > info.maxerr
}

fn post_y(a: &[i32], b: &[i32], pos: usize) -> i32 {
    if a[pos] < 0 {
        return b[pos];
    }
    if b[pos] < 0 {
        return a[pos];
    }
    (a[pos] + b[pos]) >> 1
}

impl Floor1Look {
    /// Fit posts against the masking curve; `None` means an unused (all-quiet)
    /// floor.
    pub fn fit(&self, logmdct: &[f32], logmask: &[f32]) -> Option<Vec<i32>> {
        let info = &self.info;
        let n = self.n;
        let posts = self.posts;

        let mut fits = vec![LsfitAcc::default(); posts - 1];
        let mut fit_value_a = vec![-200i32; posts];
        let mut fit_value_b = vec![-200i32; posts];
        // neighbors by sorted position, starting at the implicit endpoints
        let mut loneighbor = vec![0usize; posts];
        let mut hineighbor = vec![1usize; posts];
        let mut memo = vec![usize::MAX; posts];

        let mut nonzero = 0i64;
        for i in 0..posts - 1 {
            nonzero += accumulate_fit(
                logmask,
                logmdct,
                self.sorted_index[i],
                self.sorted_index[i + 1],
                &mut fits[i],
                n,
                info,
            );
        }
        if nonzero == 0 {
            return None;
        }

        // implicit base fit over the whole range
        let mut y0 = -200;
        let mut y1 = -200;
        fit_line(&fits[..posts - 1], &mut y0, &mut y1);
        fit_value_a[0] = y0;
        fit_value_b[0] = y0;
        fit_value_a[1] = y1;
        fit_value_b[1] = y1;

        // greedy progressive splitting
        for i in 2..posts {
            let sortpos = self.reverse_index[i];
            let ln = loneighbor[sortpos];
            let hn = hineighbor[sortpos];

            if memo[ln] == hn {
                continue;
            }
            let lsortpos = self.reverse_index[ln];
            let hsortpos = self.reverse_index[hn];
            memo[ln] = hn;

            let lx = info.postlist[ln];
            let hx = info.postlist[hn];
            let ly = post_y(&fit_value_a, &fit_value_b, ln);
            let hy = post_y(&fit_value_a, &fit_value_b, hn);

            if inspect_error(lx, hx, ly, hy, logmask, logmdct, info) {
                // local error out of bounds; split the segment
                let mut ly0 = -200;
                let mut ly1 = -200;
                let mut hy0 = -200;
                let mut hy1 = -200;
                let ok0 = fit_line(&fits[lsortpos..sortpos], &mut ly0, &mut ly1);
                let ok1 = fit_line(&fits[sortpos..hsortpos], &mut hy0, &mut hy1);

                if !ok0 {
                    ly0 = ly;
                    ly1 = hy0;
                }
                if !ok1 {
                    hy0 = ly1;
                    hy1 = hy;
                }

                if !ok0 && !ok1 {
                    fit_value_a[i] = -200;
                    fit_value_b[i] = -200;
                } else {
                    fit_value_b[ln] = ly0;
                    if ln == 0 {
                        fit_value_a[ln] = ly0;
                    }
                    fit_value_a[i] = ly1;
                    fit_value_b[i] = hy0;
                    fit_value_a[hn] = hy1;
                    if hn == 1 {
                        fit_value_b[hn] = hy1;
                    }

                    if ly1 >= 0 || hy0 >= 0 {
                        let mut j = sortpos;
                        while j > 0 {
                            j -= 1;
                            if hineighbor[j] == hn {
                                hineighbor[j] = i;
                            } else {
                                break;
                            }
                        }
                        for j in sortpos + 1..posts {
                            if loneighbor[j] == ln {
                                loneighbor[j] = i;
                            } else {
                                break;
                            }
                        }
                    }
                }
            } else {
                fit_value_a[i] = -200;
                fit_value_b[i] = -200;
            }
        }

        let mut output = vec![0i32; posts];
        output[0] = post_y(&fit_value_a, &fit_value_b, 0);
        output[1] = post_y(&fit_value_a, &fit_value_b, 1);

        for i in 2..posts {
            let ln = self.loneighbor[i - 2];
            let hn = self.hineighbor[i - 2];
            let predicted = render_point(
                info.postlist[ln],
                info.postlist[hn],
                output[ln],
                output[hn],
                info.postlist[i],
            );
            let vx = post_y(&fit_value_a, &fit_value_b, i);

            if vx >= 0 && predicted != vx {
                output[i] = vx;
            } else {
                output[i] = predicted | 0x8000;
            }
        }

        Some(output)
    }

    /// Blend two post sets; the flag bit survives only when set on both.
    pub fn interpolate_fit(&self, a: Option<&[i32]>, b: Option<&[i32]>, del: i32) -> Option<Vec<i32>> {
        let (a, b) = (a?, b?);
        Some(
            (0..self.posts)
                .map(|i| {
                    let mut v = ((65536 - del) * (a[i] & 0x7fff) + del * (b[i] & 0x7fff) + 32768) >> 16;
                    if a[i] & 0x8000 != 0 && b[i] & 0x8000 != 0 {
                        v |= 0x8000;
                    }
                    v
                })
                .collect(),
        )
    }

    /// Quantize, predict and pack one floor; renders the coded curve into
    /// `ilogmask`. Returns true for an audible floor.
    pub fn encode(
        &self,
        opb: &mut BitPacker,
        books: &[Codebook],
        post: Option<&mut Vec<i32>>,
        ilogmask: &mut [i32],
    ) -> bool {
        let info = &self.info;
        let posts = self.posts;

        let post = match post {
            Some(p) => p,
            None => {
                opb.write(0, 1);
                for v in ilogmask.iter_mut() {
                    *v = 0;
                }
                return false;
            }
        };

        // quantize to the multiplier grid, keeping the no-fit flag
        for p in post.iter_mut() {
            let mut val = *p & 0x7fff;
            match info.mult {
                1 => val >>= 2,
                2 => val >>= 3,
                3 => val /= 12,
                _ => val >>= 4,
            }
            *p = val | (*p & 0x8000);
        }

        let mut out = vec![0i32; posts];
        out[0] = post[0];
        out[1] = post[1];

        for i in 2..posts {
            let ln = self.loneighbor[i - 2];
            let hn = self.hineighbor[i - 2];
            let predicted = render_point(
                info.postlist[ln],
                info.postlist[hn],
                post[ln],
                post[hn],
                info.postlist[i],
            );

            if post[i] & 0x8000 != 0 || predicted == post[i] {
                post[i] = predicted | 0x8000;
                out[i] = 0;
            } else {
                let headroom = (self.quant_q - predicted).min(predicted);
                let mut val = post[i] - predicted;

                // wrap the deviation into [0, quant_q) while keeping small
                // deviations cheap
                if val < 0 {
                    if val < -headroom {
                        val = headroom - val - 1;
                    } else {
                        val = -1 - (val << 1);
                    }
                } else if val >= headroom {
                    val += headroom;
                } else {
                    val <<= 1;
                }

                out[i] = val;
                post[ln] &= 0x7fff;
                post[hn] &= 0x7fff;
            }
        }

        opb.write(1, 1);
        let bits = ilog(self.quant_q as u32 - 1);
        opb.write(out[0] as u32, bits);
        opb.write(out[1] as u32, bits);

        let mut j = 2usize;
        for i in 0..info.partitions {
            let class = info.partitionclass[i];
            let cdim = info.class_dim[class];
            let csubbits = info.class_subs[class];
            let csub = 1usize << csubbits;
            let mut bookas = [0usize; 8];

            if csubbits > 0 {
                let mut maxval = [0i32; 8];
                for (k, m) in maxval.iter_mut().enumerate().take(csub) {
                    let booknum = info.class_subbook[class][k];
                    *m = if booknum < 0 {
                        1
                    } else {
                        books[booknum as usize].entries as i32
                    };
                }
                let mut cval = 0u32;
                let mut cshift = 0u32;
                for (k, slot) in bookas.iter_mut().enumerate().take(cdim) {
                    for (l, &m) in maxval.iter().enumerate().take(csub) {
                        if out[j + k] < m {
                            *slot = l;
                            break;
                        }
                    }
                    cval |= (*slot as u32) << cshift;
                    cshift += csubbits;
                }
                books[info.class_book[class]].encode(cval as usize, opb);
            }

            for (k, &slot) in bookas.iter().enumerate().take(cdim) {
                let book = info.class_subbook[class][slot];
                if book >= 0 {
                    books[book as usize].encode(out[j + k] as usize, opb);
                }
            }
            j += cdim;
        }

        // render the quantized curve a decoder would reconstruct
        let mut hx = 0i32;
        let mut lx = 0i32;
        let mut ly = post[0] * info.mult as i32;
        for j in 1..posts {
            let current = self.forward_index[j];
            let hy = post[current] & 0x7fff;
            if hy == post[current] {
                let hy = hy * info.mult as i32;
                hx = info.postlist[current];
                render_line0(lx, hx, ly, hy, ilogmask);
                lx = hx;
                ly = hy;
            }
        }
        for v in ilogmask.iter_mut().skip(hx as usize) {
            *v = ly;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup;

    fn short_look() -> Floor1Look {
        Floor1Look::new(setup::floor_info(0))
    }

    #[test]
    fn test_look_geometry() {
        let look = short_look();
        assert_eq!(look.posts, 10);
        assert_eq!(look.n, 128);
        assert_eq!(look.quant_q, 128);
        // sorted x positions are strictly increasing
        for w in look.sorted_index.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert_eq!(look.forward_index[0], 0);
        assert_eq!(look.forward_index[look.posts - 1], 1);
    }

    #[test]
    fn test_neighbors_bracket() {
        let look = short_look();
        for i in 0..look.posts - 2 {
            let x = look.info.postlist[i + 2];
            assert!(look.info.postlist[look.loneighbor[i]] < x);
            assert!(look.info.postlist[look.hineighbor[i]] > x);
        }
    }

    #[test]
    fn test_fit_silence_returns_none() {
        let look = short_look();
        let quiet = vec![-200.0f32; 128];
        assert!(look.fit(&quiet, &quiet).is_none());
    }

    #[test]
    fn test_fit_flat_spectrum() {
        let look = short_look();
        let logmdct = vec![-30.0f32; 128];
        let logmask = vec![-30.0f32; 128];
        let post = look.fit(&logmdct, &logmask).expect("audible floor");
        assert_eq!(post.len(), look.posts);
        let expect = db_quant(-30.0);
        for &p in &post {
            let v = p & 0x7fff;
            assert!((v - expect).abs() <= 2, "post {v} vs {expect}");
        }
    }

    #[test]
    fn test_interpolate_fit_midpoint() {
        let look = short_look();
        let a = vec![100i32; look.posts];
        let b = vec![200i32; look.posts];
        let mid = look.interpolate_fit(Some(&a), Some(&b), 32768).unwrap();
        for &v in &mid {
            assert_eq!(v & 0x7fff, 150);
        }
        assert!(look.interpolate_fit(None, Some(&b), 0).is_none());
    }

    #[test]
    fn test_encode_null_floor() {
        let look = short_look();
        let books = setup::build_books().unwrap();
        let mut opb = BitPacker::new();
        let mut mask = vec![5i32; 128];
        let used = look.encode(&mut opb, &books, None, &mut mask);
        assert!(!used);
        assert_eq!(opb.bits(), 1);
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_encode_flat_floor_renders_curve() {
        let look = short_look();
        let books = setup::build_books().unwrap();
        let logmdct = vec![-30.0f32; 128];
        let logmask = vec![-30.0f32; 128];
        let mut post = look.fit(&logmdct, &logmask).unwrap();
        let mut opb = BitPacker::new();
        let mut mask = vec![0i32; 128];
        let used = look.encode(&mut opb, &books, Some(&mut post), &mut mask);
        assert!(used);
        assert!(opb.bits() > 1);
        // quantized -30 dB: db_quant then >>3 then *2
        let expect = (db_quant(-30.0) >> 3) * 2;
        for (i, &v) in mask.iter().enumerate() {
            assert!((v - expect).abs() <= 4, "bin {i}: {v} vs {expect}");
        }
    }
}
