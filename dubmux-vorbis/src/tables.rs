//! Shared scalar helpers and dB lookup tables.

/// Bits needed to represent `v` (position of the highest set bit).
pub fn ilog(mut v: u32) -> u32 {
    let mut ret = 0;
    while v > 0 {
        ret += 1;
        v >>= 1;
    }
    ret
}

/// Bits needed to index `v` distinct values.
pub fn ilog2(v: u32) -> u32 {
    if v == 0 {
        return 0;
    }
    ilog(v - 1)
}

/// Population count used for residue stage cascades.
pub fn icount(mut v: u32) -> u32 {
    let mut ret = 0;
    while v > 0 {
        ret += v & 1;
        v >>= 1;
    }
    ret
}

/// Unit magnitude with the sign of `x`.
pub fn unitnorm(x: f32) -> f32 {
    f32::from_bits((x.to_bits() & 0x8000_0000) | 0x3f80_0000)
}

/// Fast dB estimate from the float bit pattern; `todb(1.0)` is approximately 0.
pub fn todb(x: f32) -> f32 {
    let i = x.to_bits() & 0x7fff_ffff;
    i as f32 * 7.17711438e-7 - 764.6161886
}

/// Quantize a dB value into the 0..=1023 floor domain.
pub fn db_quant(x: f32) -> i32 {
    let i = (x * 7.3142857 + 1023.5) as i32;
    i.clamp(0, 1023)
}

/// Interpolate the line through (x0,y0)-(x1,y1) at `x`, ignoring post flags.
pub fn render_point(x0: i32, x1: i32, y0: i32, y1: i32, x: i32) -> i32 {
    let y0 = y0 & 0x7fff;
    let y1 = y1 & 0x7fff;

    let dy = y1 - y0;
    let adx = x1 - x0;
    let ady = dy.abs();
    let err = ady * (x - x0);

    let off = err / adx;
    if dy < 0 {
        y0 - off
    } else {
        y0 + off
    }
}

/// Bresenham line render into an integer mask vector.
pub fn render_line0(x0: i32, x1: i32, y0: i32, y1: i32, d: &mut [i32]) {
    let dy = y1 - y0;
    let adx = x1 - x0;
    let mut ady = dy.abs();
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let mut x = x0;
    let mut y = y0;
    let mut err = 0;

    ady -= (base * adx).abs();

    d[x as usize] = y;

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
        d[x as usize] = y;
    }
}

/// Floor curve amplitude for a quantized dB index.
pub static FLOOR1_FROMDB_LOOKUP: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.128753e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
    0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
    0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
    0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
    0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
    0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
    0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
    0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
    0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
    0.00092223983, 0.00098217216, 0.0010459992, 0.0011139742,
    0.0011863665, 0.0012634633, 0.0013455702, 0.0014330129,
    0.0015261382, 0.0016253153, 0.0017309374, 0.0018434235,
    0.0019632195, 0.0020908006, 0.0022266726, 0.0023713743,
    0.0025254795, 0.0026895994, 0.0028643847, 0.0030505286,
    0.0032487691, 0.0034598925, 0.0036847358, 0.0039241906,
    0.0041792066, 0.0044507950, 0.0047400328, 0.0050480668,
    0.0053761186, 0.0057254891, 0.0060975636, 0.0064938176,
    0.0069158225, 0.0073652516, 0.0078438871, 0.0083536271,
    0.0088964928, 0.009474637, 0.010090352, 0.010746080,
    0.011444421, 0.012188144, 0.012980198, 0.013823725,
    0.014722068, 0.015678791, 0.016697687, 0.017782797,
    0.018938423, 0.020169149, 0.021479854, 0.022875735,
    0.024362330, 0.025945531, 0.027631618, 0.029427276,
    0.031339626, 0.033376252, 0.035545228, 0.037855157,
    0.040315199, 0.042935108, 0.045725273, 0.048696758,
    0.051861348, 0.055231591, 0.058820850, 0.062643361,
    0.066714279, 0.071049749, 0.075666962, 0.080584227,
    0.085821044, 0.091398179, 0.097337747, 0.10366330,
    0.11039993, 0.11757434, 0.12521498, 0.13335215,
    0.14201813, 0.15124727, 0.16107617, 0.17154380,
    0.18269168, 0.19456402, 0.20720788, 0.22067342,
    0.23501402, 0.25028656, 0.26655159, 0.28387361,
    0.30232132, 0.32196786, 0.34289114, 0.36517414,
    0.38890521, 0.41417847, 0.44109412, 0.46975890,
    0.50028648, 0.53279791, 0.56742212, 0.60429640,
    0.64356699, 0.68538959, 0.72993007, 0.77736504,
    0.82788260, 0.88168307, 0.9389798, 1.0,
];

/// Inverse of [`FLOOR1_FROMDB_LOOKUP`]; index 0 maps to silence.
pub static FLOOR1_FROMDB_INV_LOOKUP: [f32; 256] = [
    0.0, 8.81683e+06, 8.27882e+06, 7.77365e+06,
    7.29930e+06, 6.85389e+06, 6.43567e+06, 6.04296e+06,
    5.67422e+06, 5.32798e+06, 5.00286e+06, 4.69759e+06,
    4.41094e+06, 4.14178e+06, 3.88905e+06, 3.65174e+06,
    3.42891e+06, 3.21968e+06, 3.02321e+06, 2.83873e+06,
    2.66551e+06, 2.50286e+06, 2.35014e+06, 2.20673e+06,
    2.07208e+06, 1.94564e+06, 1.82692e+06, 1.71544e+06,
    1.61076e+06, 1.51247e+06, 1.42018e+06, 1.33352e+06,
    1.25215e+06, 1.17574e+06, 1.10400e+06, 1.03663e+06,
    973377.0, 913981.0, 858210.0, 805842.0,
    756669.0, 710497.0, 667142.0, 626433.0,
    588208.0, 552316.0, 518613.0, 486967.0,
    457252.0, 429351.0, 403152.0, 378551.0,
    355452.0, 333762.0, 313396.0, 294273.0,
    276316.0, 259455.0, 243623.0, 228757.0,
    214798.0, 201691.0, 189384.0, 177828.0,
    166977.0, 156788.0, 147221.0, 138237.0,
    129802.0, 121881.0, 114444.0, 107461.0,
    100903.0, 94746.3, 88964.9, 83536.2,
    78438.8, 73652.5, 69158.2, 64938.1,
    60975.6, 57254.9, 53761.2, 50480.6,
    47400.3, 44507.9, 41792.0, 39241.9,
    36847.3, 34598.9, 32487.7, 30505.3,
    28643.8, 26896.0, 25254.8, 23713.7,
    22266.7, 20908.0, 19632.2, 18434.2,
    17309.4, 16253.1, 15261.4, 14330.1,
    13455.7, 12634.6, 11863.7, 11139.7,
    10460.0, 9821.72, 9222.39, 8659.64,
    8131.23, 7635.06, 7169.17, 6731.70,
    6320.93, 5935.23, 5573.06, 5232.99,
    4913.67, 4613.84, 4332.30, 4067.94,
    3819.72, 3586.64, 3367.78, 3162.28,
    2969.31, 2788.13, 2617.99, 2458.24,
    2308.24, 2167.39, 2035.14, 1910.95,
    1794.35, 1684.85, 1582.04, 1485.51,
    1394.86, 1309.75, 1229.83, 1154.78,
    1084.32, 1018.15, 956.024, 897.687,
    842.910, 791.475, 743.179, 697.830,
    655.249, 615.265, 577.722, 542.469,
    509.367, 478.286, 449.101, 421.696,
    395.964, 371.803, 349.115, 327.812,
    307.809, 289.026, 271.390, 254.830,
    239.280, 224.679, 210.969, 198.096,
    186.008, 174.658, 164.000, 153.993,
    144.596, 135.773, 127.488, 119.708,
    112.404, 105.545, 99.1046, 93.0572,
    87.3788, 82.0469, 77.0404, 72.3394,
    67.9252, 63.7804, 59.8885, 56.2341,
    52.8027, 49.5807, 46.5553, 43.7144,
    41.0470, 38.5423, 36.1904, 33.9821,
    31.9085, 29.9614, 28.1332, 26.4165,
    24.8045, 23.2910, 21.8697, 20.5352,
    19.2822, 18.1056, 17.0008, 15.9634,
    14.9893, 14.0746, 13.2158, 12.4094,
    11.6522, 10.9411, 10.2735, 9.64662,
    9.05798, 8.50526, 7.98626, 7.49894,
    7.04135, 6.61169, 6.20824, 5.82941,
    5.47370, 5.13970, 4.82607, 4.53158,
    4.25507, 3.99542, 3.75162, 3.52269,
    3.30774, 3.10590, 2.91638, 2.73842,
    2.57132, 2.41442, 2.26709, 2.12875,
    1.99885, 1.87688, 1.76236, 1.65482,
    1.55384, 1.45902, 1.36999, 1.28640,
    1.20790, 1.13419, 1.06499, 1.0,
];
