use crate::error::{DedupError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageReader};
use image_hasher::{BitOrder, HashAlg, Hasher, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

pub const DEFAULT_WIDTH: u32 = 8;
pub const MIN_WIDTH: u32 = 2;
pub const MAX_WIDTH: u32 = 64;

/// Oversampling factor of the DCT grid relative to the fingerprint width.
const DCT_OVERSAMPLE: u32 = 4;

/// How the downsampled grayscale grid is turned into bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMethod {
    /// n×n grid, bit set when the cell is brighter than the grid mean.
    #[default]
    Mean,
    /// (n+1)×n grid, bit set when the right neighbour is brighter.
    Gradient,
    /// Low-frequency DCT coefficients compared against their median.
    Dct,
}

impl FingerprintMethod {
    pub const ALL: [FingerprintMethod; 3] = [Self::Mean, Self::Gradient, Self::Dct];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Gradient => "gradient",
            Self::Dct => "dct",
        }
    }
}

impl fmt::Display for FingerprintMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FingerprintMethod {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| {
                DedupError::validation(format!(
                    "unknown fingerprint method '{}', expected one of mean, gradient, dct",
                    s
                ))
            })
    }
}

pub fn validate_width(width: u32) -> Result<()> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return Err(DedupError::validation(format!(
            "width must be between {} and {}, got {}",
            MIN_WIDTH, MAX_WIDTH, width
        )));
    }
    Ok(())
}

pub fn validate_threshold(threshold: u32, width: u32) -> Result<()> {
    let max = width * width;
    if threshold > max {
        return Err(DedupError::validation(format!(
            "threshold must be between 0 and {} for width={}, got {}",
            max, width, threshold
        )));
    }
    Ok(())
}

/// A width²-bit perceptual fingerprint.
///
/// Bits are laid out row-major and packed most-significant-bit first; unused
/// bits of the final byte are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    width: u32,
    method: FingerprintMethod,
    hash: ImageHash,
}

impl Fingerprint {
    fn from_packed(width: u32, method: FingerprintMethod, bytes: &[u8]) -> Result<Self> {
        let hash = ImageHash::from_bytes(bytes).map_err(|e| {
            DedupError::validation(format!("invalid fingerprint bytes: {:?}", e))
        })?;
        Ok(Self {
            width,
            method,
            hash,
        })
    }

    /// Parse the `⌈width²/4⌉`-digit hex form produced by [`Fingerprint::to_hex`].
    pub fn from_hex(hex: &str, width: u32, method: FingerprintMethod) -> Result<Self> {
        validate_width(width)?;
        let bit_len = (width * width) as usize;
        let digits = bit_len.div_ceil(4);
        let hex = hex.trim();
        if hex.len() != digits {
            return Err(DedupError::validation(format!(
                "fingerprint for width={} needs {} hex digits, got {}",
                width,
                digits,
                hex.len()
            )));
        }

        let mut bytes = vec![0u8; bit_len.div_ceil(8)];
        for (i, c) in hex.chars().enumerate() {
            let nibble = c.to_digit(16).ok_or_else(|| {
                DedupError::validation(format!("invalid hex digit '{}' in fingerprint", c))
            })? as u8;
            bytes[i / 2] |= if i % 2 == 0 { nibble << 4 } else { nibble };
        }

        let padding = bytes.len() * 8 - bit_len;
        if padding > 0 {
            let mask = (1u8 << padding) - 1;
            if bytes[bytes.len() - 1] & mask != 0 {
                return Err(DedupError::validation(
                    "fingerprint has bits set beyond its width",
                ));
            }
        }

        Self::from_packed(width, method, &bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn method(&self) -> FingerprintMethod {
        self.method
    }

    pub fn bit_len(&self) -> u32 {
        self.width * self.width
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.hash.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        let mut hex: String = self.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
        hex.truncate((self.bit_len() as usize).div_ceil(4));
        hex
    }

    /// Fails unless both fingerprints share width and method.
    pub fn check_comparable(&self, other: &Fingerprint) -> Result<()> {
        if self.width != other.width {
            return Err(DedupError::validation(format!(
                "cannot compare fingerprints of width {} and {}",
                self.width, other.width
            )));
        }
        if self.method != other.method {
            return Err(DedupError::validation(format!(
                "cannot compare {} and {} fingerprints",
                self.method, other.method
            )));
        }
        Ok(())
    }

    /// Hamming distance: number of differing bits.
    pub fn distance(&self, other: &Fingerprint) -> Result<u32> {
        self.check_comparable(other)?;
        Ok(self.hash.dist(&other.hash))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Computes fingerprints of one width and method.
///
/// Mean and gradient fingerprints come from `image_hasher`. The DCT method
/// oversamples at 4× the width before the transform, which `preproc_dct`
/// (2×) does not, so it is computed here.
pub struct Fingerprinter {
    width: u32,
    method: FingerprintMethod,
    hasher: Option<Hasher>,
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("width", &self.width)
            .field("method", &self.method)
            .finish()
    }
}

impl Fingerprinter {
    pub fn new(width: u32, method: FingerprintMethod) -> Result<Self> {
        validate_width(width)?;
        let hash_alg = match method {
            FingerprintMethod::Mean => Some(HashAlg::Mean),
            FingerprintMethod::Gradient => Some(HashAlg::Gradient),
            FingerprintMethod::Dct => None,
        };
        let hasher = hash_alg.map(|alg| {
            HasherConfig::new()
                .hash_alg(alg)
                .hash_size(width, width)
                .resize_filter(FilterType::Lanczos3)
                .bit_order(BitOrder::MsbFirst)
                .to_hasher()
        });
        Ok(Self {
            width,
            method,
            hasher,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn method(&self) -> FingerprintMethod {
        self.method
    }

    /// Decode `bytes` and fingerprint the result.
    pub fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint> {
        let image = decode(bytes)?;
        self.fingerprint_image(&image)
    }

    pub fn fingerprint_image(&self, image: &DynamicImage) -> Result<Fingerprint> {
        match &self.hasher {
            Some(hasher) => Ok(Fingerprint {
                width: self.width,
                method: self.method,
                hash: hasher.hash_image(image),
            }),
            None => {
                let size = self.width * DCT_OVERSAMPLE;
                let grid = imageops::resize(&image.to_luma8(), size, size, FilterType::Lanczos3);
                let bytes = pack_msb_first(&dct_bits(&grid, self.width));
                Fingerprint::from_packed(self.width, self.method, &bytes)
            }
        }
    }
}

/// Fingerprint `bytes` with the default mean method.
pub fn fingerprint(bytes: &[u8], width: u32) -> Result<Fingerprint> {
    Fingerprinter::new(width, FingerprintMethod::Mean)?.fingerprint(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DedupError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DedupError::Decode("unrecognized image data".to_string()));
    }

    let image = reader.decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DedupError::UnsupportedFormat("image has no pixels".to_string()));
    }
    Ok(image)
}

fn pack_msb_first(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bytes
}

/// Separable DCT-II of `grid`, keeping the top-left `n`×`n` coefficients.
fn dct_bits(grid: &GrayImage, n: u32) -> Vec<bool> {
    let size = grid.width() as usize;
    let n = n as usize;
    let pixels: Vec<f64> = grid.pixels().map(|p| p[0] as f64).collect();

    let cosines: Vec<f64> = (0..n)
        .flat_map(|k| {
            (0..size).map(move |i| {
                (std::f64::consts::PI * (2 * i + 1) as f64 * k as f64 / (2 * size) as f64).cos()
            })
        })
        .collect();

    // Rows first: rows[y][v] = sum_x pixel[y][x] * cos_v(x)
    let mut rows = vec![0.0; size * n];
    for y in 0..size {
        for v in 0..n {
            rows[y * n + v] = (0..size)
                .map(|x| pixels[y * size + x] * cosines[v * size + x])
                .sum();
        }
    }

    let mut coeffs = vec![0.0; n * n];
    for u in 0..n {
        for v in 0..n {
            coeffs[u * n + v] = (0..size)
                .map(|y| rows[y * n + v] * cosines[u * size + y])
                .sum();
        }
    }

    let median = median(&coeffs);
    coeffs.iter().map(|&c| c > median).collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};

    const AVIF_HEADER: &[u8] =
        b"\0\0\0\x1cftypavif\0\0\0\0avifmif1miafMA1B\0\0\0\0";

    fn encode(img: ImageBuffer<Rgb<u8>, Vec<u8>>) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn horizontal_gradient(width: u32, height: u32) -> Vec<u8> {
        encode(ImageBuffer::from_fn(width, height, |x, _| {
            let v = (x * 255 / (width - 1)) as u8;
            Rgb([v, v, v])
        }))
    }

    fn vertical_gradient(width: u32, height: u32) -> Vec<u8> {
        encode(ImageBuffer::from_fn(width, height, |_, y| {
            let v = (y * 255 / (height - 1)) as u8;
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let bytes = horizontal_gradient(64, 64);
        for method in FingerprintMethod::ALL {
            let fp = Fingerprinter::new(8, method).unwrap();
            assert_eq!(fp.fingerprint(&bytes).unwrap(), fp.fingerprint(&bytes).unwrap());
        }
    }

    #[test]
    fn test_fingerprint_bit_length_and_hex() {
        let bytes = horizontal_gradient(40, 40);
        for width in [2, 5, 8, 16] {
            let fp = fingerprint(&bytes, width).unwrap();
            assert_eq!(fp.bit_len(), width * width);
            assert_eq!(fp.to_hex().len(), ((width * width) as usize).div_ceil(4));
        }
    }

    #[test]
    fn test_mean_hash_of_horizontal_gradient() {
        let fp = fingerprint(&horizontal_gradient(64, 64), 8).unwrap();
        // Left half darker than the mean, right half brighter.
        assert_eq!(fp.to_hex(), "0f0f0f0f0f0f0f0f");
    }

    #[test]
    fn test_resized_copy_is_near() {
        let original = fingerprint(&horizontal_gradient(64, 64), 8).unwrap();
        let resized = fingerprint(&horizontal_gradient(48, 40), 8).unwrap();
        let unrelated = fingerprint(&vertical_gradient(64, 64), 8).unwrap();

        assert!(original.distance(&resized).unwrap() <= 4);
        assert!(original.distance(&unrelated).unwrap() > 16);
    }

    #[test]
    fn test_width_below_two_rejected_before_decoding() {
        let err = fingerprint(b"not even an image", 1).unwrap_err();
        assert!(matches!(err, DedupError::Validation(_)));
        assert!(Fingerprinter::new(65, FingerprintMethod::Mean).is_err());
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let err = fingerprint(b"definitely not pixels", 8).unwrap_err();
        assert!(matches!(err, DedupError::Decode(_)));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let bytes = horizontal_gradient(32, 32);
        let err = fingerprint(&bytes[..bytes.len() / 2], 8).unwrap_err();
        assert!(matches!(err, DedupError::Decode(_)));
    }

    #[test]
    fn test_recognised_but_undecodable_format_is_unsupported() {
        // AVIF is recognised from its header but has no decoder in this build.
        let err = fingerprint(AVIF_HEADER, 8).unwrap_err();
        assert!(matches!(err, DedupError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_dct_packs_to_hex_width() {
        let bytes = horizontal_gradient(64, 64);
        for width in [3, 8] {
            let fp = Fingerprinter::new(width, FingerprintMethod::Dct)
                .unwrap()
                .fingerprint(&bytes)
                .unwrap();
            assert_eq!(fp.method(), FingerprintMethod::Dct);
            assert_eq!(fp.to_hex().len(), ((width * width) as usize).div_ceil(4));
            assert_eq!(
                Fingerprint::from_hex(&fp.to_hex(), width, FingerprintMethod::Dct).unwrap(),
                fp
            );
        }
    }

    #[test]
    fn test_distance_identity_and_symmetry() {
        let a = Fingerprint::from_hex("00ff00ff00ff00ff", 8, FingerprintMethod::Mean).unwrap();
        let b = Fingerprint::from_hex("0fff00ff00ff00f0", 8, FingerprintMethod::Mean).unwrap();
        assert_eq!(a.distance(&a).unwrap(), 0);
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
        assert_eq!(a.distance(&b).unwrap(), 8);
    }

    #[test]
    fn test_width_isolation() {
        let a = Fingerprint::from_hex("ffff", 4, FingerprintMethod::Mean).unwrap();
        let b = Fingerprint::from_hex("ffffffffffffffff", 8, FingerprintMethod::Mean).unwrap();
        assert!(matches!(a.distance(&b), Err(DedupError::Validation(_))));

        let c = Fingerprint::from_hex("ffff", 4, FingerprintMethod::Dct).unwrap();
        assert!(matches!(a.distance(&c), Err(DedupError::Validation(_))));
    }

    #[test]
    fn test_hex_round_trip_odd_width() {
        // 25 bits -> 7 hex digits, last digit only carries one bit.
        let fp = Fingerprint::from_hex("abcdef8", 5, FingerprintMethod::Mean).unwrap();
        assert_eq!(fp.to_hex(), "abcdef8");
        assert_eq!(fp.as_bytes(), &[0xab, 0xcd, 0xef, 0x80]);
        assert!(Fingerprint::from_hex("abcdef1", 5, FingerprintMethod::Mean).is_err());
        assert!(Fingerprint::from_hex("abcdef", 5, FingerprintMethod::Mean).is_err());
        assert!(Fingerprint::from_hex("abcdefg", 5, FingerprintMethod::Mean).is_err());
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_threshold(0, 8).is_ok());
        assert!(validate_threshold(64, 8).is_ok());
        assert!(validate_threshold(65, 8).is_err());
    }
}
