use crate::core::digest::DigestAlgorithm;
use crate::core::duplicate::{group_duplicates, DuplicateReport};
use crate::core::fingerprint::{
    validate_threshold, validate_width, Fingerprint, FingerprintMethod, Fingerprinter,
    DEFAULT_WIDTH,
};
use crate::core::input::ImageInput;
use crate::core::metadata::{MetadataReport, MetadataService};
use crate::core::reference::{rank_matches, ReferenceReport};
use crate::core::similar::{group_similar, SimilarityReport};
use crate::error::{partition_outcomes, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityOptions {
    pub width: u32,
    pub threshold: u32,
    pub method: FingerprintMethod,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            threshold: DEFAULT_THRESHOLD,
            method: FingerprintMethod::default(),
        }
    }
}

impl SimilarityOptions {
    pub fn validate(&self) -> Result<()> {
        validate_width(self.width)?;
        validate_threshold(self.threshold, self.width)
    }
}

/// Runs per-image work on a bounded worker pool and hands the collected
/// results to the groupers.
///
/// Each worker returns its own `(identifier, Result<T>)`; nothing is shared
/// between workers, and grouping starts only once the whole batch is in.
pub struct DetectionService {
    pool: ThreadPool,
    metadata: MetadataService,
}

impl DetectionService {
    /// `max_workers == 0` uses one worker per logical CPU.
    pub fn new(max_workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("imgdedup-worker-{}", i))
            .build()?;
        Ok(Self {
            pool,
            metadata: MetadataService::new(),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn per_item<T, F>(&self, images: &[ImageInput], f: F) -> Vec<(String, Result<T>)>
    where
        T: Send,
        F: Fn(&str, &[u8]) -> Result<T> + Sync,
    {
        self.pool.install(|| {
            images
                .par_iter()
                .map(|input| {
                    let id = input.identifier();
                    log::debug!("Processing {}", id);
                    (id.to_string(), input.process(|bytes| f(id, bytes)))
                })
                .collect()
        })
    }

    fn fingerprint_all(
        &self,
        images: &[ImageInput],
        fingerprinter: &Fingerprinter,
    ) -> Vec<(String, Result<Fingerprint>)> {
        self.per_item(images, |_, bytes| fingerprinter.fingerprint(bytes))
    }

    /// Group byte-identical images by content digest.
    pub fn extract_digests(
        &self,
        images: &[ImageInput],
        algorithm: DigestAlgorithm,
    ) -> DuplicateReport {
        let start = Instant::now();
        let outcomes = self.per_item(images, |_, bytes| Ok(algorithm.digest(bytes)));
        let (digests, errors) = partition_outcomes(outcomes);
        let report = group_duplicates(algorithm, images.len(), digests, errors);

        log::info!(
            "Digested {} images with {} in {:.2?}: {} unique, {} duplicate group(s), {} error(s)",
            report.total,
            algorithm,
            start.elapsed(),
            report.unique,
            report.duplicate_groups,
            report.errors.len()
        );
        report
    }

    /// Group visually similar images by fingerprint distance.
    ///
    /// Parameters are validated before any image is decoded.
    pub fn find_similar_groups(
        &self,
        images: &[ImageInput],
        options: SimilarityOptions,
    ) -> Result<SimilarityReport> {
        options.validate()?;
        let fingerprinter = Fingerprinter::new(options.width, options.method)?;

        let start = Instant::now();
        let (fingerprints, errors) =
            partition_outcomes(self.fingerprint_all(images, &fingerprinter));
        let groups = group_similar(&fingerprints, options.threshold)?;

        log::info!(
            "Fingerprinted {}/{} images in {:.2?}: {} similar group(s) at threshold {}",
            fingerprints.len(),
            images.len(),
            start.elapsed(),
            groups.len(),
            options.threshold
        );

        Ok(SimilarityReport {
            width: options.width,
            method: options.method,
            threshold: options.threshold,
            total: images.len(),
            processed: fingerprints.len(),
            groups,
            errors,
        })
    }

    /// Rank candidates by distance to a reference image.
    ///
    /// A reference that cannot be fingerprinted fails the whole call.
    pub fn match_reference(
        &self,
        reference: &ImageInput,
        candidates: &[ImageInput],
        options: SimilarityOptions,
    ) -> Result<ReferenceReport> {
        options.validate()?;
        let fingerprinter = Fingerprinter::new(options.width, options.method)?;
        let reference_fingerprint = reference.process(|bytes| fingerprinter.fingerprint(bytes))?;
        log::debug!(
            "Reference {} fingerprint {}",
            reference.identifier(),
            reference_fingerprint
        );

        self.match_candidates(
            reference_fingerprint,
            &fingerprinter,
            candidates,
            options.threshold,
        )
    }

    /// Rank candidates by distance to an already computed fingerprint.
    ///
    /// Candidates are fingerprinted with the reference's width and method.
    pub fn match_fingerprint(
        &self,
        reference: Fingerprint,
        candidates: &[ImageInput],
        threshold: u32,
    ) -> Result<ReferenceReport> {
        validate_threshold(threshold, reference.width())?;
        let fingerprinter = Fingerprinter::new(reference.width(), reference.method())?;
        self.match_candidates(reference, &fingerprinter, candidates, threshold)
    }

    fn match_candidates(
        &self,
        reference: Fingerprint,
        fingerprinter: &Fingerprinter,
        candidates: &[ImageInput],
        threshold: u32,
    ) -> Result<ReferenceReport> {
        let (fingerprints, errors) =
            partition_outcomes(self.fingerprint_all(candidates, fingerprinter));
        let matches = rank_matches(&reference, fingerprints, threshold)?;

        log::info!(
            "{} of {} candidate(s) within {} of the reference",
            matches.len(),
            candidates.len(),
            threshold
        );

        Ok(ReferenceReport {
            reference_fingerprint: reference,
            threshold,
            total_candidates: candidates.len(),
            matched: matches.len(),
            matches,
            errors,
        })
    }

    /// Read format, dimensions and EXIF fields for every image.
    pub fn extract_metadata(&self, images: &[ImageInput]) -> MetadataReport {
        let outcomes = self.per_item(images, |id, bytes| self.metadata.extract(id, bytes));
        let (results, errors) = partition_outcomes(outcomes);

        MetadataReport {
            total: images.len(),
            results: results.into_iter().map(|(_, metadata)| metadata).collect(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DedupError, ItemErrorKind};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let v = f(x, y);
            Rgb([v, v, v])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn horizontal(width: u32, height: u32) -> Vec<u8> {
        png_from_fn(width, height, |x, _| (x * 255 / (width - 1)) as u8)
    }

    fn vertical(width: u32, height: u32) -> Vec<u8> {
        png_from_fn(width, height, |_, y| (y * 255 / (height - 1)) as u8)
    }

    fn service() -> DetectionService {
        DetectionService::new(2).unwrap()
    }

    #[test]
    fn test_pool_is_bounded() {
        assert_eq!(service().workers(), 2);
    }

    #[test]
    fn test_exact_duplicates() {
        let a = horizontal(32, 32);
        let images = vec![
            ImageInput::new("A", a.clone()),
            ImageInput::new("B", a),
            ImageInput::new("C", vertical(32, 32)),
        ];

        let report = service().extract_digests(&images, DigestAlgorithm::Md5);

        assert_eq!(report.total, 3);
        assert_eq!(report.unique, 2);
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].members, vec!["A", "B"]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_unreadable_item_does_not_abort_digests() {
        let mut images: Vec<ImageInput> = (0..4)
            .map(|i| ImageInput::new(format!("img{}", i), vec![i as u8; 16]))
            .collect();
        images.insert(
            2,
            ImageInput::failed(
                "missing.png",
                DedupError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
            ),
        );

        let report = service().extract_digests(&images, DigestAlgorithm::Sha256);

        assert_eq!(report.total, 5);
        assert_eq!(report.unique, 4);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].identifier, "missing.png");
        assert_eq!(report.errors[0].kind, ItemErrorKind::Io);
    }

    #[test]
    fn test_similar_groups_with_one_corrupt_image() {
        let images = vec![
            ImageInput::new("h64", horizontal(64, 64)),
            ImageInput::new("v64", vertical(64, 64)),
            ImageInput::new("corrupt", b"\x89PNG but not really".to_vec()),
            ImageInput::new("h48", horizontal(48, 40)),
            ImageInput::new("v40", vertical(40, 56)),
        ];

        let report = service()
            .find_similar_groups(&images, SimilarityOptions::default())
            .unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.processed, 4);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].identifier, "corrupt");

        let groups: Vec<Vec<&str>> = report
            .groups
            .iter()
            .map(|g| g.members.iter().map(String::as_str).collect())
            .collect();
        assert_eq!(groups, vec![vec!["h64", "h48"], vec!["v64", "v40"]]);
    }

    #[test]
    fn test_unsupported_format_reported_per_item() {
        let avif = b"\0\0\0\x1cftypavif\0\0\0\0avifmif1miafMA1B\0\0\0\0".to_vec();
        let images = vec![
            ImageInput::new("h", horizontal(32, 32)),
            ImageInput::new("photo.avif", avif),
            ImageInput::new("h2", horizontal(40, 24)),
        ];

        let report = service()
            .find_similar_groups(&images, SimilarityOptions::default())
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].identifier, "photo.avif");
        assert_eq!(report.errors[0].kind, ItemErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_invalid_width_rejected_before_work() {
        let images = vec![ImageInput::new("x", b"garbage".to_vec())];
        let options = SimilarityOptions {
            width: 1,
            ..Default::default()
        };
        assert!(matches!(
            service().find_similar_groups(&images, options),
            Err(DedupError::Validation(_))
        ));

        let options = SimilarityOptions {
            threshold: 65,
            ..Default::default()
        };
        assert!(matches!(
            service().find_similar_groups(&images, options),
            Err(DedupError::Validation(_))
        ));
    }

    #[test]
    fn test_match_reference() {
        let reference = ImageInput::new("ref", horizontal(64, 64));
        let candidates = vec![
            ImageInput::new("far", vertical(64, 64)),
            ImageInput::new("near", horizontal(50, 30)),
            ImageInput::new("broken", Vec::new()),
        ];

        let report = service()
            .match_reference(&reference, &candidates, SimilarityOptions::default())
            .unwrap();

        assert_eq!(report.total_candidates, 3);
        assert_eq!(report.matched, 1);
        assert_eq!(report.matches[0].identifier, "near");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].identifier, "broken");
    }

    #[test]
    fn test_unreadable_reference_fails_call() {
        let reference = ImageInput::new("ref", b"not an image".to_vec());
        let result = service().match_reference(&reference, &[], SimilarityOptions::default());
        assert!(matches!(result, Err(DedupError::Decode(_))));
    }

    #[test]
    fn test_match_fingerprint_uses_reference_width() {
        let reference =
            Fingerprint::from_hex("0f0f0f0f0f0f0f0f", 8, FingerprintMethod::Mean).unwrap();
        let candidates = vec![ImageInput::new("h", horizontal(64, 64))];

        let report = service().match_fingerprint(reference, &candidates, 5).unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.matches[0].fingerprint.width(), 8);
    }

    #[test]
    fn test_extract_metadata_batch() {
        let images = vec![
            ImageInput::new("good.png", horizontal(8, 8)),
            ImageInput::new("bad.png", b"nope".to_vec()),
        ];
        let report = service().extract_metadata(&images);

        assert_eq!(report.total, 2);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].identifier, "good.png");
        assert_eq!(report.errors[0].identifier, "bad.png");
    }
}
