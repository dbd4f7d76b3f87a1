// ============================================================
// Layer 4 — Batch Stream
// ============================================================
// An infinite, deterministic, restartable source of batches.
//
// State:
//   order  — working permutation of sample indices
//   cursor — position of the next sample inside `order`
//   rng    — seeded once at construction
//
// At every pass boundary (cursor back at 0, including the very
// first pass) the whole permutation is reshuffled in place with
// the seeded generator, when shuffling is enabled. Each call then
// takes the next `batch_size` entries; the last batch of a pass
// is short when the sample count is not a multiple of it.
//
// The stream never ends on its own. The orchestrator decides how
// many batches make up an epoch.
//
// Two streams built from the same samples and seed produce the
// same batches in the same order, which is what makes resumed
// epochs reproducible. `advance` replays the shuffle sequence
// without decoding anything, so a resumed run can jump to where
// an uninterrupted run would be.
//
// Reference: rand crate documentation (StdRng, SliceRandom)
//            Rust Book §13 (Iterator trait)

use std::ops::Range;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::batch::Batch;
use crate::domain::error::PipelineError;
use crate::domain::sample::Sample;
use crate::domain::traits::SampleTransform;

pub struct BatchStream<T: SampleTransform> {
    samples:     Vec<Sample>,
    num_classes: usize,
    batch_size:  usize,
    seed:        u64,
    shuffle:     bool,
    transform:   T,

    order:  Vec<usize>,
    cursor: usize,
    rng:    StdRng,
}

impl<T: SampleTransform> BatchStream<T> {
    pub fn new(
        samples:     Vec<Sample>,
        num_classes: usize,
        batch_size:  usize,
        seed:        u64,
        shuffle:     bool,
        transform:   T,
    ) -> Result<Self, PipelineError> {
        if samples.is_empty() {
            return Err(PipelineError::Config("batch stream needs at least one sample".into()));
        }
        if batch_size == 0 {
            return Err(PipelineError::Config("batch size must be at least 1".into()));
        }
        if let Some(bad) = samples.iter().find(|s| s.class_id >= num_classes) {
            return Err(PipelineError::Config(format!(
                "sample '{}' has class id {} but only {} classes exist",
                bad.path.display(),
                bad.class_id,
                num_classes
            )));
        }

        let order = (0..samples.len()).collect();
        Ok(Self {
            samples,
            num_classes,
            batch_size,
            seed,
            shuffle,
            transform,
            order,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Samples in one full pass
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches needed to cover every sample once: ceil(len / batch_size)
    pub fn batches_per_pass(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    /// Produce the next batch.
    ///
    /// If any sample in the batch fails to load, the whole batch
    /// fails and nothing is returned for it.
    pub fn next_batch(&mut self) -> Result<Batch, PipelineError> {
        let range = self.next_range();
        let (height, width) = self.transform.dims();
        let expected = height * width;

        let mut images    = Vec::with_capacity(range.len());
        let mut class_ids = Vec::with_capacity(range.len());

        for &i in &self.order[range] {
            let sample = &self.samples[i];
            let pixels = self.transform.load(&sample.path)?;
            if pixels.len() != expected {
                return Err(PipelineError::SampleDecode {
                    path:   sample.path.clone(),
                    reason: format!("expected {} pixels, got {}", expected, pixels.len()),
                });
            }
            images.push(pixels);
            class_ids.push(sample.class_id);
        }

        Ok(Batch::new(images, &class_ids, height, width, self.num_classes))
    }

    /// Skip `batches` batches without decoding any image.
    /// Leaves the stream exactly where `batches` calls to
    /// `next_batch` would have.
    pub fn advance(&mut self, batches: usize) {
        for _ in 0..batches {
            self.next_range();
        }
    }

    /// Return to the state right after construction
    pub fn rewind(&mut self) {
        self.order  = (0..self.samples.len()).collect();
        self.cursor = 0;
        self.rng    = StdRng::seed_from_u64(self.seed);
    }

    /// Index range into `order` for the next batch, reshuffling at
    /// the start of a pass.
    fn next_range(&mut self) -> Range<usize> {
        if self.cursor == 0 && self.shuffle {
            self.order.shuffle(&mut self.rng);
        }

        let start = self.cursor;
        let end   = (start + self.batch_size).min(self.order.len());

        // Wrap so the following call starts a new pass
        self.cursor = if end == self.order.len() { 0 } else { end };

        start..end
    }
}

/// Never yields `None`: the sequence is infinite.
impl<T: SampleTransform> Iterator for BatchStream<T> {
    type Item = Result<Batch, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::{fake_samples, FakeTransform};
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn stream(counts: &[usize], batch_size: usize, seed: u64) -> BatchStream<FakeTransform> {
        BatchStream::new(
            fake_samples(counts),
            counts.len(),
            batch_size,
            seed,
            true,
            FakeTransform::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_same_seed_same_batches_over_several_passes() {
        let mut a = stream(&[6, 4, 3], 4, 42);
        let mut b = stream(&[6, 4, 3], 4, 42);

        // 13 samples / 4 → 4 batches per pass; cover 5 passes
        for _ in 0..(5 * a.batches_per_pass()) {
            assert_eq!(a.next_batch().unwrap(), b.next_batch().unwrap());
        }
    }

    #[test]
    fn test_different_seed_changes_order() {
        let mut a = stream(&[10, 10], 20, 1);
        let mut b = stream(&[10, 10], 20, 2);
        assert_ne!(a.next_batch().unwrap(), b.next_batch().unwrap());
    }

    #[test]
    fn test_pass_sizes_and_exact_coverage() {
        for &(n, b) in &[(10usize, 3usize), (12, 4), (5, 5), (7, 10), (1, 1)] {
            let mut s = stream(&[n], b, 9);
            let batches = s.batches_per_pass();
            assert_eq!(batches, (n + b - 1) / b);

            for _pass in 0..3 {
                let mut seen = HashSet::new();
                for k in 0..batches {
                    let batch = s.next_batch().unwrap();
                    let expected = if k + 1 == batches && n % b != 0 { n % b } else { b.min(n) };
                    assert_eq!(batch.len, expected, "n={n} b={b} batch {k}");
                    for i in 0..batch.len {
                        // Each fake image is unique per sample
                        let key: Vec<u32> = batch.image(i).iter().map(|v| v.to_bits()).collect();
                        assert!(seen.insert(key), "duplicate sample within a pass");
                    }
                }
                assert_eq!(seen.len(), n, "a pass must cover every sample");
                assert_eq!(s.cursor, 0, "pass must end exactly on a wrap");
            }
        }
    }

    #[test]
    fn test_advance_matches_consuming() {
        let mut consumed = stream(&[7, 6], 3, 5);
        let mut skipped  = stream(&[7, 6], 3, 5);

        for _ in 0..11 {
            consumed.next_batch().unwrap();
        }
        skipped.advance(11);

        for _ in 0..10 {
            assert_eq!(consumed.next_batch().unwrap(), skipped.next_batch().unwrap());
        }
    }

    #[test]
    fn test_rewind_restarts_the_sequence() {
        let mut s = stream(&[5, 5], 4, 8);
        let first: Vec<Batch> = (0..6).map(|_| s.next_batch().unwrap()).collect();
        s.rewind();
        let again: Vec<Batch> = (0..6).map(|_| s.next_batch().unwrap()).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_labels_follow_samples() {
        let mut s = stream(&[3, 3, 3], 9, 4);
        let batch = s.next_batch().unwrap();
        for i in 0..batch.len {
            // FakeTransform encodes (class + 1) / 10 in pixel 1
            let class = (batch.image(i)[1] * 10.0).round() as usize - 1;
            assert_eq!(batch.class_id(i), class);
        }
    }

    #[test]
    fn test_decode_failure_fails_whole_batch() {
        let samples = fake_samples(&[5]);
        let broken  = samples[3].path.clone();
        let mut s = BatchStream::new(
            samples,
            1,
            5,
            0,
            false,
            FakeTransform::failing_on(broken.clone()),
        )
        .unwrap();

        match s.next_batch() {
            Err(PipelineError::SampleDecode { path, .. }) => assert_eq!(path, broken),
            other => panic!("expected SampleDecode, got {other:?}"),
        }
    }

    #[test]
    fn test_iterator_never_ends() {
        let s = stream(&[2], 1, 0);
        assert_eq!(s.take(25).filter(|b| b.is_ok()).count(), 25);
    }

    #[test]
    fn test_rejects_empty_and_zero_batch() {
        let empty = BatchStream::new(Vec::new(), 1, 4, 0, true, FakeTransform::default());
        assert!(matches!(empty, Err(PipelineError::Config(_))));

        let zero = BatchStream::new(fake_samples(&[3]), 1, 0, 0, true, FakeTransform::default());
        assert!(matches!(zero, Err(PipelineError::Config(_))));

        let bad_class = BatchStream::new(
            vec![Sample::new(PathBuf::from("x.png"), 3)],
            2, 1, 0, true, FakeTransform::default(),
        );
        assert!(matches!(bad_class, Err(PipelineError::Config(_))));
    }
}
