// ============================================================
// Layer 3 — Batch
// ============================================================
// A batch of samples ready for the learner.
//
// Images are stored flat in row-major order with shape
//   [len, height, width, 1]
// and labels as flat one-hot rows with shape
//   [len, num_classes]
//
// Keeping the data flat means the ML layer can hand it straight
// to a tensor constructor without another copy per sample.

/// A fixed-count group of normalised images and their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Pixel intensities in [0, 1], shape [len, height, width, 1]
    pub images: Vec<f32>,

    /// One-hot rows, shape [len, num_classes]
    pub labels: Vec<f32>,

    pub len:         usize,
    pub height:      usize,
    pub width:       usize,
    pub num_classes: usize,
}

impl Batch {
    /// Build a batch from already-normalised images and class ids.
    /// Every image must hold exactly `height * width` pixels.
    pub fn new(
        images:      Vec<Vec<f32>>,
        class_ids:   &[usize],
        height:      usize,
        width:       usize,
        num_classes: usize,
    ) -> Self {
        debug_assert_eq!(images.len(), class_ids.len());
        let len = images.len();

        let mut labels = vec![0.0f32; len * num_classes];
        for (row, &class_id) in class_ids.iter().enumerate() {
            labels[row * num_classes + class_id] = 1.0;
        }

        Self {
            images: images.into_iter().flatten().collect(),
            labels,
            len,
            height,
            width,
            num_classes,
        }
    }

    /// Pixels of the i-th image
    pub fn image(&self, i: usize) -> &[f32] {
        let size = self.height * self.width;
        &self.images[i * size..(i + 1) * size]
    }

    /// One-hot label of the i-th sample
    pub fn label(&self, i: usize) -> &[f32] {
        &self.labels[i * self.num_classes..(i + 1) * self.num_classes]
    }

    /// Class id of the i-th sample, recovered from its one-hot row
    pub fn class_id(&self, i: usize) -> usize {
        self.label(i)
            .iter()
            .position(|&v| v == 1.0)
            .unwrap_or(0)
    }

    /// Class ids of every sample in order
    pub fn class_ids(&self) -> Vec<usize> {
        (0..self.len).map(|i| self.class_id(i)).collect()
    }
}
