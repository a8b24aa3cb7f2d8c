//! Lazy image-batch sources and the optional prefetching producer.

use std::thread;

use ndarray::{Array4, Axis};

use crate::error::{FidError, Result};

/// Images laid out as `batch x channels x height x width`.
pub type ImageBatch = Array4<f32>;

/// Finite, ordered sequence of image batches.
pub type BatchStream<'a> = Box<dyn Iterator<Item = Result<ImageBatch>> + Send + 'a>;

/// A fixed population of images (e.g. the reference corpus).
pub trait ImageDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batches of `batch_size` images; only the last batch may be shorter.
    fn batches(&self, batch_size: usize) -> BatchStream<'_>;
}

/// Real images paired with their observation masks (1 = observed).
#[derive(Clone, Debug)]
pub struct MaskedBatch {
    pub images: Array4<f32>,
    pub masks: Array4<f32>,
}

impl MaskedBatch {
    pub fn new(images: Array4<f32>, masks: Array4<f32>) -> Result<Self> {
        if images.shape() != masks.shape() {
            return Err(FidError::shape("mask", images.shape(), masks.shape()));
        }
        Ok(Self { images, masks })
    }

    pub fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type MaskedStream<'a> = Box<dyn Iterator<Item = Result<MaskedBatch>> + Send + 'a>;

/// A population of partially observed images for imputation scoring.
pub trait MaskedDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[channels, height, width]` of each image.
    fn image_shape(&self) -> [usize; 3];

    fn batches(&self, batch_size: usize) -> MaskedStream<'_>;
}

/// Images held in memory, batched along the first axis.
#[derive(Clone, Debug)]
pub struct InMemoryDataset {
    images: Array4<f32>,
}

impl InMemoryDataset {
    pub fn new(images: Array4<f32>) -> Self {
        Self { images }
    }
}

impl ImageDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    fn batches(&self, batch_size: usize) -> BatchStream<'_> {
        Box::new(
            self.images
                .axis_chunks_iter(Axis(0), batch_size.max(1))
                .map(|chunk| Ok(chunk.to_owned())),
        )
    }
}

/// Masked images held in memory.
#[derive(Clone, Debug)]
pub struct InMemoryMaskedDataset {
    images: Array4<f32>,
    masks: Array4<f32>,
}

impl InMemoryMaskedDataset {
    pub fn new(images: Array4<f32>, masks: Array4<f32>) -> Result<Self> {
        if images.shape() != masks.shape() {
            return Err(FidError::shape("mask", images.shape(), masks.shape()));
        }
        Ok(Self { images, masks })
    }
}

impl MaskedDataset for InMemoryMaskedDataset {
    fn len(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    fn image_shape(&self) -> [usize; 3] {
        let s = self.images.shape();
        [s[1], s[2], s[3]]
    }

    fn batches(&self, batch_size: usize) -> MaskedStream<'_> {
        let step = batch_size.max(1);
        Box::new(
            self.images
                .axis_chunks_iter(Axis(0), step)
                .zip(self.masks.axis_chunks_iter(Axis(0), step))
                .map(|(img, mask)| {
                    Ok(MaskedBatch {
                        images: img.to_owned(),
                        masks: mask.to_owned(),
                    })
                }),
        )
    }
}

/// Run `consume` over `source`, optionally with the source driven by a producer
/// thread feeding a bounded channel of `depth` items.
///
/// Items reach `consume` in source order either way. If `consume` stops early the
/// channel is dropped and the producer exits on its next send.
pub fn with_prefetch<T, I, R, F>(source: I, depth: usize, consume: F) -> R
where
    T: Send,
    I: Iterator<Item = T> + Send,
    F: FnOnce(&mut dyn Iterator<Item = T>) -> R,
{
    if depth == 0 {
        let mut inline = source;
        return consume(&mut inline);
    }

    thread::scope(|scope| {
        let (tx, rx) = crossbeam_channel::bounded(depth);
        scope.spawn(move || {
            for item in source {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        let mut received = rx.into_iter();
        consume(&mut received)
    })
}
