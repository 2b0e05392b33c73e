// THEORY:
// The `pipeline` module is the top-level API for the entire vision engine. It
// owns the frame-to-frame state (the background model and the blob arena) and
// runs the stages in order for every frame:
//
//   1. Foreground separation: the background model blacks out every pixel it
//      can explain and learns from the rest.
//   2. Aging: every `dec_rate` frames the model is decimated.
//   3. Density: the foreground is rolled into a density map.
//   4. Grouping: the density map is labeled into blobs, which are filtered by
//      area and returned in a `FrameReport`.
//
// The pipeline is single-threaded and is the only owner of its model. Frames
// are borrowed mutably and modified in place, so the caller keeps control of
// buffer reuse.

use crate::config::PipelineConfig;
use crate::core_modules::background_model::BackgroundModel;
use crate::core_modules::blob_extractor::BlobExtractor;
use crate::error::{VisionError, VisionResult};
use log::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::background_model::MatchStats;
pub use crate::core_modules::blob::{Blob, Point};
pub use crate::core_modules::blob_extractor::BlobIdMap;
pub use crate::core_modules::density_scanner::DensityKind;
pub use crate::core_modules::frame::{DensityMap, FrameBuffer};
pub use crate::core_modules::pixel::pixel::Pixel;

/// Everything the pipeline learned about one processed frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// 1-based count of frames passed to `process_frame`.
    pub frame_number: u64,
    pub density_map: DensityMap,
    /// Blobs that passed the area filter, numbered before filtering.
    pub blobs: Vec<Blob>,
    /// Present when `PipelineConfig::id_map` is set.
    pub id_map: Option<BlobIdMap>,
    /// Cells released by a decimation that ran on this frame.
    pub reclaimed_cells: usize,
    pub match_stats: MatchStats,
}

impl FrameReport {
    /// Pixels the background model could not explain.
    pub fn foreground_pixels(&self) -> usize {
        self.match_stats.foreground()
    }
}

/// The main, top-level struct for the vision engine.
#[derive(Debug)]
pub struct VisionPipeline {
    config: PipelineConfig,
    model: BackgroundModel,
    extractor: BlobExtractor,
    frames_processed: u64,
    frames_seen: u64,
}

impl VisionPipeline {
    /// Validates `config` against the frame shape and seeds the background model.
    pub fn new(config: PipelineConfig, seed_frame: &FrameBuffer) -> VisionResult<Self> {
        config.validate()?;
        let max = config
            .density
            .max_wheel_size(seed_frame.width(), seed_frame.height());
        if config.wheel_size > max {
            return Err(VisionError::InvalidWheelSize {
                wheel_size: config.wheel_size,
                max,
            });
        }
        let model = BackgroundModel::new(seed_frame)?;
        Ok(Self {
            config,
            model,
            extractor: BlobExtractor::new(),
            frames_processed: 0,
            frames_seen: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn background_model(&self) -> &BackgroundModel {
        &self.model
    }

    /// Frames passed to `process_frame` so far (training frames excluded).
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Feeds a warm-up frame to the model. The frame is replaced with the
    /// model's current background estimate.
    pub fn train(&mut self, frame: &mut FrameBuffer) -> VisionResult<MatchStats> {
        let stats = self
            .model
            .process_background(frame, self.config.epsilon, self.config.cth)?;
        let reclaimed = self.age()?;
        debug!(
            "training frame: {} cells live, {} reclaimed",
            self.model.pool().live(),
            reclaimed
        );
        Ok(stats)
    }

    /// Runs the full pipeline on one frame. On return `frame` holds only its
    /// foreground pixels.
    pub fn process_frame(&mut self, frame: &mut FrameBuffer) -> VisionResult<FrameReport> {
        let match_stats = self
            .model
            .match_foreground(frame, self.config.epsilon, self.config.cth)?;
        let reclaimed_cells = self.age()?;
        self.frames_processed += 1;

        let density_map = self.config.density.scan(frame, self.config.wheel_size)?;
        let (mut blobs, id_map) = if self.config.id_map {
            let (blobs, id_map) = self
                .extractor
                .find_blobs_with_map(&density_map, self.config.bth)?;
            (blobs, Some(id_map))
        } else {
            (self.extractor.find_blobs(&density_map, self.config.bth)?, None)
        };

        let found = blobs.len();
        if let Some(min_area) = self.config.min_blob_area {
            blobs.retain(|blob| blob.area >= min_area);
        }
        debug!(
            "frame {}: {} foreground pixels, {} blobs ({} after area filter)",
            self.frames_processed,
            match_stats.foreground(),
            found,
            blobs.len()
        );

        Ok(FrameReport {
            frame_number: self.frames_processed,
            density_map,
            blobs,
            id_map,
            reclaimed_cells,
            match_stats,
        })
    }

    /// Decimates the model every `dec_rate` frames, counting training frames too.
    fn age(&mut self) -> VisionResult<usize> {
        self.frames_seen += 1;
        if self.frames_seen % self.config.dec_rate as u64 == 0 {
            self.model.decimate(self.config.cth)
        } else {
            Ok(0)
        }
    }
}
