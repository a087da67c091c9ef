//! Seams towards the media pipeline.
//!
//! Audio transcoding and jacket processing happen outside this crate; the
//! converter only defines the interfaces it hands a finished chart to. An
//! implementation typically shells out to an encoder or links a codec
//! library, both of which stay out of the conversion core.

use std::path::Path;

use crate::ksh::model::{ChartInfo, SongInfo};

/// Renders the song audio into the container the game loads.
pub trait AudioTranscoder {
    /// Failure reported by the implementation.
    type Error;

    /// Transcodes the full song referenced by `chart.music_path`, applying
    /// `song.music_volume` as a percentage gain.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error when the source cannot be read
    /// or encoded.
    fn transcode(&mut self, base: &Path, song: &SongInfo, chart: &ChartInfo)
    -> Result<Vec<u8>, Self::Error>;

    /// Cuts the selection-screen preview clip starting at
    /// `chart.preview_start` milliseconds.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error when the source cannot be read
    /// or encoded.
    fn preview(&mut self, base: &Path, song: &SongInfo, chart: &ChartInfo)
    -> Result<Vec<u8>, Self::Error>;
}

/// Prepares the jacket image referenced by `chart.jacket_path`.
pub trait JacketProcessor {
    /// Failure reported by the implementation.
    type Error;

    /// Produces the jacket in the game's expected dimensions.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error when the image cannot be read
    /// or converted.
    fn process(&mut self, base: &Path, chart: &ChartInfo) -> Result<Vec<u8>, Self::Error>;

    /// Whether a stage background exists for `bg_no`, so the exporter can
    /// fall back to a default backdrop before writing the XML.
    fn has_background(&self, bg_no: u16) -> bool;

    /// The animation frames previewing background `bg_no`, one encoded
    /// image per frame. Display only; nothing here reaches the chart
    /// output.
    ///
    /// # Errors
    ///
    /// Returns the implementation's error when the background assets
    /// cannot be read or decoded.
    fn background_frames(&mut self, bg_no: u16) -> Result<Vec<Vec<u8>>, Self::Error>;
}
