//! Converter from KSH charts to the VOX container and music-db XML.
//!
//! The pipeline is split along its seams:
//!
//! - [`ksh`] reads KSH source text into an in-memory chart:
//!   [`ksh::parse_ksh`] returns the song metadata, the chart itself and
//!   every warning raised on the way.
//! - [`vox`] renders that chart into the section-based VOX text format.
//! - [`xml`] renders the matching music database entry, deriving note
//!   counts and the difficulty radar from the chart.
//! - [`media`] declares the traits an exporter implements for audio and
//!   jacket handling, which live outside this crate.
//!
//! ```rust
//! use ksh2vox::{ksh::parse_ksh, vox::write_vox, xml::write_xml};
//!
//! let source = "title=Test\nartist=Composer\nt=120\nver=167\n--\n0000|00|--\n--\n";
//! let output = parse_ksh(source).expect("convertible chart");
//!
//! let vox = write_vox(&output.song, &output.chart, "test.ksh");
//! let (xml, metadata_warnings) = write_xml(&output.song, &output.chart);
//! assert!(vox.starts_with("//==="));
//! assert!(xml.contains("<title_name>Test</title_name>"));
//! assert!(metadata_warnings.iter().all(|w| !matches!(
//!     w,
//!     ksh2vox::xml::MetadataWarning::InvalidAsciiLabel(_)
//! )));
//! ```

pub mod ksh;
pub mod media;
pub mod vox;
pub mod xml;

pub use ksh::{ConvertError, ConvertWarning, KshOutput, parse_ksh};
pub use vox::{vox_filename, write_vox};
pub use xml::{write_xml, xml_filename};
