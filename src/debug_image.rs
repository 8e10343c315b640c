//! Debug still of a flow field.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;

use crate::error::FlowMotionError;
use crate::flow::FlowField;

/// JPEG quality used for debug stills.
pub const DEBUG_IMAGE_QUALITY: u8 = 100;

/// Save the colour-wheel rendering of `field` as a JPEG at `path`,
/// creating parent directories as needed.
pub fn write_debug_image<P: AsRef<Path>>(field: &FlowField, path: P) -> Result<(), FlowMotionError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let rgb = field.to_rgb_image();
    let mut file = BufWriter::new(File::create(path)?);
    let encoder = JpegEncoder::new_with_quality(&mut file, DEBUG_IMAGE_QUALITY);
    rgb.write_with_encoder(encoder)?;
    file.flush()?;

    log::debug!(
        "Saved {}x{} debug image to {}",
        field.width(),
        field.height(),
        path.display()
    );
    Ok(())
}
