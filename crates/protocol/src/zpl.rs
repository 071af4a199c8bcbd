//! ZPL label encoding
//!
//! Labels are sent as a single `^GFA` graphic field holding the whole image
//! as uppercase hex. Unlike ESC/POS raster mode there is no per-command row
//! limit. The label width must be a whole number of bytes, so pixel widths
//! are always rounded down to a multiple of 8.

use crate::bitmap::Bitmap;
use crate::error::{EncodingError, Result};

/// Dot density of common 8 dots/mm label printers
pub const DEFAULT_DPI: u32 = 203;

const CM_PER_INCH: f64 = 2.54;

/// Largest `^PW` / `^LL` value ZPL accepts, in dots
pub const MAX_LABEL_SIDE: u32 = 32_000;

/// Upper bound on `width * height` of one label, in dots
///
/// 4000 x 4000 dots is about 50 cm square at 203 dpi.
pub const MAX_LABEL_AREA: u64 = 16_000_000;

/// Two NUL bytes sent ahead of a label to wake printers in power-save
pub const WAKE_UP: [u8; 2] = [0x00, 0x00];

/// Fixed test label printed by the status endpoint on label printers
pub const STATUS_LABEL: &str = "^XA^CI28\n\
^PW400\n\
^LL300\n\
^FT35,40^A0N,25^FDTest Product^FS\n\
^FO35,77^BY2^BCN,100,Y,N,N^FD30164785566333^FS\n\
^FO300,200^A0N,40^FD$ 120.00^FS\n\
^XZ";

/// Convert centimetres to printer dots at 203 dpi, rounded down to a multiple of 8
pub fn cm_to_pixels(cm: f64) -> u32 {
    cm_to_pixels_at(cm, DEFAULT_DPI)
}

/// Convert centimetres to dots at `dpi`, rounded down to a multiple of 8
///
/// Negative and non-finite inputs map to 0.
pub fn cm_to_pixels_at(cm: f64, dpi: u32) -> u32 {
    if !cm.is_finite() || cm <= 0.0 {
        return 0;
    }
    let dots = (cm / CM_PER_INCH * dpi as f64).floor();
    let dots = if dots >= u32::MAX as f64 {
        u32::MAX
    } else {
        dots as u32
    };
    round_down_to_byte(dots)
}

/// Largest multiple of 8 not above `px`
pub fn round_down_to_byte(px: u32) -> u32 {
    px - px % 8
}

/// Encode `bitmap` as a ZPL label of `width_px` x `height_px` dots
///
/// `width_px` is rounded down to a multiple of 8 and the bitmap is resampled
/// to the final size. Returns an empty payload if either dimension is zero,
/// and `InvalidDimensions` if the label exceeds [`MAX_LABEL_SIDE`] or
/// [`MAX_LABEL_AREA`].
pub fn encode_label(bitmap: &Bitmap, width_px: u32, height_px: u32) -> Result<Vec<u8>> {
    let width_px = round_down_to_byte(width_px);
    if width_px == 0 || height_px == 0 || bitmap.is_empty() {
        return Ok(Vec::new());
    }
    if width_px > MAX_LABEL_SIDE
        || height_px > MAX_LABEL_SIDE
        || width_px as u64 * height_px as u64 > MAX_LABEL_AREA
    {
        return Err(EncodingError::InvalidDimensions {
            width: width_px,
            height: height_px,
        });
    }

    let sized = bitmap.resize_nearest(width_px, height_px);
    let packed = sized.pack_rows();
    let width_bytes = width_px / 8;
    let total = packed.len();

    let zpl = format!(
        "^XA\n^PW{width}\n^FO0,0\n^GFA,{total},{total},{row},{data}\n^XZ\n",
        width = width_px,
        total = total,
        row = width_bytes,
        data = hex::encode_upper(&packed),
    );

    Ok(zpl.into_bytes())
}

/// Encode `bitmap` at its own size, trimming the width to a multiple of 8
pub fn encode_bitmap(bitmap: &Bitmap) -> Result<Vec<u8>> {
    let width = round_down_to_byte(bitmap.width());
    if width == bitmap.width() {
        return encode_label(bitmap, width, bitmap.height());
    }

    // Crop rather than squeeze so pixels keep their 1:1 scale
    let cropped = Bitmap::from_fn(width, bitmap.height(), |x, y| bitmap.get(x, y));
    encode_label(&cropped, width, bitmap.height())
}
