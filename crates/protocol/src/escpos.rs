//! ESC/POS command encoding
//!
//! Receipt images are sent in raster mode (`GS v 0`). A single raster command
//! can describe at most 255 rows on common firmware, so taller images are
//! split into consecutive slices, each with its own header:
//!
//! ```text
//! GS v 0 m  xL xH  yL yH  d1..dk
//! 1D 76 30 00  bytes-per-row (LE)  rows (LE)  packed rows
//! ```
//!
//! The full receipt is `ESC @` (initialize), `ESC a 1` (center), the raster
//! slices, a short feed and `GS V 0` (full cut).

use crate::bitmap::Bitmap;
use crate::error::{EncodingError, Result};
use byteorder::{ByteOrder, LittleEndian};

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;

/// `ESC @` - reset printer state
pub const INITIALIZE: [u8; 2] = [ESC, b'@'];
/// `ESC a 1`
pub const ALIGN_CENTER: [u8; 3] = [ESC, b'a', 0x01];
/// `GS V 0` - full cut
pub const FULL_CUT: [u8; 3] = [GS, b'V', 0x00];
/// `GS V A` plus newline - feed to cutter and cut, used by text tickets
pub const FEED_CUT: [u8; 4] = [GS, b'V', b'A', b'\n'];
/// `GS v 0` with normal density (m = 0)
pub const RASTER_COMMAND: [u8; 4] = [GS, b'v', b'0', 0x00];
/// `ESC ! 0x30` - double width and height
pub const TITLE_ON: [u8; 3] = [ESC, b'!', 0x30];
/// `ESC ! 0x00`
pub const TITLE_OFF: [u8; 3] = [ESC, b'!', 0x00];

/// Row limit of one raster command
pub const MAX_SLICE_ROWS: u32 = 255;

/// Blank lines fed before the cut so the image clears the cutter
pub const CUT_FEED_LINES: usize = 4;

/// Header of one `GS v 0` raster slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterHeader {
    pub bytes_per_row: u16,
    pub rows: u16,
}

impl RasterHeader {
    pub const LEN: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..4].copy_from_slice(&RASTER_COMMAND);
        LittleEndian::write_u16(&mut out[4..6], self.bytes_per_row);
        LittleEndian::write_u16(&mut out[6..8], self.rows);
        out
    }

    /// Parse a header at the start of `data`
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN || data[..4] != RASTER_COMMAND {
            return None;
        }
        Some(Self {
            bytes_per_row: LittleEndian::read_u16(&data[4..6]),
            rows: LittleEndian::read_u16(&data[6..8]),
        })
    }

    /// Bytes of pixel data following this header
    pub fn data_len(&self) -> usize {
        self.bytes_per_row as usize * self.rows as usize
    }
}

/// Encode the raster slices of `bitmap` without any framing commands
///
/// Returns an empty buffer for an empty bitmap.
pub fn raster_slices(bitmap: &Bitmap) -> Result<Vec<u8>> {
    if bitmap.is_empty() {
        return Ok(Vec::new());
    }

    let bytes_per_row = u16::try_from(bitmap.bytes_per_row()).map_err(|_| {
        EncodingError::InvalidDimensions {
            width: bitmap.width(),
            height: bitmap.height(),
        }
    })?;

    let packed = bitmap.pack_rows();
    let row_bytes = bytes_per_row as usize;
    let slice_bytes = row_bytes * MAX_SLICE_ROWS as usize;
    let slices = bitmap.height().div_ceil(MAX_SLICE_ROWS) as usize;

    let mut out = Vec::with_capacity(packed.len() + slices * RasterHeader::LEN);
    for chunk in packed.chunks(slice_bytes) {
        let header = RasterHeader {
            bytes_per_row,
            rows: (chunk.len() / row_bytes) as u16,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(chunk);
    }

    Ok(out)
}

/// Encode `bitmap` as a complete ESC/POS raster receipt
///
/// Layout: initialize, center, raster slices, feed, full cut. An empty bitmap
/// produces an empty payload.
pub fn encode_raster(bitmap: &Bitmap) -> Result<Vec<u8>> {
    let slices = raster_slices(bitmap)?;
    if slices.is_empty() {
        return Ok(slices);
    }

    let mut out = Vec::with_capacity(slices.len() + 16);
    out.extend_from_slice(&INITIALIZE);
    out.extend_from_slice(&ALIGN_CENTER);
    out.extend_from_slice(&slices);
    out.extend(std::iter::repeat_n(b'\n', CUT_FEED_LINES));
    out.extend_from_slice(&FULL_CUT);
    Ok(out)
}

/// Pulse both drawer kick-out connectors
///
/// `ESC = 1` selects the printer, then `ESC p m 25 25` for pins 2 and 5.
pub fn drawer_kick_sequence() -> Vec<u8> {
    let mut out = Vec::with_capacity(13);
    out.extend_from_slice(&[ESC, b'=', 0x01]);
    out.extend_from_slice(&[ESC, b'p', 0x00, 0x19, 0x19]);
    out.extend_from_slice(&[ESC, b'p', 0x01, 0x19, 0x19]);
    out
}

/// Fluent builder for plain-text ESC/POS tickets
///
/// Text is sent as ASCII; characters outside ASCII print as `?`.
pub struct TicketBuilder {
    buf: Vec<u8>,
}

impl TicketBuilder {
    /// Start a ticket with `ESC @`
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&INITIALIZE);
        Self { buf }
    }

    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&ALIGN_CENTER);
        self
    }

    /// Double-size title followed by a newline
    pub fn title(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(&TITLE_ON);
        self.text(s);
        self.buf.extend_from_slice(&TITLE_OFF);
        self.newline()
    }

    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf
            .extend(s.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
        self
    }

    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.newline()
    }

    /// `label : value` line
    pub fn pair(&mut self, label: &str, value: &str) -> &mut Self {
        self.line(&format!("{} : {}", label, value))
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Feed to the cutter and cut
    pub fn cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&FEED_CUT);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for TicketBuilder {
    fn default() -> Self {
        Self::new()
    }
}
