//! Monochrome bitmaps
//!
//! A `Bitmap` holds one boolean per pixel, `true` meaning a printed dot.
//! Both raster encoders consume it through [`Bitmap::pack_rows`], which packs
//! each row MSB-first (leftmost pixel in bit 7) and pads the row tail with
//! background bits up to a whole byte.

/// Luminance at or above which an inverted pixel is treated as ink
pub const INK_THRESHOLD: u8 = 128;

/// 1-bit-per-pixel image, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    ink: Vec<bool>,
}

impl Bitmap {
    /// Create an all-background bitmap
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ink: vec![false; width as usize * height as usize],
        }
    }

    /// Create a bitmap by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut ink = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                ink.push(f(x, y));
            }
        }
        Self { width, height, ink }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the pixel at (x, y) is ink. Out-of-range pixels are background.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.ink[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, ink: bool) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.ink[idx] = ink;
        }
    }

    /// Width rounded up to the next multiple of 8
    pub fn padded_width(&self) -> u32 {
        self.width.div_ceil(8) * 8
    }

    /// Packed bytes per row (`ceil(width / 8)`)
    pub fn bytes_per_row(&self) -> usize {
        self.width.div_ceil(8) as usize
    }

    /// Pack all rows MSB-first, 8 pixels per byte
    ///
    /// Padding bits at the end of each row are always 0 (no ink).
    pub fn pack_rows(&self) -> Vec<u8> {
        let row_bytes = self.bytes_per_row();
        let mut packed = vec![0u8; row_bytes * self.height as usize];

        for y in 0..self.height {
            let row = &mut packed[y as usize * row_bytes..(y as usize + 1) * row_bytes];
            for x in 0..self.width {
                if self.ink[self.index(x, y)] {
                    row[(x / 8) as usize] |= 0x80 >> (x % 8);
                }
            }
        }

        packed
    }

    /// Nearest-neighbour resample to exactly `width` x `height`
    pub fn resize_nearest(&self, width: u32, height: u32) -> Bitmap {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.is_empty() {
            return Bitmap::blank(width, height);
        }

        let (src_w, src_h) = (self.width as u64, self.height as u64);
        Bitmap::from_fn(width, height, |x, y| {
            let sx = (x as u64 * src_w / width as u64) as u32;
            let sy = (y as u64 * src_h / height as u64) as u32;
            self.get(sx, sy)
        })
    }

    /// Threshold a decoded image into ink/background
    ///
    /// The image is reduced to grayscale and inverted, so dark pixels become
    /// ink. Mostly transparent pixels are background.
    #[cfg(feature = "image")]
    pub fn from_image(image: &image::DynamicImage) -> Self {
        let gray = image.to_luma_alpha8();
        let (width, height) = gray.dimensions();

        let ink = gray
            .pixels()
            .map(|p| {
                let [luma, alpha] = p.0;
                alpha >= INK_THRESHOLD && 255 - luma >= INK_THRESHOLD
            })
            .collect();

        Self { width, height, ink }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows_msb_first() {
        let mut bitmap = Bitmap::blank(8, 1);
        bitmap.set(0, 0, true);
        bitmap.set(7, 0, true);
        assert_eq!(bitmap.pack_rows(), vec![0b1000_0001]);
    }

    #[test]
    fn test_pack_rows_pads_with_background() {
        // 10 px wide: second byte holds 2 real pixels and 6 padding bits
        let bitmap = Bitmap::from_fn(10, 2, |_, _| true);
        assert_eq!(bitmap.bytes_per_row(), 2);
        assert_eq!(bitmap.padded_width(), 16);
        assert_eq!(bitmap.pack_rows(), vec![0xFF, 0xC0, 0xFF, 0xC0]);
    }

    #[test]
    fn test_empty_bitmap_packs_to_nothing() {
        assert!(Bitmap::blank(0, 10).pack_rows().is_empty());
        assert!(Bitmap::blank(10, 0).pack_rows().is_empty());
        assert!(Bitmap::blank(0, 10).is_empty());
    }

    #[test]
    fn test_resize_nearest_doubles_pixels() {
        let checker = Bitmap::from_fn(2, 2, |x, y| (x + y) % 2 == 0);
        let big = checker.resize_nearest(4, 4);
        assert!(big.get(0, 0));
        assert!(big.get(1, 1));
        assert!(!big.get(2, 0));
        assert!(big.get(3, 3));
        assert_eq!(big.pack_rows(), vec![0xC0, 0xC0, 0x30, 0x30]);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_from_image_inverts_dark_to_ink() {
        use image::{DynamicImage, Luma, GrayImage};

        let mut img = GrayImage::from_pixel(3, 1, Luma([255]));
        img.put_pixel(1, 0, Luma([0]));
        img.put_pixel(2, 0, Luma([127]));

        let bitmap = Bitmap::from_image(&DynamicImage::ImageLuma8(img));
        assert!(!bitmap.get(0, 0));
        assert!(bitmap.get(1, 0));
        assert!(bitmap.get(2, 0));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_from_image_transparent_is_background() {
        use image::{DynamicImage, Rgba, RgbaImage};

        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let bitmap = Bitmap::from_image(&DynamicImage::ImageRgba8(img));
        assert_eq!(bitmap.pack_rows(), vec![0x00, 0x00]);
    }
}
