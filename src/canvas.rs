//! Square RGBA canvas, one row per OTU.

use std::path::Path;

use image::{ImageFormat, Rgba, RgbaImage};
use log::debug;

use crate::error::{Result, ThorError};

/// Colour used for rows with no data.
pub const PAD_COLOUR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone)]
pub struct Canvas {
    buffer: RgbaImage,
    side: u32,
    padding: u32,
    rows_drawn: u32,
}

impl Canvas {
    /// A `side` x `side` canvas expected to hold `row_count` rows of content.
    pub fn new(side: u32, row_count: usize) -> Result<Self> {
        if row_count > side as usize {
            return Err(ThorError::TooManyRows { rows: row_count, side });
        }
        Ok(Canvas {
            buffer: RgbaImage::new(side, side),
            side,
            padding: side - row_count as u32,
            rows_drawn: 0,
        })
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Rows needed to square the image after the expected content.
    pub fn padding(&self) -> u32 {
        self.padding
    }

    pub fn rows_drawn(&self) -> u32 {
        self.rows_drawn
    }

    pub fn is_full(&self) -> bool {
        self.rows_drawn == self.side
    }

    /// Append one row below the previous one.
    pub fn draw_row(&mut self, colours: &[Rgba<u8>]) -> Result<()> {
        if colours.len() != self.side as usize {
            return Err(ThorError::WidthMismatch {
                expected: self.side,
                found: colours.len(),
            });
        }
        if self.is_full() {
            return Err(ThorError::CanvasFull(self.rows_drawn));
        }
        for (x, &colour) in colours.iter().enumerate() {
            self.buffer.put_pixel(x as u32, self.rows_drawn, colour);
        }
        self.rows_drawn += 1;
        Ok(())
    }

    pub fn draw_padding_row(&mut self) -> Result<()> {
        let row = vec![PAD_COLOUR; self.side as usize];
        self.draw_row(&row)
    }

    /// The finished image. Missing rows are filled with [`PAD_COLOUR`] when
    /// `pad` is set, otherwise the image is cropped to the rows drawn.
    pub fn finish(mut self, pad: bool) -> Result<RgbaImage> {
        if self.is_full() {
            return Ok(self.buffer);
        }
        if pad {
            debug!("Padding {} empty rows", self.side - self.rows_drawn);
            while !self.is_full() {
                self.draw_padding_row()?;
            }
            return Ok(self.buffer);
        }
        if self.rows_drawn == 0 {
            return Err(ThorError::EmptyCanvas);
        }
        let (side, rows) = (self.side, self.rows_drawn);
        Ok(image::imageops::crop_imm(&self.buffer, 0, 0, side, rows).to_image())
    }

    /// Write the image as PNG.
    pub fn save(self, path: &Path, pad: bool) -> Result<()> {
        let image = self.finish(pad)?;
        image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}
