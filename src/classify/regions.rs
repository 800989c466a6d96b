//! Fixed-grid number reading.
//!
//! A [`NumberArea`] describes where a block of counters sits on screen:
//! the grid origin, the per-cell extent, how many rows, and how many digit
//! cells per row. Reading walks every cell most-significant-first and sums
//! glyph values into one integer per row.

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::frame::{Frame, Rect, ascii_art, crop};

/// A rectangular grid of digit cells.
#[derive(Debug, Clone, Copy)]
pub struct NumberArea {
    pub start_x: u32,
    pub start_y: u32,
    /// Cell width; also the column stride.
    pub x_offset: u32,
    /// Cell height; also the row stride.
    pub y_offset: u32,
    pub rows: u32,
    pub digits_per_row: u32,
    pub name: &'static str,
    /// Per-column horizontal nudge for fonts with uneven kerning.
    pub kerning_offset: Option<&'static [i32]>,
}

impl NumberArea {
    /// The frame rectangle of one digit cell.
    pub(crate) fn cell(&self, row: u32, column: u32) -> Rect {
        let kerning = self
            .kerning_offset
            .map(|offsets| offsets[column as usize])
            .unwrap_or(0);
        let x = self.start_x + self.x_offset * column;
        Rect {
            x: x.saturating_add_signed(kerning),
            y: self.start_y + self.y_offset * row,
            width: self.x_offset,
            height: self.y_offset,
        }
    }
}

/// Reads one integer per grid row.
///
/// `read_block` maps a single cropped cell to its numeric value (usually a
/// glyph-tree read); blank cells contribute zero. Errors if any cell falls
/// outside the frame; region tables are data and a bad table must surface.
pub fn read_numbers(
    frame: &Frame,
    area: &NumberArea,
    read_block: &dyn Fn(&Frame) -> u32,
) -> Result<Vec<u32>> {
    debug!(area = area.name, "reading number grid");
    let mut numbers = Vec::with_capacity(area.rows as usize);
    for row in 0..area.rows {
        let mut number: u32 = 0;
        for column in 0..area.digits_per_row {
            let place = 10u32.pow(area.digits_per_row - column - 1);
            let block = crop(frame, area.cell(row, column))
                .with_context(|| format!("number area {} row {row} column {column}", area.name))?;
            if tracing::enabled!(tracing::Level::TRACE) {
                trace!(area = area.name, row, column, "block\n{}", ascii_art(&block));
            }
            number += read_block(&block) * place;
        }
        numbers.push(number);
    }
    debug!(area = area.name, ?numbers, "number grid read");
    Ok(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::glyphs::testutil::{block_for_path, leaf_paths};
    use crate::classify::glyphs::{Glyph, RESULT_JUDGE_DIGITS};
    use crate::frame::probe::is_white;
    use image::Rgba;

    const CELL: u32 = 28;

    /// Paints `digits` into consecutive cells of `area` using the result
    /// judgment font's own canonical blocks.
    fn paint_row(frame: &mut Frame, area: &NumberArea, row: u32, digits: &[Glyph]) {
        let paths = leaf_paths(&*RESULT_JUDGE_DIGITS);
        for (column, glyph) in digits.iter().enumerate() {
            let path = &paths.iter().find(|(_, leaf)| leaf == glyph).unwrap().0;
            let block = block_for_path(path, CELL, CELL, Rgba([255, 255, 255, 255]));
            let origin_x = area.start_x + area.x_offset * column as u32;
            let origin_y = area.start_y + area.y_offset * row;
            for (x, y, pixel) in block.enumerate_pixels() {
                frame.put_pixel(origin_x + x, origin_y + y, *pixel);
            }
        }
    }

    fn test_area(rows: u32, digits_per_row: u32) -> NumberArea {
        NumberArea {
            start_x: 12,
            start_y: 8,
            x_offset: CELL,
            y_offset: CELL,
            rows,
            digits_per_row,
            name: "TEST",
            kerning_offset: None,
        }
    }

    fn encode(value: u32, width: usize) -> Vec<Glyph> {
        // leading zeros render as blanks in the fixed-width counter fonts
        let text = format!("{value:>width$}");
        text.chars()
            .map(|c| match c.to_digit(10) {
                Some(d) => Glyph::Digit(d as u8),
                None => Glyph::Blank,
            })
            .collect()
    }

    #[test]
    fn reads_multi_digit_rows_most_significant_first() {
        let area = test_area(2, 4);
        let mut frame = Frame::new(200, 200);
        paint_row(&mut frame, &area, 0, &encode(1234, 4));
        paint_row(&mut frame, &area, 1, &encode(87, 4));

        let read = |block: &Frame| RESULT_JUDGE_DIGITS.read(block, &is_white).value();
        let numbers = read_numbers(&frame, &area, &read).unwrap();
        assert_eq!(numbers, vec![1234, 87]);
    }

    #[test]
    fn round_trips_across_the_field_range() {
        let area = test_area(1, 4);
        let read = |block: &Frame| RESULT_JUDGE_DIGITS.read(block, &is_white).value();
        // sweep the whole field range on a coprime stride, plus the edges
        let mut values: Vec<u32> = (0..10_000).step_by(137).collect();
        values.extend([1, 9, 10, 99, 100, 999, 1000, 9999]);
        for value in values {
            let mut frame = Frame::new(200, 80);
            paint_row(&mut frame, &area, 0, &encode(value, 4));
            let numbers = read_numbers(&frame, &area, &read).unwrap();
            assert_eq!(numbers, vec![value], "value {value} failed to round trip");
        }
    }

    #[test]
    fn explicit_zero_glyphs_also_read_back() {
        // 0012 drawn with real zeros rather than blanks
        let area = test_area(1, 4);
        let mut frame = Frame::new(200, 80);
        let digits: Vec<Glyph> = [0, 0, 1, 2].iter().map(|&d| Glyph::Digit(d)).collect();
        paint_row(&mut frame, &area, 0, &digits);
        let read = |block: &Frame| RESULT_JUDGE_DIGITS.read(block, &is_white).value();
        assert_eq!(read_numbers(&frame, &area, &read).unwrap(), vec![12]);
    }

    #[test]
    fn out_of_bounds_grid_is_an_error() {
        let mut area = test_area(1, 4);
        area.start_x = 150;
        let frame = Frame::new(200, 80);
        let read = |_: &Frame| 0u32;
        assert!(read_numbers(&frame, &area, &read).is_err());
    }

    #[test]
    fn kerning_offsets_shift_single_columns() {
        let area = NumberArea {
            kerning_offset: Some(&[0, 0, 1, 0]),
            ..test_area(1, 4)
        };
        // cell 2 shifts right by one pixel; paint its glyph shifted to match
        let paths = leaf_paths(&*RESULT_JUDGE_DIGITS);
        let path = &paths.iter().find(|(_, leaf)| *leaf == Glyph::Digit(5)).unwrap().0;
        let block = block_for_path(path, CELL, CELL, Rgba([255, 255, 255, 255]));
        let mut frame = Frame::new(200, 80);
        let origin_x = area.start_x + area.x_offset * 2 + 1;
        for (x, y, pixel) in block.enumerate_pixels() {
            frame.put_pixel(origin_x + x, area.start_y + y, *pixel);
        }
        let read = |block: &Frame| RESULT_JUDGE_DIGITS.read(block, &is_white).value();
        assert_eq!(read_numbers(&frame, &area, &read).unwrap(), vec![50]);
    }
}
