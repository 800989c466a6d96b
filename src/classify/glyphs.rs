//! Decision-tree glyph readers.
//!
//! Every on-screen font is read the same way: a fixed tree of single-pixel
//! probes inside a digit-sized block, branching on whether the probed pixel
//! matches, with each leaf naming the glyph the block encodes. The trees
//! differ per font; the interpreter does not. Probe points are block-local
//! offsets, not frame coordinates.
//!
//! The probe predicate is a parameter so that white-on-dark digit fonts,
//! color-keyed level digits and the brightness-keyed clear lamp all share
//! one evaluator.

use std::sync::LazyLock;

use crate::frame::{Frame, Point, pt};
use crate::types::ClearType;

/// One node of a probe tree.
#[derive(Debug)]
pub enum Node<T> {
    Probe { point: Point, on_match: Box<Node<T>>, on_miss: Box<Node<T>> },
    Leaf(T),
}

impl<T: Copy> Node<T> {
    /// Walks the tree over `block`, deciding each branch with `matches`.
    ///
    /// Total by construction: every probe outcome leads to a leaf.
    pub fn read(&self, block: &Frame, matches: &dyn Fn(&Frame, Point) -> bool) -> T {
        match self {
            Node::Leaf(value) => *value,
            Node::Probe { point, on_match, on_miss } => {
                let next = if matches(block, *point) { on_match } else { on_miss };
                next.read(block, matches)
            }
        }
    }
}

/// Outcome of reading one digit cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Glyph {
    Digit(u8),
    /// An empty cell; fixed-width fields suppress leading zeros.
    Blank,
}

impl Glyph {
    /// Numeric contribution of the glyph. Blanks count as zero.
    pub fn value(self) -> u32 {
        match self {
            Glyph::Digit(d) => d as u32,
            Glyph::Blank => 0,
        }
    }
}

fn probe<T>(x: u32, y: u32, on_match: Node<T>, on_miss: Node<T>) -> Node<T> {
    Node::Probe { point: pt(x, y), on_match: Box::new(on_match), on_miss: Box::new(on_miss) }
}

fn digit(d: u8) -> Node<Glyph> {
    Node::Leaf(Glyph::Digit(d))
}

fn blank() -> Node<Glyph> {
    Node::Leaf(Glyph::Blank)
}

fn level(n: u8) -> Node<u8> {
    Node::Leaf(n)
}

fn lamp(c: ClearType) -> Node<ClearType> {
    Node::Leaf(c)
}

/// Result-screen judgment counter digits (28x28 cells).
pub static RESULT_JUDGE_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        3,
        5, // top left gap
        probe(
            3,
            11, // bottom left gap
            probe(
                12,
                8, // exact middle
                probe(22, 5, digit(8), digit(6)),
                digit(0),
            ),
            probe(
                12,
                14, // bottom middle
                probe(22, 5, digit(9), digit(5)),
                probe(12, 2, digit(7), digit(4)),
            ),
        ),
        probe(
            22,
            5, // top right gap
            probe(22, 11, digit(3), digit(2)),
            probe(12, 8, digit(1), blank()),
        ),
    )
});

/// Result-screen fast/slow counter digits (17x16 cells).
pub static FAST_SLOW_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        1,
        1, // top left corner
        probe(
            1,
            3, // top left gap
            probe(12, 4, digit(4), digit(5)),
            probe(12, 10, digit(3), digit(2)),
        ),
        probe(
            12,
            4, // top right gap
            probe(
                8,
                7, // middle of third row
                probe(1, 10, digit(8), digit(9)),
                probe(1, 10, digit(0), digit(7)),
            ),
            probe(
                8,
                5, // middle top
                probe(1, 3, digit(6), digit(1)),
                blank(),
            ),
        ),
    )
});

/// Result-screen note-count digits (21x17 cells).
pub static NOTE_COUNT_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        1,
        1,
        probe(
            1,
            3,
            probe(14, 3, digit(4), digit(5)),
            probe(14, 12, digit(3), digit(2)),
        ),
        probe(
            14,
            3,
            probe(
                1,
                10,
                probe(10, 8, digit(8), digit(0)),
                probe(10, 9, digit(9), digit(7)),
            ),
            probe(8, 5, probe(1, 3, digit(6), digit(1)), blank()),
        ),
    )
});

/// Play-screen current-BPM digits (35x20 cells).
pub static CURRENT_BPM_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        15,
        10, // middle of center line
        probe(
            28,
            5, // top right gap
            probe(
                28,
                15, // bottom right gap
                probe(4, 5, digit(8), digit(3)),
                digit(2),
            ),
            digit(1),
        ),
        probe(
            28,
            5,
            probe(
                15,
                12, // bottom of center line
                probe(15, 1, digit(9), digit(4)),
                probe(4, 15, digit(0), digit(7)),
            ),
            probe(
                15,
                8, // top of center line
                probe(4, 15, digit(6), digit(5)),
                blank(),
            ),
        ),
    )
});

/// Play-screen min/max-BPM digits (26x14 cells).
pub static MINMAX_BPM_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        12,
        6, // top of center line
        probe(
            2,
            3, // top left gap
            probe(
                19,
                3, // top right gap
                digit(8),
                probe(2, 9, digit(6), digit(5)),
            ),
            probe(
                19,
                3,
                probe(19, 9, digit(3), digit(2)),
                digit(1),
            ),
        ),
        probe(
            19,
            9, // bottom right gap
            probe(
                6,
                13, // center of bottom line
                probe(12, 8, digit(9), digit(0)),
                probe(12, 8, digit(4), digit(7)),
            ),
            blank(),
        ),
    )
});

/// In-play judgment counter digits (13x10 cells).
pub static PLAY_JUDGE_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        3,
        4, // upper left edge
        probe(
            11,
            4, // right edge
            probe(
                3,
                8, // lower left edge
                probe(7, 6, digit(8), digit(0)),
                digit(9),
            ),
            probe(3, 8, digit(6), digit(5)),
        ),
        probe(
            11,
            4,
            probe(
                7,
                6, // center
                probe(3, 8, digit(2), digit(3)),
                digit(4),
            ),
            probe(
                7,
                6,
                digit(1),
                probe(7, 1, digit(7), blank()),
            ),
        ),
    )
});

/// Play-screen level glyphs: one cell encodes the whole 1-12 level.
pub static PLAY_LEVEL_GLYPHS: LazyLock<Node<u8>> = LazyLock::new(|| {
    probe(
        4,
        5, // leftmost column, only lit for two-digit levels and 6/9
        probe(
            25,
            12, // bottom right gap
            probe(
                6,
                12, // bottom left gap
                probe(25, 6, level(11), level(6)),
                level(9),
            ),
            probe(20, 8, level(12), level(10)),
        ),
        probe(
            25,
            12,
            probe(
                6,
                15, // bottom left corner
                probe(25, 6, level(3), level(5)),
                probe(16, 4, level(4), level(8)),
            ),
            probe(
                16,
                4, // top center gap
                level(1),
                probe(6, 15, level(2), level(7)),
            ),
        ),
    )
});

/// Result-screen level glyphs (24x19 cells). Probed with the difficulty
/// tier's color rather than white.
pub static RESULT_LEVEL_GLYPHS: LazyLock<Node<u8>> = LazyLock::new(|| {
    probe(
        3,
        3, // top left
        probe(
            20,
            14, // bottom right, lit only for 10/11/12
            probe(
                15,
                9, // tens center
                level(12),
                probe(15, 3, level(10), level(11)),
            ),
            probe(
                14,
                12, // bottom right digit gap
                probe(4, 6, level(5), level(3)),
                level(2),
            ),
        ),
        probe(
            4,
            12, // bottom left digit gap
            probe(
                4,
                4, // missing corner of four
                probe(15, 6, level(8), level(6)),
                level(4),
            ),
            probe(
                4,
                4,
                level(9),
                probe(8, 8, level(1), level(7)),
            ),
        ),
    )
});

/// Clear-type lamp strip (146x20), probed with the brightness predicate.
pub static CLEAR_LAMP: LazyLock<Node<ClearType>> = LazyLock::new(|| {
    probe(
        23,
        5, // first letter, top
        probe(
            25,
            10, // first letter, center
            probe(113, 6, lamp(ClearType::Easy), lamp(ClearType::ExHard)),
            lamp(ClearType::Assist),
        ),
        probe(
            113,
            6, // the R in CLEAR, dark when failed
            probe(
                86,
                2,
                probe(86, 5, lamp(ClearType::Normal), lamp(ClearType::Hard)),
                lamp(ClearType::FullCombo),
            ),
            lamp(ClearType::Failed),
        ),
    )
});

/// Lifebar percentage, low two digits (35x24 cells).
pub static PERCENT_TENS_DIGITS: LazyLock<Node<Glyph>> = LazyLock::new(|| {
    probe(
        5,
        21, // bottom left corner
        probe(
            5,
            17, // bottom left gap
            probe(
                18,
                12, // upper center
                probe(
                    31,
                    4, // top right corner
                    probe(5, 8, digit(8), digit(2)),
                    digit(6),
                ),
                digit(0),
            ),
            probe(5, 8, digit(5), digit(3)),
        ),
        probe(
            18,
            4, // top middle
            probe(
                5,
                8, // top left gap
                probe(18, 14, digit(9), digit(7)),
                digit(1),
            ),
            digit(4),
        ),
    )
});

/// Lifebar percentage, hundreds digit: either a 1 or nothing.
pub static PERCENT_HUNDREDS_DIGITS: LazyLock<Node<Glyph>> =
    LazyLock::new(|| probe(4, 3, digit(1), blank()));


#[cfg(test)]
mod tests {
    use super::testutil::{block_for_path, leaf_paths};
    use super::*;
    use crate::frame::probe::{is_bright, is_white, probe as color_probe, ExpectedColor};
    use image::Rgba;
    use std::collections::HashSet;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    /// Every leaf must be reachable via a block built from its own path
    /// constraints, and all expected outcomes must appear exactly once.
    fn assert_covers_digits(tree: &Node<Glyph>, width: u32, height: u32, with_blank: bool) {
        let paths = leaf_paths(tree);
        let mut seen = HashSet::new();
        for (path, expected) in &paths {
            let block = block_for_path(path, width, height, WHITE);
            assert_eq!(tree.read(&block, &is_white), *expected);
            seen.insert(*expected);
        }
        for d in 0..=9 {
            assert!(seen.contains(&Glyph::Digit(d)), "digit {d} unreachable");
        }
        assert_eq!(seen.contains(&Glyph::Blank), with_blank);
    }

    #[test]
    fn result_judge_digits_cover_all_glyphs() {
        assert_covers_digits(&RESULT_JUDGE_DIGITS, 28, 28, true);
    }

    #[test]
    fn fast_slow_digits_cover_all_glyphs() {
        assert_covers_digits(&FAST_SLOW_DIGITS, 17, 16, true);
    }

    #[test]
    fn note_count_digits_cover_all_glyphs() {
        assert_covers_digits(&NOTE_COUNT_DIGITS, 21, 17, true);
    }

    #[test]
    fn current_bpm_digits_cover_all_glyphs() {
        assert_covers_digits(&CURRENT_BPM_DIGITS, 35, 20, true);
    }

    #[test]
    fn minmax_bpm_digits_cover_all_glyphs() {
        assert_covers_digits(&MINMAX_BPM_DIGITS, 26, 14, true);
    }

    #[test]
    fn play_judge_digits_cover_all_glyphs() {
        assert_covers_digits(&PLAY_JUDGE_DIGITS, 13, 10, true);
    }

    #[test]
    fn percent_tens_digits_cover_all_glyphs() {
        assert_covers_digits(&PERCENT_TENS_DIGITS, 35, 24, false);
    }

    #[test]
    fn percent_hundreds_reads_one_or_blank() {
        let paths = leaf_paths(&*PERCENT_HUNDREDS_DIGITS);
        assert_eq!(paths.len(), 2);
        for (path, expected) in &paths {
            let block = block_for_path(path, 10, 24, WHITE);
            assert_eq!(PERCENT_HUNDREDS_DIGITS.read(&block, &is_white), *expected);
        }
    }

    #[test]
    fn play_level_glyphs_cover_one_through_twelve() {
        let paths = leaf_paths(&*PLAY_LEVEL_GLYPHS);
        let mut seen = HashSet::new();
        for (path, expected) in &paths {
            let block = block_for_path(path, 34, 17, WHITE);
            assert_eq!(PLAY_LEVEL_GLYPHS.read(&block, &is_white), *expected);
            seen.insert(*expected);
        }
        assert_eq!(seen, (1..=12).collect::<HashSet<u8>>());
    }

    #[test]
    fn result_level_glyphs_cover_one_through_twelve_in_tier_color() {
        // the result-screen level is drawn in the tier color, not white
        let tier = ExpectedColor::rgb(250, 90, 104);
        let matches = move |block: &Frame, point: crate::frame::Point| {
            color_probe(block, point, tier, 15)
        };
        let paths = leaf_paths(&*RESULT_LEVEL_GLYPHS);
        let mut seen = HashSet::new();
        for (path, expected) in &paths {
            let block = block_for_path(path, 24, 19, Rgba([250, 90, 104, 255]));
            assert_eq!(RESULT_LEVEL_GLYPHS.read(&block, &matches), *expected);
            seen.insert(*expected);
        }
        assert_eq!(seen, (1..=12).collect::<HashSet<u8>>());
    }

    #[test]
    fn clear_lamp_covers_every_clear_type() {
        let paths = leaf_paths(&*CLEAR_LAMP);
        let mut seen = HashSet::new();
        for (path, expected) in &paths {
            let block = block_for_path(path, 146, 20, Rgba([200, 200, 200, 255]));
            assert_eq!(CLEAR_LAMP.read(&block, &is_bright), *expected);
            seen.insert(*expected);
        }
        assert_eq!(seen.len(), 7);
    }
}
