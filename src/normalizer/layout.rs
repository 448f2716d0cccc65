// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rebuild reading-order lines from OCR blocks

use crate::ocr::TextBlock;

/// One line of receipt text and its vertical position on the page
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    /// Row centre in pixels, or the line index when the OCR gave no geometry
    pub position: f32,
}

/// Vertical third of the page a position falls into (0 = top, 2 = bottom)
pub fn band(position: f32, top: f32, bottom: f32) -> usize {
    let span = bottom - top;
    if span <= f32::EPSILON {
        return 0;
    }
    let scaled = ((position - top) / span * 3.0).floor();
    if scaled < 0.0 {
        0
    } else {
        (scaled as usize).min(2)
    }
}

/// Top and bottom positions covered by the lines
pub fn extent(lines: &[Line]) -> (f32, f32) {
    lines.iter().fold((f32::MAX, f32::MIN), |(lo, hi), l| {
        (lo.min(l.position), hi.max(l.position))
    })
}

/// Turn OCR blocks into ordered lines.
///
/// Geometry is only trusted when every block has it; a partially positioned
/// document is read in the order it was given.
pub fn reconstruct_lines(blocks: &[TextBlock]) -> Vec<Line> {
    if !blocks.is_empty() && blocks.iter().all(|b| b.bounds.is_some()) {
        rows_from_geometry(blocks)
    } else {
        lines_from_text(blocks)
    }
}

fn lines_from_text(blocks: &[TextBlock]) -> Vec<Line> {
    blocks
        .iter()
        .flat_map(|b| b.text.lines())
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, text)| Line { text, position: i as f32 })
        .collect()
}

fn rows_from_geometry(blocks: &[TextBlock]) -> Vec<Line> {
    let mut positioned: Vec<(&TextBlock, f32, f32, f32)> = blocks
        .iter()
        .filter(|b| !b.text.trim().is_empty())
        .filter_map(|b| b.bounds.map(|bb| (b, bb.center_y(), bb.x, bb.height)))
        .collect();

    if positioned.is_empty() {
        return Vec::new();
    }

    positioned.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut heights: Vec<f32> = positioned.iter().map(|p| p.3).collect();
    heights.sort_by(f32::total_cmp);
    let tolerance = (heights[heights.len() / 2] / 2.0).max(1.0);

    // (anchor centre, members as (x, text))
    let mut rows: Vec<(f32, Vec<(f32, &str)>)> = Vec::new();
    for (block, center, x, _) in positioned {
        match rows.last_mut() {
            Some((anchor, members)) if (center - *anchor).abs() <= tolerance => {
                members.push((x, block.text.as_str()));
            }
            _ => rows.push((center, vec![(x, block.text.as_str())])),
        }
    }

    rows.into_iter()
        .map(|(anchor, mut members)| {
            members.sort_by(|a, b| a.0.total_cmp(&b.0));
            let joined = members.iter().map(|(_, t)| *t).collect::<Vec<_>>().join(" ");
            Line { text: collapse_whitespace(&joined), position: anchor }
        })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_keeps_order_and_drops_blank_lines() {
        let lines = reconstruct_lines(&[TextBlock::plain("Corner Shop\n\n  Milk   3.00 \nTotal 3.00")]);
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Corner Shop", "Milk 3.00", "Total 3.00"]);
        assert_eq!(lines[2].position, 2.0);
    }

    #[test]
    fn test_shuffled_words_are_grouped_into_rows() {
        let blocks = vec![
            TextBlock::positioned("3.00", 200.0, 52.0, 40.0, 18.0),
            TextBlock::positioned("Total", 10.0, 100.0, 50.0, 20.0),
            TextBlock::positioned("Milk", 10.0, 50.0, 40.0, 20.0),
            TextBlock::positioned("3.00", 200.0, 101.0, 40.0, 20.0),
        ];
        let lines = reconstruct_lines(&blocks);
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Milk 3.00", "Total 3.00"]);
        assert!(lines[0].position < lines[1].position);
    }

    #[test]
    fn test_partial_geometry_is_read_in_given_order() {
        let blocks = vec![
            TextBlock::positioned("Second", 0.0, 500.0, 10.0, 10.0),
            TextBlock::plain("First"),
        ];
        let texts: Vec<_> = reconstruct_lines(&blocks).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["Second", "First"]);
    }

    #[test]
    fn test_bands_split_page_in_thirds() {
        assert_eq!(band(0.0, 0.0, 2.0), 0);
        assert_eq!(band(1.0, 0.0, 2.0), 1);
        assert_eq!(band(2.0, 0.0, 2.0), 2);
        assert_eq!(band(5.0, 5.0, 5.0), 0);
    }
}
