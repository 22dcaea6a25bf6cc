// src/waveform/terminal.rs

/// Render an envelope as a mirrored bar chart, one column per point.
/// A `playhead` column (if any) is drawn with `┃`.
pub fn render_ascii(points: &[f32], height: usize, playhead: Option<usize>) -> Vec<String> {
    let h = height.max(2);
    let mid = (h - 1) as f32 / 2.0;
    let mut lines = vec![vec![' '; points.len()]; h];
    for (x, &v) in points.iter().enumerate() {
        let reach = v.clamp(0.0, 1.0) * mid;
        for (y, row) in lines.iter_mut().enumerate() {
            let dist = (y as f32 - mid).abs();
            if v > 0.0 && dist <= reach + 0.5 {
                row[x] = '█';
            } else if dist < 0.5 {
                row[x] = '─';
            }
        }
        if playhead == Some(x) {
            for row in lines.iter_mut() {
                row[x] = '┃';
            }
        }
    }
    lines.into_iter().map(|row| row.into_iter().collect()).collect()
}

/// Pick `columns` points out of a longer envelope, keeping the loudest
/// point of each group.
pub fn fit_columns(points: &[f32], columns: usize) -> Vec<f32> {
    if columns == 0 || points.is_empty() {
        return Vec::new();
    }
    if points.len() <= columns {
        return points.to_vec();
    }
    (0..columns)
        .map(|c| {
            let start = c * points.len() / columns;
            let end = ((c + 1) * points.len() / columns).max(start + 1);
            points[start..end].iter().cloned().fold(0.0, f32::max)
        })
        .collect()
}
