use ndarray::ArrayView1;
use opencv::core::Rect;

/// Index and value of the largest element; the first one wins on ties.
pub fn argmax(values: ArrayView1<f32>) -> Option<(usize, f32)> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ if value.is_nan() => best,
            _ => Some((idx, value)),
        })
}

/// Intersects `rect` with a `width` x `height` image. Returns `None` when
/// nothing is left.
pub fn clamp_rect(rect: Rect, width: i32, height: i32) -> Option<Rect> {
    let x1 = rect.x.clamp(0, width);
    let y1 = rect.y.clamp(0, height);
    let x2 = (rect.x + rect.width).clamp(0, width);
    let y2 = (rect.y + rect.height).clamp(0, height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
}
