use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::GridError;
use crate::geometry::Rect;

/// A sibling rectangle inside one container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutItem {
    pub display_name: String,
    pub rect: Rect,
}

impl LayoutItem {
    pub fn new(display_name: impl Into<String>, rect: Rect) -> Self {
        Self {
            display_name: display_name.into(),
            rect,
        }
    }
}

/// Output of a full reflow pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReflowResult {
    /// Every sibling after the pass, in sweep order.
    pub final_state: Vec<LayoutItem>,
    /// Only the siblings whose rectangle changed.
    pub moved: Vec<LayoutItem>,
}

/// Reflow order: top to bottom, then left to right, then by name.
fn sweep_order(a: &LayoutItem, b: &LayoutItem) -> Ordering {
    (a.rect.y, a.rect.x, &a.display_name).cmp(&(b.rect.y, b.rect.x, &b.display_name))
}

/// Push every mover down until it crosses none of the `fixed` rectangles and
/// none of the movers already placed. Movers are swept in [`sweep_order`], so
/// the outcome does not depend on input order.
fn settle(fixed: &[Rect], movers: &[LayoutItem]) -> ReflowResult {
    let mut ordered: Vec<&LayoutItem> = movers.iter().collect();
    ordered.sort_by(|a, b| sweep_order(a, b));

    let mut placed: Vec<Rect> = fixed.to_vec();
    let mut result = ReflowResult::default();
    for item in ordered {
        let mut rect = item.rect;
        // Each step lands on a strictly lower bottom edge, so this terminates.
        while let Some(bottom) = placed
            .iter()
            .filter(|other| other.intersects(&rect))
            .map(Rect::bottom)
            .max()
        {
            rect = rect.with_y(bottom);
        }
        placed.push(rect);
        let next = LayoutItem::new(item.display_name.clone(), rect);
        if rect != item.rect {
            result.moved.push(next.clone());
        }
        result.final_state.push(next);
    }
    result
}

/// Resolve crossings caused by `changed`, which keeps its rectangle.
///
/// `all` may or may not contain `changed`; its old entry is ignored.
pub fn get_reflow_result(changed: &LayoutItem, all: &[LayoutItem]) -> ReflowResult {
    let movers: Vec<LayoutItem> = all
        .iter()
        .filter(|item| item.display_name != changed.display_name)
        .cloned()
        .collect();
    let mut result = settle(&[changed.rect], &movers);
    result.final_state.insert(0, changed.clone());
    result
}

/// Siblings that must move once `changed` takes its new rectangle. Excluded
/// names neither move nor block.
pub fn compute_reflow(
    changed: &LayoutItem,
    siblings: &[LayoutItem],
    excluded: &[String],
) -> Vec<LayoutItem> {
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    let movers: Vec<LayoutItem> = siblings
        .iter()
        .filter(|item| {
            item.display_name != changed.display_name
                && !excluded.contains(item.display_name.as_str())
        })
        .cloned()
        .collect();
    settle(&[changed.rect], &movers).moved
}

/// Treat a group bounding box as one fixed rectangle and reflow the rest.
pub fn crossing_effects(
    square: Rect,
    siblings: &[LayoutItem],
    excluded: &[String],
) -> Vec<LayoutItem> {
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    let movers: Vec<LayoutItem> = siblings
        .iter()
        .filter(|item| !excluded.contains(item.display_name.as_str()))
        .cloned()
        .collect();
    settle(&[square], &movers).moved
}

/// Bounding box of a group of rectangles; `None` for an empty group.
pub fn combine_widget_infos<I>(rects: I) -> Option<Rect>
where
    I: IntoIterator<Item = Rect>,
{
    rects.into_iter().reduce(|acc, rect| acc.union(&rect))
}

/// Chain of siblings hanging below `origin`: anything starting at or under its
/// bottom edge whose columns overlap `origin` or an earlier chain member.
pub fn get_near_component_nodes(origin: &LayoutItem, siblings: &[LayoutItem]) -> Vec<LayoutItem> {
    let mut candidates: Vec<&LayoutItem> = siblings
        .iter()
        .filter(|item| {
            item.display_name != origin.display_name && item.rect.y >= origin.rect.bottom()
        })
        .collect();
    candidates.sort_by(|a, b| sweep_order(a, b));

    let mut chain: Vec<LayoutItem> = Vec::new();
    for item in candidates {
        let linked = item.rect.overlaps_columns(&origin.rect)
            || chain.iter().any(|member| {
                member.rect.overlaps_columns(&item.rect) && member.rect.bottom() <= item.rect.y
            });
        if linked {
            chain.push(item.clone());
        }
    }
    chain
}

/// Lift the chain below `item` by `old_height - item.rect.h` rows.
///
/// A chain member never rises past a sibling that stays put above it.
pub fn shrink_effects(item: &LayoutItem, old_height: u32, siblings: &[LayoutItem]) -> Vec<LayoutItem> {
    let delta = old_height.saturating_sub(item.rect.h);
    if delta == 0 {
        return Vec::new();
    }
    let footprint = LayoutItem::new(item.display_name.clone(), item.rect.with_h(old_height));
    let chain = get_near_component_nodes(&footprint, siblings);
    let chain_names: HashSet<&str> = chain.iter().map(|m| m.display_name.as_str()).collect();

    let mut placed: Vec<Rect> = siblings
        .iter()
        .filter(|s| s.display_name != item.display_name && !chain_names.contains(s.display_name.as_str()))
        .map(|s| s.rect)
        .collect();
    placed.push(item.rect);

    let mut moved = Vec::new();
    for member in &chain {
        let target = member.rect.y.saturating_sub(delta);
        // Lowest bottom edge among rectangles that would block this column span.
        let floor = placed
            .iter()
            .filter(|other| other.overlaps_columns(&member.rect) && other.bottom() <= member.rect.y)
            .map(Rect::bottom)
            .max()
            .unwrap_or(0);
        let rect = member.rect.with_y(target.max(floor));
        placed.push(rect);
        if rect != member.rect {
            moved.push(LayoutItem::new(member.display_name.clone(), rect));
        }
    }
    moved
}

/// Which reflow a height change calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightChange {
    Grow,
    Shrink { rows: u32 },
    Unchanged,
}

/// Classify a height change. `stored` is the node's committed height
/// (already clamped to `minH`), `requested` the measured one.
///
/// Growth needs `old <= stored && old < requested`; shrink needs
/// `old >= stored && old > requested`. Anything else leaves siblings alone.
pub fn classify_height_change(old_height: u32, stored: u32, requested: u32) -> HeightChange {
    if old_height <= stored && old_height < requested {
        HeightChange::Grow
    } else if old_height >= stored && old_height > requested {
        HeightChange::Shrink {
            rows: old_height - stored,
        }
    } else {
        HeightChange::Unchanged
    }
}

/// Siblings to move after `item` changed height from `old_height`.
pub fn height_effects(
    item: &LayoutItem,
    old_height: u32,
    requested: u32,
    siblings: &[LayoutItem],
) -> Vec<LayoutItem> {
    match classify_height_change(old_height, item.rect.h, requested) {
        HeightChange::Grow => get_reflow_result(item, siblings).moved,
        HeightChange::Shrink { .. } => shrink_effects(item, old_height, siblings),
        HeightChange::Unchanged => Vec::new(),
    }
}

/// Every crossing pair among siblings, names ordered within and across pairs.
pub fn find_overlaps(items: &[LayoutItem]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (i, a) in items.iter().enumerate() {
        for b in &items[i + 1..] {
            if a.rect.intersects(&b.rect) {
                let (first, second) = if a.display_name <= b.display_name {
                    (a, b)
                } else {
                    (b, a)
                };
                pairs.push((first.display_name.clone(), second.display_name.clone()));
            }
        }
    }
    pairs.sort();
    pairs
}

/// Fail on the first zero-sized rectangle or crossing pair.
pub fn validate_layout(items: &[LayoutItem]) -> Result<(), GridError> {
    if let Some(item) = items.iter().find(|item| item.rect.is_empty()) {
        return Err(GridError::ZeroSized(item.display_name.clone()));
    }
    match find_overlaps(items).into_iter().next() {
        Some((a, b)) => Err(GridError::Overlap { a, b }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, x: u32, y: u32, w: u32, h: u32) -> LayoutItem {
        LayoutItem::new(name, Rect::new(x, y, w, h))
    }

    #[test]
    fn growing_pushes_the_next_sibling_down() {
        let siblings = vec![item("a", 0, 0, 8, 4), item("b", 0, 4, 8, 4)];
        let grown = item("a", 0, 0, 8, 8);
        let moved = height_effects(&grown, 4, 8, &siblings);
        assert_eq!(moved, vec![item("b", 0, 8, 8, 4)]);
    }

    #[test]
    fn shrinking_lifts_the_chain_below() {
        let siblings = vec![
            item("a", 0, 0, 8, 8),
            item("b", 0, 8, 8, 4),
            item("c", 0, 12, 8, 2),
            item("side", 20, 0, 8, 30),
        ];
        let shrunk = item("a", 0, 0, 8, 4);
        let moved = height_effects(&shrunk, 8, 4, &siblings);
        assert_eq!(moved, vec![item("b", 0, 4, 8, 4), item("c", 0, 8, 8, 2)]);
    }

    #[test]
    fn shrink_stops_at_a_blocking_sibling() {
        let siblings = vec![
            item("a", 0, 0, 4, 8),
            item("wall", 4, 0, 4, 7),
            item("b", 2, 8, 4, 2),
        ];
        let moved = shrink_effects(&item("a", 0, 0, 4, 4), 8, &siblings);
        assert_eq!(moved, vec![item("b", 2, 7, 4, 2)]);
    }

    #[test]
    fn height_thresholds_are_asymmetric() {
        assert_eq!(classify_height_change(4, 8, 8), HeightChange::Grow);
        assert_eq!(classify_height_change(8, 4, 4), HeightChange::Shrink { rows: 4 });
        // Clamped by minH: stored stays above the request, nothing to lift.
        assert_eq!(classify_height_change(6, 6, 3), HeightChange::Shrink { rows: 0 });
        assert_eq!(classify_height_change(5, 5, 5), HeightChange::Unchanged);
        assert_eq!(classify_height_change(8, 9, 2), HeightChange::Unchanged);
    }

    #[test]
    fn reflow_cascades_and_is_order_independent() {
        let changed = item("a", 0, 0, 10, 6);
        let forward = vec![item("b", 0, 4, 10, 2), item("c", 0, 6, 10, 2), item("d", 12, 0, 4, 4)];
        let mut reversed = forward.clone();
        reversed.reverse();
        let first = compute_reflow(&changed, &forward, &[]);
        let second = compute_reflow(&changed, &reversed, &[]);
        assert_eq!(first, second);
        assert_eq!(first, vec![item("b", 0, 6, 10, 2), item("c", 0, 8, 10, 2)]);
    }

    #[test]
    fn reflow_is_idempotent() {
        let changed = item("a", 0, 0, 10, 6);
        let siblings = vec![item("b", 0, 4, 10, 2), item("c", 2, 5, 3, 3)];
        let once = get_reflow_result(&changed, &siblings);
        let twice = get_reflow_result(&changed, &once.final_state);
        assert_eq!(once.final_state, twice.final_state);
        assert!(twice.moved.is_empty());
        assert!(find_overlaps(&once.final_state).is_empty());
    }

    #[test]
    fn excluded_nodes_neither_move_nor_block() {
        let changed = item("a", 0, 0, 4, 4);
        let siblings = vec![item("ghost", 0, 0, 4, 8), item("b", 0, 2, 4, 2)];
        let moved = compute_reflow(&changed, &siblings, &["ghost".to_string()]);
        assert_eq!(moved, vec![item("b", 0, 4, 4, 2)]);
    }

    #[test]
    fn crossing_moves_around_the_group_box() {
        let square = combine_widget_infos([Rect::new(0, 0, 2, 2), Rect::new(2, 1, 2, 3)]).unwrap();
        assert_eq!(square, Rect::new(0, 0, 4, 4));
        let siblings = vec![
            item("g1", 0, 0, 2, 2),
            item("other", 1, 2, 4, 2),
            item("clear", 10, 0, 2, 2),
        ];
        let moved = crossing_effects(square, &siblings, &["g1".to_string()]);
        assert_eq!(moved, vec![item("other", 1, 4, 4, 2)]);
        assert!(combine_widget_infos(Vec::new()).is_none());
    }

    #[test]
    fn validation_reports_zero_size_and_overlap() {
        assert_eq!(
            validate_layout(&[item("a", 0, 0, 0, 2)]),
            Err(GridError::ZeroSized("a".into()))
        );
        assert_eq!(
            validate_layout(&[item("b", 0, 0, 2, 2), item("a", 1, 1, 2, 2)]),
            Err(GridError::Overlap {
                a: "a".into(),
                b: "b".into()
            })
        );
        assert!(validate_layout(&[item("a", 0, 0, 2, 2), item("b", 0, 2, 2, 2)]).is_ok());
    }
}
