use criterion::{Criterion, black_box, criterion_group, criterion_main};
use builder_core::layout::{compute_reflow, crossing_effects};
use builder_core::{
    Action, ComponentNode, ComponentType, EditorRuntime, LayoutItem, Rect, RuntimeConfig,
};
use serde_json::json;

const COLUMNS: u32 = 8;
const ROWS: u32 = 60;

/// A page tiled with `COLUMNS * ROWS` text widgets, each 8 wide and 4 tall.
fn canvas() -> Vec<LayoutItem> {
    (0..ROWS)
        .flat_map(|row| {
            (0..COLUMNS).map(move |column| {
                LayoutItem::new(
                    format!("text{}", row * COLUMNS + column),
                    Rect::new(column * 8, row * 4, 8, 4),
                )
            })
        })
        .collect()
}

fn document(bound_widgets: u32) -> ComponentNode {
    let mut children = vec![
        ComponentNode::new("input0", ComponentType::InputWidget)
            .with_parent("page1")
            .with_rect(Rect::new(0, 0, 8, 4))
            .with_props(json!({"value": "seed"})),
    ];
    for index in 1..bound_widgets {
        children.push(
            ComponentNode::new(format!("text{index}"), ComponentType::TextWidget)
                .with_parent("page1")
                .with_rect(Rect::new(0, index * 4, 8, 4))
                .with_props(json!({
                    "value": format!("{{{{ input0.value }}}} #{index}"),
                    "label": "{{ globalData.count }}",
                })),
        );
    }
    ComponentNode::root()
        .with_props(json!({
            "pageSortedKey": ["page1"],
            "homepageDisplayName": "page1",
            "currentPageIndex": 0,
            "globalData": {"count": 1},
        }))
        .with_children(vec![ComponentNode::page("page1").with_children(children)])
}

fn reflow_on_large_canvas(c: &mut Criterion) {
    let siblings = canvas();
    let dropped = LayoutItem::new("image1", Rect::new(4, 0, 32, 12));
    c.bench_function("reflow_drop_on_canvas", |b| {
        b.iter(|| compute_reflow(black_box(&dropped), black_box(&siblings), &[]));
    });

    let square = Rect::new(0, 40, 64, 8);
    let excluded = vec!["text80".to_string(), "text81".to_string()];
    c.bench_function("reflow_group_crossing", |b| {
        b.iter(|| crossing_effects(black_box(square), black_box(&siblings), &excluded));
    });
}

fn evaluation(c: &mut Criterion) {
    let root = document(300);
    c.bench_function("evaluate_full_document", |b| {
        b.iter(|| {
            let mut runtime = EditorRuntime::with_default_listeners(RuntimeConfig::default());
            runtime
                .dispatch(Action::InitTree(black_box(root.clone())))
                .map(|report| report.processed.len())
        });
    });

    let mut runtime = EditorRuntime::with_default_listeners(RuntimeConfig::default());
    let _ = runtime.dispatch(Action::InitTree(root));
    let mut toggle = false;
    c.bench_function("evaluate_after_prop_write", |b| {
        b.iter(|| {
            toggle = !toggle;
            let value = if toggle { "a" } else { "b" };
            runtime.dispatch(Action::UpdateProps {
                display_name: "input0".into(),
                slice: builder_core::tree::props_of(json!({ "value": value })),
            })
        });
    });
}

criterion_group!(benches, reflow_on_large_canvas, evaluation);
criterion_main!(benches);
