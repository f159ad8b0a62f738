use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};
use zmap_core::feature::{Properties, Shape};
use zmap_core::geometry::{Extent, Point2, Vector2};
use zmap_layer::{
    FitView, Geometry, GeometryLayer, LayerError, LayerEvent, LayerOptions, LayerRenderer,
    RemoveTarget, ViewController,
};

#[derive(Default)]
struct RecordingRenderer {
    calls: RefCell<Vec<String>>,
    added: RefCell<Vec<Vec<Geometry>>>,
    removed: RefCell<Vec<Vec<Geometry>>>,
}

impl RecordingRenderer {
    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &str, geometry: &Geometry) {
        let id = geometry.id().unwrap_or_default();
        self.calls.borrow_mut().push(format!("{call}:{id}"));
    }
}

impl LayerRenderer for RecordingRenderer {
    fn on_geometry_add(&self, geometries: &[Geometry]) {
        self.calls.borrow_mut().push(format!("add:{}", geometries.len()));
        self.added.borrow_mut().push(geometries.to_vec());
    }

    fn on_geometry_remove(&self, geometries: &[Geometry]) {
        self.calls.borrow_mut().push(format!("remove:{}", geometries.len()));
        self.removed.borrow_mut().push(geometries.to_vec());
    }

    fn on_geometry_z_index_change(&self, geometry: &Geometry) {
        self.record("zindex", geometry);
    }

    fn on_geometry_position_change(&self, geometry: &Geometry) {
        self.record("position", geometry);
    }

    fn on_geometry_symbol_change(&self, geometry: &Geometry) {
        self.record("symbol", geometry);
    }

    fn on_geometry_hide(&self, geometry: &Geometry) {
        self.record("hide", geometry);
    }

    fn clear_image_cache(&self) {
        self.calls.borrow_mut().push("clear_cache".to_string());
    }
}

#[derive(Default)]
struct RecordingView {
    fits: RefCell<Vec<(Extent, FitView)>>,
}

impl ViewController for RecordingView {
    fn fit_extent(&self, extent: &Extent, fit: &FitView) {
        self.fits.borrow_mut().push((*extent, fit.clone()));
    }
}

fn layer_with_renderer(id: &str) -> (GeometryLayer, Rc<RecordingRenderer>) {
    let layer = GeometryLayer::new(id);
    let renderer = Rc::new(RecordingRenderer::default());
    layer.set_renderer(Some(renderer.clone()));
    (layer, renderer)
}

fn point(id: &str, x: f64, y: f64) -> Geometry {
    Geometry::new(Shape::Point(Point2::new(x, y))).with_id(id)
}

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

fn ids(geometries: &[Geometry]) -> Vec<String> {
    geometries
        .iter()
        .map(|geometry| geometry.id().unwrap_or_default())
        .collect()
}

fn assert_id_map_consistent(layer: &GeometryLayer) {
    for geometry in layer.geometries() {
        if let Some(id) = geometry.id() {
            let mapped = layer.geometry_by_id(&id).expect("every id is mapped");
            assert!(mapped.ptr_eq(&geometry));
        }
    }
}

#[test]
fn draw_order_is_resolved_lazily() {
    let layer = GeometryLayer::new("order");
    let a = point("A", 0.0, 0.0);
    let b = point("B", 1.0, 0.0).with_z_index(5);
    let c = point("C", 2.0, 0.0).with_z_index(2);
    layer.add([&a, &b, &c]).expect("add");

    assert!(layer.order_dirty());
    assert_eq!(layer.first().expect("non-empty"), a);
    assert_eq!(layer.last().expect("non-empty"), c);

    layer.sort_geometries();
    assert!(!layer.order_dirty());
    assert_eq!(ids(&layer.geometries()), vec!["A", "C", "B"]);
    assert_eq!((layer.min_z_index(), layer.max_z_index()), (0, 5));
}

#[test]
fn z_index_change_marks_order_dirty_and_reaches_renderer() {
    let (layer, renderer) = layer_with_renderer("order");
    let a = point("A", 0.0, 0.0);
    let b = point("B", 0.0, 0.0);
    layer.add([&a, &b]).expect("add");
    assert!(!layer.order_dirty());

    a.set_z_index(3);
    assert!(layer.order_dirty());
    assert_eq!(layer.max_z_index(), 3);
    assert!(renderer.calls().contains(&"zindex:A".to_string()));

    a.set_z_index(3);
    let zindex_calls = renderer
        .calls()
        .iter()
        .filter(|call| call.starts_with("zindex"))
        .count();
    assert_eq!(zindex_calls, 1);

    layer.sort_geometries();
    assert_eq!(ids(&layer.geometries()), vec!["B", "A"]);

    b.set_z_index(-1);
    layer.sort_geometries();
    assert_eq!((layer.min_z_index(), layer.max_z_index()), (-1, 3));
}

#[test]
fn duplicate_id_keeps_earlier_items_of_the_batch() {
    let (layer, renderer) = layer_with_renderer("dup");
    layer.add([point("a", 0.0, 0.0)]).expect("first batch");

    let b = point("b", 1.0, 1.0);
    let clash = point("a", 2.0, 2.0);
    let err = layer.add([&b, &clash]).expect_err("duplicate id");
    match &err {
        LayerError::DuplicateId { layer, id, index } => {
            assert_eq!(layer, "dup");
            assert_eq!(id, "a");
            assert_eq!(*index, Some(1));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(layer.count(), 2);
    assert!(b.layer().is_some());
    assert!(clash.layer().is_none());
    assert!(clash.internal_id().is_none());
    assert_eq!(renderer.calls(), vec!["add:1"]);
    assert_eq!(ids(&renderer.added.borrow()[0]), vec!["a"]);
    assert_id_map_consistent(&layer);
}

#[test]
fn id_change_keeps_map_in_sync() {
    let layer = GeometryLayer::new("ids");
    let a = point("a", 0.0, 0.0);
    let b = point("b", 1.0, 0.0);
    layer.add([&a, &b]).expect("add");

    a.set_id(Some("renamed".to_string())).expect("free id");
    assert!(layer.geometry_by_id("a").is_none());
    assert_eq!(layer.geometry_by_id("renamed"), Some(a.clone()));

    let err = b.set_id(Some("renamed".to_string())).expect_err("taken id");
    assert!(matches!(err, LayerError::DuplicateId { index: None, .. }));
    assert_eq!(b.id().as_deref(), Some("b"));

    b.set_id(None).expect("clear id");
    assert!(layer.geometry_by_id("b").is_none());
    assert_id_map_consistent(&layer);
}

#[test]
fn add_then_remove_restores_empty_state() {
    let (layer, renderer) = layer_with_renderer("trip");
    let a = point("a", 0.0, 0.0);
    let b = point("b", 5.0, 5.0);
    layer.add([&a, &b]).expect("add");

    let removed_events = Rc::new(RefCell::new(Vec::new()));
    let sink = removed_events.clone();
    layer.on("removegeo", move |event| {
        if let LayerEvent::RemoveGeo { targets } = event {
            sink.borrow_mut().push(targets.clone());
        }
    });

    layer.remove(["a", "missing"]);
    layer.remove([&b]);

    assert!(layer.is_empty());
    assert!(layer.extent().is_none());
    assert!(a.layer().is_none() && b.layer().is_none());
    assert_eq!(renderer.calls(), vec!["add:2", "remove:1", "remove:1"]);
    assert_eq!(
        removed_events.borrow()[0],
        vec![
            RemoveTarget::Id("a".to_string()),
            RemoveTarget::Id("missing".to_string())
        ]
    );
}

#[test]
fn remove_resolves_targets_last_to_first() {
    let (layer, renderer) = layer_with_renderer("reverse");
    layer
        .add([point("a", 0.0, 0.0), point("b", 0.0, 0.0)])
        .expect("add");
    layer.remove(["a", "b"]);
    let removed = renderer.removed.borrow();
    assert_eq!(ids(&removed[0]), vec!["b"]);
    assert_eq!(ids(&removed[1]), vec!["a"]);
}

#[test]
fn clear_notifies_renderer_once() {
    let (layer, renderer) = layer_with_renderer("clear");
    let geometries: Vec<Geometry> = (0..4u8)
        .map(|i| point(&format!("g{i}"), f64::from(i), 0.0))
        .collect();
    layer.add(&geometries).expect("add");

    let lifecycle = Rc::new(RefCell::new(0));
    for geometry in &geometries {
        let sink = lifecycle.clone();
        geometry.on("remove", move |_| *sink.borrow_mut() += 1);
    }
    let cleared = Rc::new(RefCell::new(false));
    let sink = cleared.clone();
    layer.on("clear", move |_| *sink.borrow_mut() = true);

    layer.clear();

    assert_eq!(renderer.calls(), vec!["add:4", "remove:4", "clear_cache"]);
    assert_eq!(*lifecycle.borrow(), 4);
    assert!(*cleared.borrow());
    assert!(layer.is_empty());
    assert!(layer.geometry_by_id("g0").is_none());
    assert!(geometries.iter().all(|geometry| geometry.layer().is_none()));

    let again = point("g0", 0.0, 0.0);
    layer.add([&again]).expect("ids are free after clear");
    assert!(again.internal_id() > Some(3));
}

#[test]
fn style_first_match_wins_and_misses_keep_decoration() {
    let layer = GeometryLayer::new("styled");
    let school = point("s", 0.0, 0.0).with_properties(props(json!({ "kind": "school" })));
    let park = point("p", 1.0, 1.0).with_properties(props(json!({ "kind": "park" })));
    layer.add([&school, &park]).expect("add");

    layer
        .set_style(json!([
            { "filter": ["==", "kind", "school"], "symbol": { "markerFill": "red" } },
            { "filter": ["has", "kind"], "symbol": { "markerFill": "gray" } }
        ]))
        .expect("valid style");
    assert_eq!(school.extern_symbol().expect("styled")["markerFill"], json!("red"));
    assert_eq!(park.extern_symbol().expect("styled")["markerFill"], json!("gray"));

    park.set_properties(Properties::new());
    layer
        .set_style(json!([
            { "filter": ["==", "kind", "school"], "symbol": { "markerFill": "blue" } }
        ]))
        .expect("valid style");
    assert_eq!(school.extern_symbol().expect("styled")["markerFill"], json!("blue"));
    assert_eq!(park.extern_symbol().expect("kept")["markerFill"], json!("gray"));
}

#[test]
fn style_is_idempotent_and_applies_to_new_geometries() {
    let (layer, renderer) = layer_with_renderer("styled");
    let style = json!({ "filter": ["==", "$type", "Point"], "symbol": { "markerFill": "#f00" } });
    layer.set_style(style.clone()).expect("style");
    layer.set_style(style.clone()).expect("same style");
    assert_eq!(layer.style(), Some(style));

    let a = point("a", 0.0, 0.0);
    layer.add([&a]).expect("add");
    assert!(a.extern_symbol().is_some());
    assert_eq!(renderer.calls(), vec!["add:1"]);

    let before = a.extern_symbol();
    assert!(layer.apply_style(&a));
    assert_eq!(a.extern_symbol(), before);
}

#[test]
fn symbol_listener_may_add_geometries_during_insertion() {
    let (layer, renderer) = layer_with_renderer("styled");
    layer
        .set_style(json!({ "symbol": { "markerFill": "#f00" } }))
        .expect("style");

    let a = point("a", 0.0, 0.0);
    let b = point("b", 1.0, 0.0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let layer = layer.clone();
        let b = b.clone();
        let seen = seen.clone();
        a.on("symbolchange", move |_| {
            let target = layer.geometry_by_id("a").expect("a is bound before its symbol event");
            seen.borrow_mut().push(target.internal_id());
            layer.add([&b]).expect("nested add");
        });
    }
    layer.add([&a]).expect("add a");
    assert_eq!(*seen.borrow(), vec![Some(0)]);
    assert_eq!(b.internal_id(), Some(1));
    assert!(b.extern_symbol().is_some());

    layer
        .add([point("c", 2.0, 0.0), point("d", 3.0, 0.0), point("e", 4.0, 0.0)])
        .expect("add rest");
    assert_eq!(ids(&layer.geometries()), vec!["a", "b", "c", "d", "e"]);

    layer.remove(["b"]);
    assert_eq!(layer.count(), 4);
    assert!(b.layer().is_none());
    assert!(layer.geometry_by_id("b").is_none());
    assert_eq!(ids(&layer.geometries()), vec!["a", "c", "d", "e"]);
    assert_id_map_consistent(&layer);
    assert!(!renderer.calls().iter().any(|call| call.starts_with("symbol")));
}

#[test]
fn invalid_style_leaves_previous_style_in_place() {
    let layer = GeometryLayer::new("styled");
    let style = json!([{ "symbol": { "lineColor": "#000" } }]);
    layer.set_style(style.clone()).expect("style");
    let err = layer
        .set_style(json!([{ "filter": ["==", "a"], "symbol": {} }]))
        .expect_err("bad filter");
    assert!(matches!(err, LayerError::InvalidStyle { .. }));
    assert_eq!(layer.style(), Some(style));
}

#[test]
fn remove_style_resets_decorations() {
    let (layer, renderer) = layer_with_renderer("styled");
    let a = point("a", 0.0, 0.0);
    layer.add([&a]).expect("add");

    let events = Rc::new(RefCell::new(Vec::new()));
    for name in ["setstyle", "removestyle"] {
        let sink = events.clone();
        layer.on(name, move |event| sink.borrow_mut().push(event.name()));
    }

    layer.remove_style();
    assert!(events.borrow().is_empty());

    layer
        .set_style(json!({ "symbol": { "markerFill": "red" } }))
        .expect("style");
    layer.remove_style();
    assert!(a.extern_symbol().is_none());
    assert!(layer.style().is_none());
    assert!(layer.compiled_style().is_none());
    assert_eq!(*events.borrow(), vec!["setstyle", "removestyle"]);
    assert_eq!(
        renderer
            .calls()
            .iter()
            .filter(|call| call.as_str() == "symbol:a")
            .count(),
        2
    );
}

#[test]
fn style_resources_resolve_against_layer_root() {
    let layer = GeometryLayer::with_options(
        "icons",
        LayerOptions {
            style_root: Some("/assets".to_string()),
            ..LayerOptions::default()
        },
    );
    let seen = Rc::new(RefCell::new(Value::Null));
    let sink = seen.clone();
    layer.on("setstyle", move |event| {
        if let LayerEvent::SetStyle { style } = event {
            *sink.borrow_mut() = style.clone();
        }
    });
    let a = point("a", 0.0, 0.0);
    layer.add([&a]).expect("add");
    layer
        .set_style(json!({ "symbol": { "markerFile": "pin.png" } }))
        .expect("style");

    assert_eq!(a.extern_symbol().expect("styled")["markerFile"], json!("/assets/pin.png"));
    assert_eq!(seen.borrow()["symbol"]["markerFile"], json!("/assets/pin.png"));
    assert_eq!(
        layer.style().expect("raw kept")["symbol"]["markerFile"],
        json!("pin.png")
    );
}

#[test]
fn extent_is_union_and_fit_uses_new_geometries_only() {
    let layer = GeometryLayer::new("extent");
    let view = Rc::new(RecordingView::default());
    layer.set_view_controller(Some(view.clone()));
    assert!(layer.extent().is_none());

    layer
        .add([point("a", 0.0, 0.0), point("b", 10.0, 10.0)])
        .expect("add");
    layer
        .add_and_fit(
            [point("c", 20.0, -5.0), point("d", 25.0, 5.0)],
            FitView::Animate(json!({ "duration": 300 })),
        )
        .expect("add and fit");

    assert_eq!(
        layer.extent(),
        Some(Extent::from_coords(0.0, -5.0, 25.0, 10.0))
    );
    let fits = view.fits.borrow();
    assert_eq!(fits.len(), 1);
    assert_eq!(fits[0].0, Extent::from_coords(20.0, -5.0, 25.0, 5.0));
    assert_eq!(fits[0].1, FitView::Animate(json!({ "duration": 300 })));
}

#[test]
fn filter_queries_do_not_change_membership() {
    let layer = GeometryLayer::new("query");
    layer
        .add([
            json!({ "type": "Feature", "id": "r1", "properties": { "class": "rail" },
                    "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] } }),
            json!({ "type": "Feature", "id": "p1", "properties": { "class": "park" },
                    "geometry": { "type": "MultiPolygon",
                                  "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]]] } }),
        ])
        .expect("records");

    let polygons = layer
        .filter_by(&json!(["==", "$type", "Polygon"]))
        .expect("valid filter");
    assert_eq!(ids(&polygons), vec!["p1"]);
    let rails = layer.filter(|geometry| geometry.properties().get("class") == Some(&json!("rail")));
    assert_eq!(ids(&rails), vec!["r1"]);
    assert_eq!(layer.count(), 2);
}

#[test]
fn for_each_iterates_a_snapshot() {
    let layer = GeometryLayer::new("snapshot");
    layer
        .add([point("a", 0.0, 0.0), point("b", 0.0, 0.0), point("c", 0.0, 0.0)])
        .expect("add");
    let mut visited = Vec::new();
    layer.for_each(|geometry, index| {
        visited.push((geometry.id().unwrap_or_default(), index));
        geometry.remove();
    });
    assert_eq!(
        visited,
        vec![
            ("a".to_string(), 0),
            ("b".to_string(), 1),
            ("c".to_string(), 2)
        ]
    );
    assert!(layer.is_empty());
}

#[test]
fn renderer_may_reenter_the_layer() {
    struct Reentrant {
        layer: RefCell<Option<GeometryLayer>>,
        seen: RefCell<Vec<usize>>,
    }
    impl LayerRenderer for Reentrant {
        fn on_geometry_add(&self, _geometries: &[Geometry]) {
            if let Some(layer) = self.layer.borrow().as_ref() {
                self.seen.borrow_mut().push(layer.count());
                layer.sort_geometries();
            }
        }
        fn on_geometry_remove(&self, _geometries: &[Geometry]) {
            if let Some(layer) = self.layer.borrow().as_ref() {
                self.seen.borrow_mut().push(layer.count());
            }
        }
    }

    let layer = GeometryLayer::new("reentrant");
    let renderer = Rc::new(Reentrant {
        layer: RefCell::new(Some(layer.clone())),
        seen: RefCell::new(Vec::new()),
    });
    layer.set_renderer(Some(renderer.clone()));
    layer
        .add([point("a", 0.0, 0.0).with_z_index(1), point("b", 0.0, 0.0)])
        .expect("add");
    layer.remove(["a"]);
    layer.clear();
    assert_eq!(*renderer.seen.borrow(), vec![2, 1, 0]);
    *renderer.layer.borrow_mut() = None;
}

#[test]
fn geometry_mutations_are_forwarded_to_renderer() {
    let (layer, renderer) = layer_with_renderer("forward");
    let a = point("a", 0.0, 0.0);
    layer.add([&a]).expect("add");
    a.translate(Vector2::new(1.0, 1.0));
    a.hide();
    a.hide();
    a.set_symbol(Some(props(json!({ "markerFill": "#fff" }))));
    assert_eq!(
        renderer.calls(),
        vec!["add:1", "position:a", "hide:a", "symbol:a"]
    );

    layer.set_renderer(None);
    a.show();
    assert!(a.is_visible());
}

#[test]
fn has_listeners_checks_every_geometry() {
    let layer = GeometryLayer::new("listeners");
    let a = point("a", 0.0, 0.0);
    let b = point("b", 0.0, 0.0);
    layer.add([&a, &b]).expect("add");
    assert!(!layer.has_listeners("click mousemove"));
    b.on("mousemove", |_| {});
    assert!(layer.has_listeners("click mousemove"));
    assert!(!layer.has_listeners("click"));
    assert!(!layer.has_listeners("   "));
}

#[test]
fn addgeo_carries_every_converted_input() {
    let layer = GeometryLayer::new("events");
    let a = point("a", 0.0, 0.0);
    layer.add([&a]).expect("add");

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    layer.on("addgeo", move |event| {
        if let LayerEvent::AddGeo { geometries } = event {
            sink.borrow_mut().push(geometries.len());
        }
    });
    let added = layer.add([a.clone(), point("b", 0.0, 0.0)]).expect("add");
    assert_eq!(added.len(), 2);
    assert_eq!(*seen.borrow(), vec![2]);
    assert_eq!(layer.count(), 2);
}
