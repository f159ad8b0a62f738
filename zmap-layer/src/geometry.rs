use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;
use zmap_core::feature::{FeatureView, GeometryData, GeometryType, Properties, Shape, Symbol};
use zmap_core::geometry::{Extent, Vector2};

use crate::errors::LayerError;
use crate::events::{EventBus, GeometryEvent};
use crate::layer::{GeometryLayer, LayerInner};

#[derive(Debug)]
struct GeometryState {
    id: Option<String>,
    internal_id: Option<u64>,
    z_index: i32,
    shape: Shape,
    properties: Properties,
    symbol: Option<Symbol>,
    extern_symbol: Option<Rc<Symbol>>,
    visible: bool,
    owner: Option<Weak<LayerInner>>,
}

struct GeometryInner {
    state: RefCell<GeometryState>,
    listeners: EventBus<GeometryEvent>,
}

/// 地图上的矢量几何体句柄。克隆得到的是同一个几何体。
///
/// 加入图层后，几何体的变化（id、zIndex、形状、符号……）会先冒泡给所属图层，
/// 再分发给自身的监听器。
#[derive(Clone)]
pub struct Geometry {
    inner: Rc<GeometryInner>,
}

impl Geometry {
    pub fn new(shape: Shape) -> Self {
        Self::from_data(GeometryData::new(shape))
    }

    pub fn from_data(data: GeometryData) -> Self {
        let state = GeometryState {
            id: data.id,
            internal_id: None,
            z_index: data.z_index,
            shape: data.shape,
            properties: data.properties,
            symbol: data.symbol,
            extern_symbol: None,
            visible: data.visible,
            owner: None,
        };
        Self {
            inner: Rc::new(GeometryInner {
                state: RefCell::new(state),
                listeners: EventBus::new(),
            }),
        }
    }

    /// 构造阶段设置 id；已加入图层的几何体请使用 [`Geometry::set_id`]。
    pub fn with_id(self, id: impl Into<String>) -> Self {
        debug_assert!(self.layer().is_none());
        self.inner.state.borrow_mut().id = Some(id.into());
        self
    }

    pub fn with_z_index(self, z_index: i32) -> Self {
        debug_assert!(self.layer().is_none());
        self.inner.state.borrow_mut().z_index = z_index;
        self
    }

    pub fn with_properties(self, properties: Properties) -> Self {
        self.inner.state.borrow_mut().properties = properties;
        self
    }

    pub fn with_symbol(self, symbol: Symbol) -> Self {
        self.inner.state.borrow_mut().symbol = Some(symbol);
        self
    }

    #[inline]
    pub fn id(&self) -> Option<String> {
        self.inner.state.borrow().id.clone()
    }

    /// 图层分配的内部 id，未加入图层时为 None。
    #[inline]
    pub fn internal_id(&self) -> Option<u64> {
        self.inner.state.borrow().internal_id
    }

    #[inline]
    pub fn z_index(&self) -> i32 {
        self.inner.state.borrow().z_index
    }

    pub fn shape(&self) -> Shape {
        self.inner.state.borrow().shape.clone()
    }

    #[inline]
    pub fn geometry_type(&self) -> GeometryType {
        self.inner.state.borrow().shape.geometry_type()
    }

    pub fn properties(&self) -> Properties {
        self.inner.state.borrow().properties.clone()
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.inner.state.borrow().symbol.clone()
    }

    /// 图层样式赋予的外部符号。
    pub fn extern_symbol(&self) -> Option<Rc<Symbol>> {
        self.inner.state.borrow().extern_symbol.clone()
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.inner.state.borrow().visible
    }

    pub fn extent(&self) -> Option<Extent> {
        self.inner.state.borrow().shape.extent()
    }

    pub fn layer(&self) -> Option<GeometryLayer> {
        let state = self.inner.state.borrow();
        state
            .owner
            .as_ref()
            .and_then(Weak::upgrade)
            .map(GeometryLayer::from_inner)
    }

    pub fn feature_view(&self) -> FeatureView {
        let state = self.inner.state.borrow();
        FeatureView {
            id: state.id.clone(),
            geometry_type: state.shape.geometry_type(),
            properties: state.properties.clone(),
        }
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Geometry) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn belongs_to(&self, layer: &GeometryLayer) -> bool {
        self.inner
            .state
            .borrow()
            .owner
            .as_ref()
            .is_some_and(|owner| layer.is_inner(owner))
    }

    /// 修改 id。所属图层若已有其他几何体使用该 id，返回错误且不做任何修改。
    pub fn set_id(&self, id: Option<String>) -> Result<(), LayerError> {
        let event = GeometryEvent::IdChange {
            old: self.id(),
            new: id.clone(),
        };
        if let Some(layer) = self.layer() {
            layer.route_geometry_event(self, &event)?;
        }
        self.inner.state.borrow_mut().id = id;
        self.inner.listeners.emit(event.name(), &event);
        Ok(())
    }

    pub fn set_z_index(&self, z_index: i32) {
        let old = std::mem::replace(&mut self.inner.state.borrow_mut().z_index, z_index);
        self.notify(GeometryEvent::ZIndexChange { old, new: z_index });
    }

    pub fn set_shape(&self, shape: Shape) {
        self.inner.state.borrow_mut().shape = shape;
        self.notify(GeometryEvent::ShapeChange);
    }

    pub fn translate(&self, offset: Vector2) {
        self.inner.state.borrow_mut().shape.translate(offset);
        self.notify(GeometryEvent::PositionChange { offset });
    }

    pub fn set_symbol(&self, symbol: Option<Symbol>) {
        self.inner.state.borrow_mut().symbol = symbol;
        self.notify(GeometryEvent::SymbolChange);
    }

    pub fn set_properties(&self, properties: Properties) {
        let old = std::mem::replace(
            &mut self.inner.state.borrow_mut().properties,
            properties.clone(),
        );
        self.notify(GeometryEvent::PropertiesChange {
            old,
            new: properties,
        });
    }

    pub fn show(&self) {
        if self.replace_visible(true) {
            self.notify(GeometryEvent::Show);
        }
    }

    pub fn hide(&self) {
        if self.replace_visible(false) {
            self.notify(GeometryEvent::Hide);
        }
    }

    fn replace_visible(&self, visible: bool) -> bool {
        let previous = std::mem::replace(&mut self.inner.state.borrow_mut().visible, visible);
        previous != visible
    }

    /// 从所属图层移除自身；不在任何图层中时为空操作。
    pub fn remove(&self) {
        let Some(layer) = self.layer() else {
            return;
        };
        layer.on_remove_geometry(self);
        self.unbind();
        self.emit(&GeometryEvent::Remove);
    }

    pub fn on(&self, name: &str, handler: impl Fn(&GeometryEvent) + 'static) {
        self.inner.listeners.on(name, handler);
    }

    pub fn off(&self, name: &str) -> usize {
        self.inner.listeners.off(name)
    }

    /// 指定事件上的监听器数量。
    pub fn listens(&self, name: &str) -> usize {
        self.inner.listeners.listens(name)
    }

    /// 触发事件：先交给所属图层路由，再分发给自身监听器。
    pub fn fire(&self, event: GeometryEvent) -> Result<(), LayerError> {
        if let Some(layer) = self.layer() {
            layer.route_geometry_event(self, &event)?;
        }
        self.emit(&event);
        Ok(())
    }

    fn notify(&self, event: GeometryEvent) {
        if let Err(err) = self.fire(event) {
            warn!(error = %err, "几何体事件路由失败");
        }
    }

    pub(crate) fn emit(&self, event: &GeometryEvent) {
        self.inner.listeners.emit(event.name(), event);
    }

    pub(crate) fn set_internal_id(&self, internal_id: Option<u64>) {
        self.inner.state.borrow_mut().internal_id = internal_id;
    }

    pub(crate) fn bind(&self, layer: &GeometryLayer) {
        self.inner.state.borrow_mut().owner = Some(layer.downgrade());
    }

    fn unbind(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.owner = None;
        state.internal_id = None;
    }

    pub(crate) fn set_extern_symbol(&self, symbol: Option<Rc<Symbol>>) {
        self.assign_extern_symbol(symbol);
        self.notify(GeometryEvent::SymbolChange);
    }

    /// 只写入样式符号，不分发事件。
    pub(crate) fn assign_extern_symbol(&self, symbol: Option<Rc<Symbol>>) {
        self.inner.state.borrow_mut().extern_symbol = symbol;
    }
}

impl From<GeometryData> for Geometry {
    fn from(data: GeometryData) -> Self {
        Self::from_data(data)
    }
}

impl PartialEq for Geometry {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Geometry {}

impl fmt::Debug for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Geometry")
            .field("id", &state.id)
            .field("internal_id", &state.internal_id)
            .field("z_index", &state.z_index)
            .field("type", &state.shape.geometry_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;
    use zmap_core::geometry::Point2;

    use super::*;

    fn point(x: f64, y: f64) -> Geometry {
        Geometry::new(Shape::Point(Point2::new(x, y)))
    }

    #[test]
    fn unbound_geometry_fires_to_own_listeners() {
        let geometry = point(0.0, 0.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        geometry.on("zindexchange", move |event| sink.borrow_mut().push(event.clone()));

        geometry.set_z_index(4);
        assert_eq!(geometry.z_index(), 4);
        assert_eq!(
            *seen.borrow(),
            vec![GeometryEvent::ZIndexChange { old: 0, new: 4 }]
        );
        assert_eq!(geometry.listens("zindexchange"), 1);
        assert_eq!(geometry.off("zindexchange"), 1);
    }

    #[test]
    fn unbound_set_id_always_succeeds() {
        let geometry = point(0.0, 0.0);
        geometry.set_id(Some("a".to_string())).expect("no layer, no conflict");
        assert_eq!(geometry.id().as_deref(), Some("a"));
        geometry.set_id(None).expect("clearing id");
        assert!(geometry.id().is_none());
    }

    #[test]
    fn show_and_hide_fire_only_on_change() {
        let geometry = point(0.0, 0.0);
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        geometry.on("hide", move |_| *sink.borrow_mut() += 1);

        geometry.show();
        geometry.hide();
        geometry.hide();
        assert!(!geometry.is_visible());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn translate_moves_extent_and_reports_offset() {
        let geometry = point(1.0, 1.0);
        let offsets = Rc::new(RefCell::new(Vec::new()));
        let sink = offsets.clone();
        geometry.on("positionchange", move |event| {
            if let GeometryEvent::PositionChange { offset } = event {
                sink.borrow_mut().push(*offset);
            }
        });
        geometry.translate(Vector2::new(2.0, -1.0));
        let extent = geometry.extent().expect("point extent");
        assert_eq!(extent.min(), Point2::new(3.0, 0.0));
        assert_eq!(*offsets.borrow(), vec![Vector2::new(2.0, -1.0)]);
    }

    #[test]
    fn feature_view_projects_id_type_and_properties() {
        let mut properties = Properties::new();
        properties.insert("kind".to_string(), json!("school"));
        let geometry = Geometry::new(Shape::MultiPoint(vec![Point2::new(0.0, 0.0)]))
            .with_id("s1")
            .with_properties(properties);
        let view = geometry.feature_view();
        assert_eq!(view.id.as_deref(), Some("s1"));
        assert_eq!(view.geometry_type, GeometryType::MultiPoint);
        assert_eq!(view.property("kind"), Some(&json!("school")));
    }

    #[test]
    fn clones_share_identity() {
        let a = point(0.0, 0.0);
        let b = a.clone();
        let c = point(0.0, 0.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        b.set_z_index(2);
        assert_eq!(a.z_index(), 2);
    }
}
