use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};
use zmap_core::feature::GeometryData;
use zmap_core::geometry::Extent;
use zmap_io::{FeatureParser, GeoJsonReader};

use crate::errors::LayerError;
use crate::events::{EventBus, GeometryEvent, LayerEvent};
use crate::extent::combined_extent;
use crate::filter::Filter;
use crate::geometry::Geometry;
use crate::renderer::{FitView, LayerRenderer, ViewController};
use crate::style::StyleEngine;
use crate::z_order::ZOrderIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct LayerOptions {
    pub visible: bool,
    /// 样式中相对资源路径的默认根目录。
    pub style_root: Option<String>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            visible: true,
            style_root: None,
        }
    }
}

/// 图层通用部分：id、选项以及渲染器与视图控制器的挂接点。
pub struct LayerBase {
    id: String,
    options: RefCell<LayerOptions>,
    renderer: RefCell<Option<Rc<dyn LayerRenderer>>>,
    view: RefCell<Option<Rc<dyn ViewController>>>,
}

impl LayerBase {
    fn new(id: String, options: LayerOptions) -> Self {
        Self {
            id,
            options: RefCell::new(options),
            renderer: RefCell::new(None),
            view: RefCell::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> LayerOptions {
        self.options.borrow().clone()
    }

    pub fn is_visible(&self) -> bool {
        self.options.borrow().visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.options.borrow_mut().visible = visible;
    }

    pub fn renderer(&self) -> Option<Rc<dyn LayerRenderer>> {
        self.renderer.borrow().clone()
    }

    pub fn view_controller(&self) -> Option<Rc<dyn ViewController>> {
        self.view.borrow().clone()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) ids: HashMap<String, Geometry>,
    pub(crate) order: ZOrderIndex,
    next_internal_id: u64,
}

impl Registry {
    fn allocate_internal_id(&mut self) -> u64 {
        let internal_id = self.next_internal_id;
        self.next_internal_id += 1;
        internal_id
    }
}

pub(crate) struct LayerInner {
    base: LayerBase,
    pub(crate) registry: RefCell<Registry>,
    clearing: Cell<bool>,
    pub(crate) style: RefCell<StyleEngine>,
    parser: RefCell<Box<dyn FeatureParser>>,
    listeners: EventBus<LayerEvent>,
}

/// `add` 的单个输入项。
#[derive(Debug, Clone)]
pub enum GeometryInput {
    Geometry(Geometry),
    /// 交给解析器转换的原始记录。
    Record(Value),
    Missing,
}

impl From<Geometry> for GeometryInput {
    fn from(geometry: Geometry) -> Self {
        GeometryInput::Geometry(geometry)
    }
}

impl From<&Geometry> for GeometryInput {
    fn from(geometry: &Geometry) -> Self {
        GeometryInput::Geometry(geometry.clone())
    }
}

impl From<Value> for GeometryInput {
    fn from(record: Value) -> Self {
        GeometryInput::Record(record)
    }
}

impl From<GeometryData> for GeometryInput {
    fn from(data: GeometryData) -> Self {
        GeometryInput::Geometry(Geometry::from_data(data))
    }
}

impl From<Option<Geometry>> for GeometryInput {
    fn from(geometry: Option<Geometry>) -> Self {
        geometry.map_or(GeometryInput::Missing, GeometryInput::Geometry)
    }
}

/// `remove` 的目标：按 id 或直接给出几何体。
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveTarget {
    Id(String),
    Geometry(Geometry),
}

impl From<&str> for RemoveTarget {
    fn from(id: &str) -> Self {
        RemoveTarget::Id(id.to_string())
    }
}

impl From<String> for RemoveTarget {
    fn from(id: String) -> Self {
        RemoveTarget::Id(id)
    }
}

impl From<Geometry> for RemoveTarget {
    fn from(geometry: Geometry) -> Self {
        RemoveTarget::Geometry(geometry)
    }
}

impl From<&Geometry> for RemoveTarget {
    fn from(geometry: &Geometry) -> Self {
        RemoveTarget::Geometry(geometry.clone())
    }
}

/// 矢量图层：持有几何体集合，维护 id 唯一性、绘制顺序与样式派生符号，
/// 并把增量变化告知渲染器。
#[derive(Clone)]
pub struct GeometryLayer {
    pub(crate) inner: Rc<LayerInner>,
}

impl GeometryLayer {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_options(id, LayerOptions::default())
    }

    pub fn with_options(id: impl Into<String>, options: LayerOptions) -> Self {
        let inner = LayerInner {
            base: LayerBase::new(id.into(), options),
            registry: RefCell::new(Registry::default()),
            clearing: Cell::new(false),
            style: RefCell::new(StyleEngine::default()),
            parser: RefCell::new(Box::new(GeoJsonReader::new())),
            listeners: EventBus::new(),
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    pub(crate) fn from_inner(inner: Rc<LayerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<LayerInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn is_inner(&self, owner: &Weak<LayerInner>) -> bool {
        std::ptr::eq(owner.as_ptr(), Rc::as_ptr(&self.inner))
    }

    #[inline]
    pub fn id(&self) -> &str {
        self.inner.base.id()
    }

    #[inline]
    pub fn base(&self) -> &LayerBase {
        &self.inner.base
    }

    /// 替换原始记录的解析器，默认为 GeoJSON。
    pub fn set_parser(&self, parser: impl FeatureParser + 'static) {
        *self.inner.parser.borrow_mut() = Box::new(parser);
    }

    pub fn set_renderer(&self, renderer: Option<Rc<dyn LayerRenderer>>) {
        *self.inner.base.renderer.borrow_mut() = renderer;
    }

    pub fn set_view_controller(&self, view: Option<Rc<dyn ViewController>>) {
        *self.inner.base.view.borrow_mut() = view;
    }

    pub fn on(&self, name: &str, handler: impl Fn(&LayerEvent) + 'static) {
        self.inner.listeners.on(name, handler);
    }

    pub fn listens(&self, name: &str) -> usize {
        self.inner.listeners.listens(name)
    }

    pub(crate) fn fire(&self, event: LayerEvent) {
        self.inner.listeners.emit(event.name(), &event);
    }

    pub fn add_one(&self, input: impl Into<GeometryInput>) -> Result<Vec<Geometry>, LayerError> {
        self.add(std::iter::once(input))
    }

    /// 批量加入几何体，返回转换后的全部输入。
    ///
    /// 逐项转换并绑定。任一输入项缺失、无法解析或 id 重复时立即返回错误，
    /// 本次调用中之前已加入的几何体保持不变。
    pub fn add<I, T>(&self, inputs: I) -> Result<Vec<Geometry>, LayerError>
    where
        I: IntoIterator<Item = T>,
        T: Into<GeometryInput>,
    {
        self.add_inner(inputs, None)
    }

    /// 加入几何体并让视图适配新增部分的范围。
    pub fn add_and_fit<I, T>(&self, inputs: I, fit: FitView) -> Result<Vec<Geometry>, LayerError>
    where
        I: IntoIterator<Item = T>,
        T: Into<GeometryInput>,
    {
        self.add_inner(inputs, Some(fit))
    }

    fn add_inner<I, T>(&self, inputs: I, fit: Option<FitView>) -> Result<Vec<Geometry>, LayerError>
    where
        I: IntoIterator<Item = T>,
        T: Into<GeometryInput>,
    {
        let mut converted = Vec::new();
        let mut added = Vec::new();
        for (index, input) in inputs.into_iter().enumerate() {
            for geometry in self.convert_input(index, input.into())? {
                if self.bind_geometry(index, &geometry)? {
                    added.push(geometry.clone());
                }
                converted.push(geometry);
            }
        }
        debug!(
            layer = self.id(),
            inputs = converted.len(),
            added = added.len(),
            "几何体已加入图层"
        );

        if !added.is_empty() {
            if let Some(renderer) = self.base().renderer() {
                renderer.on_geometry_add(&added);
            }
        }
        if let Some(fit) = fit {
            self.fit_view(&added, &fit);
        }
        self.fire(LayerEvent::AddGeo {
            geometries: converted.clone(),
        });
        Ok(converted)
    }

    fn convert_input(&self, index: usize, input: GeometryInput) -> Result<Vec<Geometry>, LayerError> {
        match input {
            GeometryInput::Geometry(geometry) => Ok(vec![geometry]),
            GeometryInput::Record(record) => {
                let parsed = self.inner.parser.borrow().parse(&record).map_err(|source| {
                    LayerError::ParseFailed {
                        layer: self.id().to_string(),
                        index,
                        source,
                    }
                })?;
                if parsed.is_empty() {
                    return Err(self.invalid_geometry(index));
                }
                Ok(parsed.into_iter().map(Geometry::from_data).collect())
            }
            GeometryInput::Missing => Err(self.invalid_geometry(index)),
        }
    }

    fn invalid_geometry(&self, index: usize) -> LayerError {
        LayerError::InvalidGeometry {
            layer: self.id().to_string(),
            index,
        }
    }

    /// 绑定单个几何体。已属于本图层时跳过并返回 false。
    ///
    /// 分配 internalId、登记 id 与加入序列在同一次借用内完成，
    /// 之后才分发几何体事件。
    fn bind_geometry(&self, index: usize, geometry: &Geometry) -> Result<bool, LayerError> {
        if geometry.belongs_to(self) {
            return Ok(false);
        }
        if geometry.layer().is_some() {
            return Err(LayerError::OwnedByOtherLayer {
                layer: self.id().to_string(),
                index,
            });
        }

        {
            let mut registry = self.inner.registry.borrow_mut();
            let internal_id = registry.allocate_internal_id();
            let id = geometry.id();
            if let Some(id) = &id {
                if registry.ids.contains_key(id) {
                    return Err(LayerError::DuplicateId {
                        layer: self.id().to_string(),
                        id: id.clone(),
                        index: Some(index),
                    });
                }
            }
            geometry.set_internal_id(Some(internal_id));
            if let Some(id) = id {
                registry.ids.insert(id, geometry.clone());
            }
            registry.order.push(geometry.clone());
        }
        geometry.bind(self);
        trace!(
            layer = self.id(),
            internal_id = geometry.internal_id(),
            z_index = geometry.z_index(),
            "几何体已绑定"
        );

        // 渲染器在 on_geometry_add 中拿到带样式的完整状态，这里只通知几何体自身。
        if let Some(symbol) = self.style_symbol(geometry) {
            geometry.assign_extern_symbol(Some(symbol));
            geometry.emit(&GeometryEvent::SymbolChange);
        }
        geometry.emit(&GeometryEvent::Add);
        Ok(true)
    }

    fn fit_view(&self, added: &[Geometry], fit: &FitView) {
        let Some(extent) = combined_extent(added) else {
            return;
        };
        if let Some(view) = self.base().view_controller() {
            debug!(layer = self.id(), ?fit, "适配视图到新增范围");
            view.fit_extent(&extent, fit);
        }
    }

    /// 按 id 或几何体移除。未知 id 与不属于本图层的几何体被忽略。
    pub fn remove<I, T>(&self, targets: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<RemoveTarget>,
    {
        let targets: Vec<RemoveTarget> = targets.into_iter().map(Into::into).collect();
        for target in targets.iter().rev() {
            let geometry = match target {
                RemoveTarget::Id(id) => self.geometry_by_id(id),
                RemoveTarget::Geometry(geometry) => {
                    geometry.belongs_to(self).then(|| geometry.clone())
                }
            };
            if let Some(geometry) = geometry {
                geometry.remove();
            }
        }
        self.fire(LayerEvent::RemoveGeo { targets });
    }

    /// 几何体自行移除时的回调。
    pub(crate) fn on_remove_geometry(&self, geometry: &Geometry) {
        if self.inner.clearing.get() || !geometry.belongs_to(self) {
            return;
        }
        if geometry.internal_id().is_none() {
            return;
        }
        let removed = {
            let mut registry = self.inner.registry.borrow_mut();
            if let Some(id) = geometry.id() {
                let mapped = registry
                    .ids
                    .get(&id)
                    .is_some_and(|existing| existing.ptr_eq(geometry));
                if mapped {
                    registry.ids.remove(&id);
                }
            }
            registry
                .order
                .position(geometry)
                .map(|position| registry.order.remove(position))
        };
        let Some(removed) = removed else {
            return;
        };
        trace!(layer = self.id(), internal_id = removed.internal_id(), "几何体已移出图层");
        if let Some(renderer) = self.base().renderer() {
            renderer.on_geometry_remove(std::slice::from_ref(&removed));
        }
    }

    /// 清空图层。渲染器只收到一次包含全部几何体的移除通知。
    pub fn clear(&self) {
        self.inner.clearing.set(true);
        for geometry in self.geometries() {
            geometry.remove();
        }
        let removed = {
            let mut registry = self.inner.registry.borrow_mut();
            registry.ids = HashMap::new();
            registry.order.take_all()
        };
        if let Some(renderer) = self.base().renderer() {
            renderer.on_geometry_remove(&removed);
            renderer.clear_image_cache();
        }
        self.inner.clearing.set(false);
        debug!(layer = self.id(), removed = removed.len(), "图层已清空");
        self.fire(LayerEvent::Clear);
    }

    pub fn geometry_by_id(&self, id: &str) -> Option<Geometry> {
        self.inner.registry.borrow().ids.get(id).cloned()
    }

    /// 当前几何体序列的副本。
    pub fn geometries(&self) -> Vec<Geometry> {
        self.inner.registry.borrow().order.snapshot()
    }

    pub fn geometries_matching(&self, predicate: impl Fn(&Geometry) -> bool) -> Vec<Geometry> {
        self.geometries()
            .into_iter()
            .filter(|geometry| predicate(geometry))
            .collect()
    }

    /// 序列中的第一个几何体，不触发重排。
    pub fn first(&self) -> Option<Geometry> {
        self.inner.registry.borrow().order.first()
    }

    /// 序列中的最后一个几何体，不触发重排。
    pub fn last(&self) -> Option<Geometry> {
        self.inner.registry.borrow().order.last()
    }

    pub fn count(&self) -> usize {
        self.inner.registry.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// 在调用时刻的快照上遍历，回调中可以安全地增删几何体。
    pub fn for_each(&self, mut visit: impl FnMut(&Geometry, usize)) {
        for (index, geometry) in self.geometries().iter().enumerate() {
            visit(geometry, index);
        }
    }

    pub fn filter(&self, predicate: impl Fn(&Geometry) -> bool) -> Vec<Geometry> {
        self.geometries_matching(predicate)
    }

    /// 使用过滤表达式筛选几何体。
    pub fn filter_by(&self, expression: &Value) -> Result<Vec<Geometry>, LayerError> {
        let filter = Filter::compile(expression).map_err(|source| LayerError::InvalidFilter {
            layer: self.id().to_string(),
            source,
        })?;
        Ok(self.geometries_matching(|geometry| filter.matches(&geometry.feature_view())))
    }

    /// 全部几何体范围的并集，图层为空时为 None。
    pub fn extent(&self) -> Option<Extent> {
        combined_extent(&self.geometries())
    }

    /// 必要时按 (zIndex, internalId) 重排，供渲染器绘制前调用。
    pub fn sort_geometries(&self) {
        self.inner.registry.borrow_mut().order.sort();
    }

    pub fn min_z_index(&self) -> i32 {
        self.inner.registry.borrow().order.min_z()
    }

    pub fn max_z_index(&self) -> i32 {
        self.inner.registry.borrow().order.max_z()
    }

    pub fn order_dirty(&self) -> bool {
        self.inner.registry.borrow().order.is_dirty()
    }

    pub(crate) fn style_engine(&self) -> Ref<'_, StyleEngine> {
        self.inner.style.borrow()
    }
}

impl fmt::Debug for GeometryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryLayer")
            .field("id", &self.id())
            .field("count", &self.count())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}
