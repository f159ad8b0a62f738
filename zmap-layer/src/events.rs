use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;
use zmap_core::feature::Properties;
use zmap_core::geometry::Vector2;

use crate::errors::LayerError;
use crate::geometry::Geometry;
use crate::layer::{GeometryLayer, RemoveTarget};

type Handler<E> = Rc<dyn Fn(&E)>;

/// 按事件名分发的监听器表。分发前复制处理器列表，
/// 处理器内部可以继续注册或触发事件。
pub struct EventBus<E> {
    handlers: RefCell<HashMap<String, Vec<Handler<E>>>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
        }
    }

    pub fn on(&self, name: &str, handler: impl Fn(&E) + 'static) {
        self.handlers
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(Rc::new(handler));
    }

    /// 移除指定事件上的全部监听器，返回移除数量。
    pub fn off(&self, name: &str) -> usize {
        self.handlers
            .borrow_mut()
            .remove(name)
            .map_or(0, |handlers| handlers.len())
    }

    pub fn listens(&self, name: &str) -> usize {
        self.handlers.borrow().get(name).map_or(0, Vec::len)
    }

    pub fn emit(&self, name: &str, event: &E) {
        let handlers = self.handlers.borrow().get(name).cloned();
        let Some(handlers) = handlers else {
            return;
        };
        for handler in handlers {
            handler(event);
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        let mut map = f.debug_map();
        for (name, list) in handlers.iter() {
            map.entry(name, &list.len());
        }
        map.finish()
    }
}

/// 几何体自身触发的事件，每种变化携带各自的前后值。
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryEvent {
    Add,
    Remove,
    IdChange {
        old: Option<String>,
        new: Option<String>,
    },
    ZIndexChange {
        old: i32,
        new: i32,
    },
    PositionChange {
        offset: Vector2,
    },
    ShapeChange,
    SymbolChange,
    Show,
    Hide,
    PropertiesChange {
        old: Properties,
        new: Properties,
    },
}

impl GeometryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryEvent::Add => "add",
            GeometryEvent::Remove => "remove",
            GeometryEvent::IdChange { .. } => "idchange",
            GeometryEvent::ZIndexChange { .. } => "zindexchange",
            GeometryEvent::PositionChange { .. } => "positionchange",
            GeometryEvent::ShapeChange => "shapechange",
            GeometryEvent::SymbolChange => "symbolchange",
            GeometryEvent::Show => "show",
            GeometryEvent::Hide => "hide",
            GeometryEvent::PropertiesChange { .. } => "propertieschange",
        }
    }
}

/// 图层级批量事件。
#[derive(Debug, Clone)]
pub enum LayerEvent {
    AddGeo { geometries: Vec<Geometry> },
    /// 携带调用方传入的原始目标列表，而非实际移除的集合。
    RemoveGeo { targets: Vec<RemoveTarget> },
    Clear,
    SetStyle { style: Value },
    RemoveStyle,
}

impl LayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LayerEvent::AddGeo { .. } => "addgeo",
            LayerEvent::RemoveGeo { .. } => "removegeo",
            LayerEvent::Clear => "clear",
            LayerEvent::SetStyle { .. } => "setstyle",
            LayerEvent::RemoveStyle => "removestyle",
        }
    }
}

impl GeometryLayer {
    /// 接收几何体冒泡上来的变化通知。只有 id 变化可能失败。
    pub(crate) fn route_geometry_event(
        &self,
        geometry: &Geometry,
        event: &GeometryEvent,
    ) -> Result<(), LayerError> {
        trace!(layer = self.id(), event = event.name(), "路由几何体事件");
        match event {
            GeometryEvent::IdChange { old, new } => {
                self.on_id_change(geometry, old.as_deref(), new.as_deref())
            }
            GeometryEvent::ZIndexChange { old, new } => {
                self.on_z_index_change(geometry, *old, *new);
                Ok(())
            }
            other => {
                self.forward_to_renderer(geometry, other);
                Ok(())
            }
        }
    }

    fn on_id_change(
        &self,
        geometry: &Geometry,
        old: Option<&str>,
        new: Option<&str>,
    ) -> Result<(), LayerError> {
        let mut registry = self.inner.registry.borrow_mut();
        let mapped_correctly = match old {
            Some(id) => registry
                .ids
                .get(id)
                .is_some_and(|existing| existing.ptr_eq(geometry)),
            None => true,
        };
        if old == new && mapped_correctly {
            return Ok(());
        }
        if let Some(new_id) = new {
            if let Some(existing) = registry.ids.get(new_id) {
                if !existing.ptr_eq(geometry) {
                    return Err(LayerError::DuplicateId {
                        layer: self.id().to_string(),
                        id: new_id.to_string(),
                        index: None,
                    });
                }
            }
            registry.ids.insert(new_id.to_string(), geometry.clone());
        }
        if let Some(old_id) = old {
            if old != new {
                registry.ids.remove(old_id);
            }
        }
        Ok(())
    }

    fn on_z_index_change(&self, geometry: &Geometry, old: i32, new: i32) {
        if old == new {
            return;
        }
        self.inner.registry.borrow_mut().order.on_z_index_change(new);
        if let Some(renderer) = self.base().renderer() {
            renderer.on_geometry_z_index_change(geometry);
        }
    }

    fn forward_to_renderer(&self, geometry: &Geometry, event: &GeometryEvent) {
        let Some(renderer) = self.base().renderer() else {
            return;
        };
        match event {
            GeometryEvent::PositionChange { .. } => renderer.on_geometry_position_change(geometry),
            GeometryEvent::ShapeChange => renderer.on_geometry_shape_change(geometry),
            GeometryEvent::SymbolChange => renderer.on_geometry_symbol_change(geometry),
            GeometryEvent::Show => renderer.on_geometry_show(geometry),
            GeometryEvent::Hide => renderer.on_geometry_hide(geometry),
            GeometryEvent::PropertiesChange { .. } => {
                renderer.on_geometry_properties_change(geometry)
            }
            GeometryEvent::Add
            | GeometryEvent::Remove
            | GeometryEvent::IdChange { .. }
            | GeometryEvent::ZIndexChange { .. } => {}
        }
    }

    /// 判断图层内是否有任一几何体监听了给定事件（以空白分隔的多个事件名）。
    pub fn has_listeners(&self, names: &str) -> bool {
        let names: Vec<&str> = names.split_whitespace().collect();
        if names.is_empty() {
            return false;
        }
        self.geometries()
            .iter()
            .any(|geometry| names.iter().any(|name| geometry.listens(name) > 0))
    }
}
