use std::cell::{Cell, RefCell};

use tracing::{debug, info};
use zmap_core::geometry::Extent;
use zmap_layer::{FitView, Geometry, LayerRenderer, ViewController};

/// 只把收到的变化写进日志的渲染器，同时统计绘制批次。
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    added: Cell<usize>,
    removed: Cell<usize>,
    updates: Cell<usize>,
}

impl ConsoleRenderer {
    pub fn added(&self) -> usize {
        self.added.get()
    }

    pub fn removed(&self) -> usize {
        self.removed.get()
    }

    pub fn updates(&self) -> usize {
        self.updates.get()
    }

    fn touch(&self, change: &str, geometry: &Geometry) {
        self.updates.set(self.updates.get() + 1);
        let id = geometry.id();
        debug!(
            change,
            id = id.as_deref().unwrap_or("-"),
            internal_id = geometry.internal_id(),
            "渲染器收到几何体变化"
        );
    }
}

impl LayerRenderer for ConsoleRenderer {
    fn on_geometry_add(&self, geometries: &[Geometry]) {
        self.added.set(self.added.get() + geometries.len());
        info!(count = geometries.len(), "渲染器收到新增几何体");
    }

    fn on_geometry_remove(&self, geometries: &[Geometry]) {
        self.removed.set(self.removed.get() + geometries.len());
        info!(count = geometries.len(), "渲染器收到移除几何体");
    }

    fn on_geometry_z_index_change(&self, geometry: &Geometry) {
        self.touch("zindex", geometry);
    }

    fn on_geometry_position_change(&self, geometry: &Geometry) {
        self.touch("position", geometry);
    }

    fn on_geometry_shape_change(&self, geometry: &Geometry) {
        self.touch("shape", geometry);
    }

    fn on_geometry_symbol_change(&self, geometry: &Geometry) {
        self.touch("symbol", geometry);
    }

    fn on_geometry_show(&self, geometry: &Geometry) {
        self.touch("show", geometry);
    }

    fn on_geometry_hide(&self, geometry: &Geometry) {
        self.touch("hide", geometry);
    }

    fn on_geometry_properties_change(&self, geometry: &Geometry) {
        self.touch("properties", geometry);
    }

    fn clear_image_cache(&self) {
        debug!("渲染器清空图像缓存");
    }
}

/// 记录最近一次视图适配请求的视图控制器。
#[derive(Debug, Default)]
pub struct ConsoleView {
    last_fit: RefCell<Option<Extent>>,
}

impl ConsoleView {
    pub fn last_fit(&self) -> Option<Extent> {
        *self.last_fit.borrow()
    }
}

impl ViewController for ConsoleView {
    fn fit_extent(&self, extent: &Extent, fit: &FitView) {
        let center = extent.center();
        info!(
            x = center.x(),
            y = center.y(),
            width = extent.width(),
            height = extent.height(),
            animate = matches!(fit, FitView::Animate(_)),
            "视图适配到新增范围"
        );
        *self.last_fit.borrow_mut() = Some(*extent);
    }
}
