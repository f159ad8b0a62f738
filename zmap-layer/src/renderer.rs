use serde_json::Value;
use zmap_core::geometry::Extent;

use crate::geometry::Geometry;

/// 图层渲染器接口。图层只负责告知"哪些几何体发生了什么变化"，
/// 绘制细节完全由实现方决定。除增删外的回调均有空实现。
pub trait LayerRenderer {
    fn on_geometry_add(&self, geometries: &[Geometry]);

    fn on_geometry_remove(&self, geometries: &[Geometry]);

    fn on_geometry_z_index_change(&self, _geometry: &Geometry) {}

    fn on_geometry_position_change(&self, _geometry: &Geometry) {}

    fn on_geometry_shape_change(&self, _geometry: &Geometry) {}

    fn on_geometry_symbol_change(&self, _geometry: &Geometry) {}

    fn on_geometry_show(&self, _geometry: &Geometry) {}

    fn on_geometry_hide(&self, _geometry: &Geometry) {}

    fn on_geometry_properties_change(&self, _geometry: &Geometry) {}

    /// 清空已绘制图像缓存，`clear()` 时调用。
    fn clear_image_cache(&self) {}
}

/// 添加几何体后的视图适配方式。
#[derive(Debug, Clone, PartialEq)]
pub enum FitView {
    /// 立即定位到新增范围。
    Immediate,
    /// 以动画方式定位，参数原样转交给视图控制器。
    Animate(Value),
}

/// 外部视图控制器，负责根据范围调整地图中心与缩放。调用不等待动画完成。
pub trait ViewController {
    fn fit_extent(&self, extent: &Extent, fit: &FitView);
}
