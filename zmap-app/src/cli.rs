use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::info;
use zmap_config::AppConfig;
use zmap_core::feature::Symbol;
use zmap_core::geometry::Extent;
use zmap_layer::{FitView, Geometry, GeometryLayer, LayerOptions};

use crate::console::{ConsoleRenderer, ConsoleView};
use crate::loader::{FeatureSource, load_features, load_style};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: Option<PathBuf>,
    pub style: Option<PathBuf>,
    pub fit: bool,
}

/// 构建图层、加载要素与样式，并把图层概览打印到标准输出。
pub fn run(config: &AppConfig, options: &RunOptions) -> Result<()> {
    let layer = GeometryLayer::with_options(
        config.layer.id.clone(),
        LayerOptions {
            visible: config.layer.visible,
            style_root: config.resources.style_root.clone(),
        },
    );
    let renderer = Rc::new(ConsoleRenderer::default());
    let view = Rc::new(ConsoleView::default());
    layer.set_renderer(Some(renderer.clone()));
    layer.set_view_controller(Some(view.clone()));

    let style = load_style(options.style.as_deref())?;
    layer
        .set_style(style)
        .with_context(|| format!("图层 {} 样式无效", layer.id()))?;

    let loaded = load_features(options.input.as_deref())?;
    if options.fit {
        layer.add_and_fit(loaded.features, FitView::Immediate)?;
    } else {
        layer.add(loaded.features)?;
    }
    layer.sort_geometries();
    info!(layer = layer.id(), count = layer.count(), "图层构建完成");

    println!("Rust 版 zmap 矢量图层演示");
    match &loaded.source {
        FeatureSource::GeoJson(path) => println!("已从 GeoJSON 加载要素：{}", path.display()),
        FeatureSource::Demo => println!("已使用内置示例要素"),
    }
    println!(
        "图层 {}（可见: {}）几何体数量={}",
        layer.id(),
        if layer.base().is_visible() { "是" } else { "否" },
        layer.count()
    );
    println!(
        "zIndex 范围=[{}, {}]",
        layer.min_z_index(),
        layer.max_z_index()
    );
    match layer.extent() {
        Some(extent) => println!("图层范围={}", format_extent(&extent)),
        None => println!("图层范围=空"),
    }
    let rule_count = layer
        .compiled_style()
        .map_or(0, |style| style.rules().len());
    println!("样式规则数={rule_count}");
    if let Some(extent) = view.last_fit() {
        println!("视图已适配到={}", format_extent(&extent));
    }
    println!(
        "渲染器统计：新增={}, 移除={}, 更新={}",
        renderer.added(),
        renderer.removed(),
        renderer.updates()
    );

    println!("绘制顺序：");
    layer.for_each(|geometry, _| println!("{}", describe(geometry)));
    Ok(())
}

fn describe(geometry: &Geometry) -> String {
    let internal_id = geometry
        .internal_id()
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    format!(
        "  - #{} id={} 类型={} zIndex={} 符号={}",
        internal_id,
        geometry.id().unwrap_or_else(|| "-".to_string()),
        geometry.geometry_type().name(),
        geometry.z_index(),
        geometry
            .extern_symbol()
            .map_or_else(|| "无".to_string(), |symbol| format_symbol(&symbol))
    )
}

fn format_symbol(symbol: &Symbol) -> String {
    let parts: Vec<String> = symbol
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    parts.join(", ")
}

fn format_extent(extent: &Extent) -> String {
    let (min, max) = (extent.min(), extent.max());
    format!(
        "({:.2}, {:.2}) - ({:.2}, {:.2})",
        min.x(),
        min.y(),
        max.x(),
        max.y()
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use zmap_core::feature::Shape;
    use zmap_core::geometry::Point2;

    use super::*;

    #[test]
    fn describe_lists_symbol_or_placeholder() {
        let layer = GeometryLayer::new("t");
        let geometry = Geometry::new(Shape::Point(Point2::new(1.0, 2.0))).with_id("p");
        layer.add([&geometry]).expect("add");
        assert_eq!(describe(&geometry), "  - #0 id=p 类型=Point zIndex=0 符号=无");

        layer
            .set_style(json!({ "symbol": { "markerWidth": 8 } }))
            .expect("style");
        assert!(describe(&geometry).ends_with("符号=markerWidth=8"));
    }

    #[test]
    fn extent_is_printed_with_two_decimals() {
        let extent = Extent::from_coords(0.0, -1.5, 2.25, 3.0);
        assert_eq!(format_extent(&extent), "(0.00, -1.50) - (2.25, 3.00)");
    }
}
