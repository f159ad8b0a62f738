use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;
use zmap_core::feature::{GeometryData, Properties, Shape};
use zmap_core::geometry::Point2;
use zmap_io::{FeatureLoader, GeoJsonReader};

/// 要素来源，便于概览中说明数据出处。
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSource {
    GeoJson(PathBuf),
    Demo,
}

#[derive(Debug)]
pub struct LoadedFeatures {
    pub features: Vec<GeometryData>,
    pub source: FeatureSource,
}

/// 从 GeoJSON 文件加载要素；未指定文件时使用内置示例。
pub fn load_features(input: Option<&Path>) -> Result<LoadedFeatures> {
    let Some(path) = input else {
        let features = demo_features();
        info!(count = features.len(), "使用内置示例要素");
        return Ok(LoadedFeatures {
            features,
            source: FeatureSource::Demo,
        });
    };
    let features = GeoJsonReader::new()
        .load(path)
        .with_context(|| format!("无法加载要素文件 {}", path.display()))?;
    info!(path = %path.display(), count = features.len(), "从 GeoJSON 加载要素成功");
    Ok(LoadedFeatures {
        features,
        source: FeatureSource::GeoJson(path.to_path_buf()),
    })
}

/// 读取样式文件；未指定时返回内置示例样式。
pub fn load_style(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(demo_style());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("无法读取样式文件 {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("样式文件 {} 不是合法的 JSON", path.display()))
}

pub fn demo_style() -> Value {
    json!([
        { "filter": ["==", "$type", "Polygon"], "symbol": { "polygonFill": "#7bc47f", "polygonOpacity": 0.6 } },
        { "filter": ["all", ["==", "$type", "Point"], [">=", "population", 10_000_000]],
          "symbol": { "markerFile": "{$root}/icons/capital.png", "markerWidth": 24 } },
        { "filter": ["==", "$type", "Point"], "symbol": { "markerType": "ellipse", "markerWidth": 12 } },
        { "filter": ["==", "class", "rail"], "symbol": { "lineColor": "#444", "lineDasharray": [6, 4] } }
    ])
}

fn demo_features() -> Vec<GeometryData> {
    let city = |id: &str, x: f64, y: f64, population: u64| {
        let mut data = GeometryData::new(Shape::Point(Point2::new(x, y)));
        data.id = Some(id.to_string());
        data.z_index = 2;
        data.properties = properties(json!({ "name": id, "population": population }));
        data
    };

    let mut rail = GeometryData::new(Shape::LineString(vec![
        Point2::new(116.40, 39.90),
        Point2::new(117.20, 39.13),
        Point2::new(121.47, 31.23),
    ]));
    rail.id = Some("jinghu-rail".to_string());
    rail.z_index = 1;
    rail.properties = properties(json!({ "class": "rail" }));

    let mut park = GeometryData::new(Shape::Polygon(vec![vec![
        Point2::new(116.30, 39.95),
        Point2::new(116.35, 39.95),
        Point2::new(116.35, 40.00),
        Point2::new(116.30, 40.00),
        Point2::new(116.30, 39.95),
    ]]));
    park.id = Some("olympic-park".to_string());
    park.properties = properties(json!({ "class": "park" }));

    vec![
        city("beijing", 116.40, 39.90, 21_890_000),
        city("tianjin", 117.20, 39.13, 13_860_000),
        city("suzhou", 120.58, 31.30, 9_570_000),
        rail,
        park,
    ]
}

fn properties(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}
