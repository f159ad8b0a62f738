use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;
use zmap_core::{
    feature::{GeometryData, GeometryType, Shape},
    geometry::Point2,
};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse json in {path:?}: {source}")]
    JsonError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// 将单条记录（或批量容器）转换为一个或多个几何体描述。
pub trait FeatureParser {
    fn parse(&self, record: &Value) -> Result<Vec<GeometryData>, IoError>;
}

pub trait FeatureLoader {
    fn load(&self, path: &Path) -> Result<Vec<GeometryData>, IoError>;
}

/// GeoJSON 读取器。支持 geometry 对象、`Feature`、`FeatureCollection`、
/// 它们组成的数组，以及 `{ feature, options, symbol }` 形式的图层导出格式。
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonReader;

impl GeoJsonReader {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureParser for GeoJsonReader {
    fn parse(&self, record: &Value) -> Result<Vec<GeometryData>, IoError> {
        let mut out = Vec::new();
        parse_record(record, &mut out)?;
        trace!(count = out.len(), "GeoJSON 记录解析完成");
        Ok(out)
    }
}

impl FeatureLoader for GeoJsonReader {
    fn load(&self, path: &Path) -> Result<Vec<GeometryData>, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let record: Value = serde_json::from_str(&data).map_err(|source| IoError::JsonError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&record)
    }
}

/// 导出格式中的 `options` 段。
#[derive(Debug, Default, Deserialize)]
struct ProfileOptions {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "zIndex")]
    z_index: Option<i32>,
    #[serde(default)]
    visible: Option<bool>,
}

fn invalid(message: impl Into<String>) -> IoError {
    IoError::InvalidRecord(message.into())
}

fn parse_record(record: &Value, out: &mut Vec<GeometryData>) -> Result<(), IoError> {
    match record {
        Value::Array(items) => {
            for item in items {
                parse_record(item, out)?;
            }
            Ok(())
        }
        Value::Object(object) => {
            if object.contains_key("feature") {
                out.push(parse_profile(object)?);
                return Ok(());
            }
            match type_name(object)? {
                "FeatureCollection" => {
                    let features = object
                        .get("features")
                        .and_then(Value::as_array)
                        .ok_or_else(|| invalid("FeatureCollection is missing `features`"))?;
                    for feature in features {
                        parse_record(feature, out)?;
                    }
                }
                "Feature" => out.push(parse_feature(object)?),
                _ => out.push(GeometryData::new(parse_shape(object)?)),
            }
            Ok(())
        }
        Value::Null => Err(invalid("record is null")),
        other => Err(invalid(format!("unexpected json value: {other}"))),
    }
}

fn type_name(object: &Map<String, Value>) -> Result<&str, IoError> {
    object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("object has no `type` member"))
}

fn parse_feature(object: &Map<String, Value>) -> Result<GeometryData, IoError> {
    let geometry = object
        .get("geometry")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("Feature has no geometry"))?;
    let mut data = GeometryData::new(parse_shape(geometry)?);
    data.id = object.get("id").and_then(id_to_string);
    if let Some(properties) = object.get("properties").and_then(Value::as_object) {
        data.properties = properties.clone();
    }
    Ok(data)
}

fn parse_profile(object: &Map<String, Value>) -> Result<GeometryData, IoError> {
    let feature = object
        .get("feature")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("`feature` must be an object"))?;
    let mut data = parse_feature(feature)?;

    if let Some(options) = object.get("options") {
        let options: ProfileOptions = serde_json::from_value(options.clone())
            .map_err(|err| invalid(format!("invalid options: {err}")))?;
        if let Some(id) = options.id.as_ref().and_then(id_to_string) {
            data.id = Some(id);
        }
        if let Some(z_index) = options.z_index {
            data.z_index = z_index;
        }
        if let Some(visible) = options.visible {
            data.visible = visible;
        }
    }

    match object.get("symbol") {
        Some(Value::Object(symbol)) => data.symbol = Some(symbol.clone()),
        Some(Value::Null) | None => {}
        Some(_) => return Err(invalid("`symbol` must be an object")),
    }
    Ok(data)
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn parse_shape(object: &Map<String, Value>) -> Result<Shape, IoError> {
    let kind = type_name(object)?;
    let Some(geometry_type) = GeometryType::from_name(kind) else {
        return Err(IoError::UnsupportedGeometry(kind.to_string()));
    };
    let coordinates = object
        .get("coordinates")
        .ok_or_else(|| invalid(format!("{kind} has no coordinates")))?;
    let shape = match geometry_type {
        GeometryType::Point => Shape::Point(position(coordinates)?),
        GeometryType::MultiPoint => Shape::MultiPoint(positions(coordinates)?),
        GeometryType::LineString => Shape::LineString(positions(coordinates)?),
        GeometryType::MultiLineString => {
            Shape::MultiLineString(nested(coordinates, positions)?)
        }
        GeometryType::Polygon => Shape::Polygon(nested(coordinates, positions)?),
        GeometryType::MultiPolygon => {
            Shape::MultiPolygon(nested(coordinates, |rings| nested(rings, positions))?)
        }
    };
    Ok(shape)
}

/// 读取 `[x, y]` 或 `[x, y, z]`，高程分量被忽略。
fn position(value: &Value) -> Result<Point2, IoError> {
    let coords = value
        .as_array()
        .ok_or_else(|| invalid(format!("position must be an array, got {value}")))?;
    match (
        coords.first().and_then(Value::as_f64),
        coords.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Point2::new(x, y)),
        _ => Err(invalid(format!("position needs two numbers, got {value}"))),
    }
}

fn positions(value: &Value) -> Result<Vec<Point2>, IoError> {
    nested(value, position)
}

fn nested<T>(
    value: &Value,
    parse: impl Fn(&Value) -> Result<T, IoError>,
) -> Result<Vec<T>, IoError> {
    value
        .as_array()
        .ok_or_else(|| invalid(format!("expected coordinate array, got {value}")))?
        .iter()
        .map(parse)
        .collect()
}
