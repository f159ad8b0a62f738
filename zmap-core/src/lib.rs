pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，坐标单位由地图投影决定。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维位移向量，用于几何体平移。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    /// 轴对齐范围。合并运算满足交换律与结合律，结果与遍历顺序无关。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Extent {
        min: Point2,
        max: Point2,
    }

    impl Extent {
        /// 由任意两个角点构造，自动规范化为 min/max。
        pub fn new(a: Point2, b: Point2) -> Self {
            let a = a.as_vec2();
            let b = b.as_vec2();
            Self {
                min: Point2::from_vec(a.min(b)),
                max: Point2::from_vec(a.max(b)),
            }
        }

        #[inline]
        pub fn from_coords(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
            Self::new(Point2::new(xmin, ymin), Point2::new(xmax, ymax))
        }

        /// 退化为单点的范围。
        #[inline]
        pub fn of_point(point: Point2) -> Self {
            Self {
                min: point,
                max: point,
            }
        }

        /// 覆盖全部点的最小范围；没有点时返回 None。
        pub fn from_points<I>(points: I) -> Option<Self>
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut points = points.into_iter();
            let first = points.next()?;
            let mut extent = Self::of_point(first);
            for point in points {
                extent.include_point(point);
            }
            Some(extent)
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            self.min = Point2::from_vec(self.min.as_vec2().min(point.as_vec2()));
            self.max = Point2::from_vec(self.max.as_vec2().max(point.as_vec2()));
        }

        #[must_use]
        pub fn combine(&self, other: &Extent) -> Extent {
            Extent {
                min: Point2::from_vec(self.min.as_vec2().min(other.min.as_vec2())),
                max: Point2::from_vec(self.max.as_vec2().max(other.max.as_vec2())),
            }
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            Point2::from_vec((self.min.as_vec2() + self.max.as_vec2()) * 0.5)
        }
    }
}

pub mod feature {
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    use crate::geometry::{Extent, Point2, Vector2};

    /// 几何体属性表，与 GeoJSON `properties` 一致。
    pub type Properties = Map<String, Value>;

    /// 符号（样式）描述，保持为原始 JSON 对象，由渲染器解释。
    pub type Symbol = Map<String, Value>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum GeometryType {
        Point,
        MultiPoint,
        LineString,
        MultiLineString,
        Polygon,
        MultiPolygon,
    }

    impl GeometryType {
        pub fn name(self) -> &'static str {
            match self {
                GeometryType::Point => "Point",
                GeometryType::MultiPoint => "MultiPoint",
                GeometryType::LineString => "LineString",
                GeometryType::MultiLineString => "MultiLineString",
                GeometryType::Polygon => "Polygon",
                GeometryType::MultiPolygon => "MultiPolygon",
            }
        }

        /// 过滤表达式 `$type` 使用的基础类型：多部件几何退化为对应的单部件类型。
        pub fn base_name(self) -> &'static str {
            match self {
                GeometryType::Point | GeometryType::MultiPoint => "Point",
                GeometryType::LineString | GeometryType::MultiLineString => "LineString",
                GeometryType::Polygon | GeometryType::MultiPolygon => "Polygon",
            }
        }

        pub fn from_name(name: &str) -> Option<Self> {
            let kind = match name {
                "Point" => GeometryType::Point,
                "MultiPoint" => GeometryType::MultiPoint,
                "LineString" => GeometryType::LineString,
                "MultiLineString" => GeometryType::MultiLineString,
                "Polygon" => GeometryType::Polygon,
                "MultiPolygon" => GeometryType::MultiPolygon,
                _ => return None,
            };
            Some(kind)
        }
    }

    /// 几何形状，序列化布局与 GeoJSON geometry 对象相同。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "coordinates")]
    pub enum Shape {
        Point(Point2),
        MultiPoint(Vec<Point2>),
        LineString(Vec<Point2>),
        MultiLineString(Vec<Vec<Point2>>),
        /// 第一个环为外环，其余为洞。
        Polygon(Vec<Vec<Point2>>),
        MultiPolygon(Vec<Vec<Vec<Point2>>>),
    }

    impl Shape {
        pub fn geometry_type(&self) -> GeometryType {
            match self {
                Shape::Point(_) => GeometryType::Point,
                Shape::MultiPoint(_) => GeometryType::MultiPoint,
                Shape::LineString(_) => GeometryType::LineString,
                Shape::MultiLineString(_) => GeometryType::MultiLineString,
                Shape::Polygon(_) => GeometryType::Polygon,
                Shape::MultiPolygon(_) => GeometryType::MultiPolygon,
            }
        }

        /// 计算形状的轴对齐范围，空坐标序列返回 None。
        pub fn extent(&self) -> Option<Extent> {
            let mut points = Vec::new();
            self.visit_points(|point| points.push(*point));
            Extent::from_points(points)
        }

        pub fn translate(&mut self, offset: Vector2) {
            self.visit_points_mut(|point| *point = point.translate(offset));
        }

        fn visit_points(&self, mut visit: impl FnMut(&Point2)) {
            match self {
                Shape::Point(point) => visit(point),
                Shape::MultiPoint(points) | Shape::LineString(points) => {
                    points.iter().for_each(visit)
                }
                Shape::MultiLineString(lines) | Shape::Polygon(lines) => {
                    lines.iter().flatten().for_each(visit)
                }
                Shape::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(visit),
            }
        }

        fn visit_points_mut(&mut self, mut visit: impl FnMut(&mut Point2)) {
            match self {
                Shape::Point(point) => visit(point),
                Shape::MultiPoint(points) | Shape::LineString(points) => {
                    points.iter_mut().for_each(visit)
                }
                Shape::MultiLineString(lines) | Shape::Polygon(lines) => {
                    lines.iter_mut().flatten().for_each(visit)
                }
                Shape::MultiPolygon(polygons) => polygons
                    .iter_mut()
                    .flatten()
                    .flatten()
                    .for_each(visit),
            }
        }
    }

    /// 解析器产出的几何体描述，尚未绑定到任何图层。
    #[derive(Debug, Clone, PartialEq)]
    pub struct GeometryData {
        pub id: Option<String>,
        pub z_index: i32,
        pub shape: Shape,
        pub properties: Properties,
        pub symbol: Option<Symbol>,
        pub visible: bool,
    }

    impl GeometryData {
        pub fn new(shape: Shape) -> Self {
            Self {
                id: None,
                z_index: 0,
                shape,
                properties: Properties::new(),
                symbol: None,
                visible: true,
            }
        }
    }

    /// 提供给过滤表达式的只读要素视图。
    #[derive(Debug, Clone, PartialEq)]
    pub struct FeatureView {
        pub id: Option<String>,
        pub geometry_type: GeometryType,
        pub properties: Properties,
    }

    impl FeatureView {
        #[inline]
        pub fn property(&self, key: &str) -> Option<&Value> {
            self.properties.get(key)
        }
    }

}
