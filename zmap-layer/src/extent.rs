use zmap_core::geometry::Extent;

use crate::geometry::Geometry;

/// 逐个折叠几何体范围。没有任何范围参与时结果为 None。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtentAccumulator {
    extent: Option<Extent>,
}

impl ExtentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(&mut self, extent: Option<Extent>) {
        let Some(extent) = extent else {
            return;
        };
        self.extent = Some(match self.extent {
            Some(current) => current.combine(&extent),
            None => extent,
        });
    }

    pub fn finish(self) -> Option<Extent> {
        self.extent
    }
}

pub fn combined_extent<'a>(geometries: impl IntoIterator<Item = &'a Geometry>) -> Option<Extent> {
    let mut accumulator = ExtentAccumulator::new();
    for geometry in geometries {
        accumulator.include(geometry.extent());
    }
    accumulator.finish()
}
