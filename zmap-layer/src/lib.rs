pub mod events;
pub mod extent;
pub mod filter;
pub mod geometry;
pub mod layer;
pub mod renderer;
pub mod resource;
pub mod style;
mod z_order;

pub mod errors {
    use thiserror::Error;
    use zmap_io::IoError;

    use crate::filter::FilterError;

    #[derive(Debug, Error)]
    pub enum LayerError {
        #[error("invalid geometry to add to layer({layer}) at index {index}")]
        InvalidGeometry { layer: String, index: usize },
        #[error("failed to parse geometry for layer({layer}) at index {index}: {source}")]
        ParseFailed {
            layer: String,
            index: usize,
            #[source]
            source: IoError,
        },
        #[error("duplicate geometry id in layer({layer}): {id}{}", index_suffix(.index))]
        DuplicateId {
            layer: String,
            id: String,
            index: Option<usize>,
        },
        #[error("geometry at index {index} is already added to another layer, cannot add to layer({layer})")]
        OwnedByOtherLayer { layer: String, index: usize },
        #[error("invalid style for layer({layer}): {source}")]
        InvalidStyle {
            layer: String,
            #[source]
            source: StyleError,
        },
        #[error("invalid filter expression for layer({layer}): {source}")]
        InvalidFilter {
            layer: String,
            #[source]
            source: FilterError,
        },
    }

    fn index_suffix(index: &Option<usize>) -> String {
        index
            .map(|index| format!(", at index {index}"))
            .unwrap_or_default()
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum StyleError {
        #[error("style must be a rule, an array of rules or a `$root`/`style` wrapper")]
        UnsupportedForm,
        #[error("style rule {index} must be an object")]
        RuleNotObject { index: usize },
        #[error("style rule {index} needs a `symbol` object")]
        InvalidSymbol { index: usize },
        #[error("invalid filter in style rule {index}: {source}")]
        Filter {
            index: usize,
            #[source]
            source: FilterError,
        },
    }
}

pub use errors::{LayerError, StyleError};
pub use events::{EventBus, GeometryEvent, LayerEvent};
pub use extent::{ExtentAccumulator, combined_extent};
pub use filter::{Filter, FilterError};
pub use geometry::Geometry;
pub use layer::{GeometryInput, GeometryLayer, LayerBase, LayerOptions, RemoveTarget};
pub use renderer::{FitView, LayerRenderer, ViewController};
pub use style::{CompiledStyle, StyleRule};
