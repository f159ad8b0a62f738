use std::rc::Rc;

use serde_json::Value;
use tracing::debug;
use zmap_core::feature::{FeatureView, Symbol};

use crate::errors::{LayerError, StyleError};
use crate::events::LayerEvent;
use crate::filter::Filter;
use crate::geometry::Geometry;
use crate::layer::GeometryLayer;
use crate::resource::resolve_style;

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub filter: Filter,
    pub symbol: Rc<Symbol>,
}

/// 编译后的样式：按声明顺序排列的 (过滤条件, 符号) 列表，首个匹配生效。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledStyle {
    rules: Vec<StyleRule>,
}

impl CompiledStyle {
    /// 编译单条规则或规则数组。缺省 `filter` 的规则匹配全部要素。
    pub fn compile(style: &Value) -> Result<Self, StyleError> {
        let rules: Vec<&Value> = match style {
            Value::Array(rules) => rules.iter().collect(),
            Value::Object(_) => vec![style],
            _ => return Err(StyleError::UnsupportedForm),
        };
        let mut compiled = Vec::with_capacity(rules.len());
        for (index, rule) in rules.into_iter().enumerate() {
            let Value::Object(rule) = rule else {
                return Err(StyleError::RuleNotObject { index });
            };
            let filter = Filter::compile(rule.get("filter").unwrap_or(&Value::Null))
                .map_err(|source| StyleError::Filter { index, source })?;
            let Some(Value::Object(symbol)) = rule.get("symbol") else {
                return Err(StyleError::InvalidSymbol { index });
            };
            compiled.push(StyleRule {
                filter,
                symbol: Rc::new(symbol.clone()),
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn symbol_for(&self, view: &FeatureView) -> Option<Rc<Symbol>> {
        self.rules
            .iter()
            .find(|rule| rule.filter.matches(view))
            .map(|rule| Rc::clone(&rule.symbol))
    }
}

#[derive(Debug, Default)]
pub(crate) struct StyleEngine {
    raw: Option<Value>,
    compiled: Option<CompiledStyle>,
}

impl GeometryLayer {
    /// 设置图层样式。编译失败时保留原有样式不变。
    pub fn set_style(&self, style: Value) -> Result<(), LayerError> {
        let root = self.base().options().style_root;
        let invalid = |source: StyleError| LayerError::InvalidStyle {
            layer: self.id().to_string(),
            source,
        };
        let resolved = resolve_style(&style, root.as_deref()).map_err(invalid)?;
        let compiled = CompiledStyle::compile(&resolved).map_err(invalid)?;
        let rule_count = compiled.rules.len();
        {
            let mut engine = self.inner.style.borrow_mut();
            engine.raw = Some(style);
            engine.compiled = Some(compiled);
        }

        let mut matched = 0;
        for geometry in self.geometries() {
            if self.apply_style(&geometry) {
                matched += 1;
            }
        }
        debug!(layer = self.id(), rules = rule_count, matched, "图层样式已更新");
        self.fire(LayerEvent::SetStyle { style: resolved });
        Ok(())
    }

    /// 移除样式并清除全部几何体的外部符号。未设置样式时不做任何事。
    pub fn remove_style(&self) {
        let had_style = {
            let mut engine = self.inner.style.borrow_mut();
            engine.compiled = None;
            engine.raw.take().is_some()
        };
        if !had_style {
            return;
        }
        for geometry in self.geometries() {
            geometry.set_extern_symbol(None);
        }
        debug!(layer = self.id(), "图层样式已移除");
        self.fire(LayerEvent::RemoveStyle);
    }

    /// 原始样式定义。
    pub fn style(&self) -> Option<Value> {
        self.style_engine().raw.clone()
    }

    pub fn compiled_style(&self) -> Option<CompiledStyle> {
        self.style_engine().compiled.clone()
    }

    /// 为几何体赋予首个匹配规则的符号。无匹配时保持原符号并返回 false。
    pub fn apply_style(&self, geometry: &Geometry) -> bool {
        match self.style_symbol(geometry) {
            Some(symbol) => {
                geometry.set_extern_symbol(Some(symbol));
                true
            }
            None => false,
        }
    }

    pub(crate) fn style_symbol(&self, geometry: &Geometry) -> Option<Rc<Symbol>> {
        let engine = self.style_engine();
        let compiled = engine.compiled.as_ref()?;
        compiled.symbol_for(&geometry.feature_view())
    }
}
