use std::path::Path;

use serde_json::{Map, Value};
use tracing::trace;

use crate::errors::StyleError;

const ROOT_PLACEHOLDER: &str = "{$root}";
const ROOT_KEY: &str = "$root";

/// 展开样式中的资源路径，返回可直接编译的样式。
///
/// 支持 `{ "$root": ..., "style": ... }` 包装形式：包装内的根目录优先于 `default_root`。
/// 符号中以 `File` 结尾的字符串属性会被替换 `{$root}` 占位符，相对路径拼接到根目录上。
pub fn resolve_style(style: &Value, default_root: Option<&str>) -> Result<Value, StyleError> {
    let (root, body) = match style {
        Value::Object(object) if object.contains_key("style") => {
            let root = match object.get(ROOT_KEY) {
                None | Some(Value::Null) => default_root,
                Some(Value::String(root)) => Some(root.as_str()),
                Some(_) => return Err(StyleError::UnsupportedForm),
            };
            (root, &object["style"])
        }
        other => (default_root, other),
    };

    let mut resolved = body.clone();
    match &mut resolved {
        Value::Array(rules) => {
            for rule in rules.iter_mut() {
                resolve_rule(rule, root);
            }
        }
        Value::Object(_) => resolve_rule(&mut resolved, root),
        _ => return Err(StyleError::UnsupportedForm),
    }
    Ok(resolved)
}

fn resolve_rule(rule: &mut Value, root: Option<&str>) {
    // 只支持对象形式的符号，其他形式留给编译阶段报错。
    if let Some(Value::Object(symbol)) = rule.get_mut("symbol") {
        resolve_symbol(symbol, root);
    }
}

fn resolve_symbol(symbol: &mut Map<String, Value>, root: Option<&str>) {
    for (key, value) in symbol.iter_mut() {
        if !key.ends_with("File") {
            continue;
        }
        if let Value::String(path) = value {
            let resolved = resolve_resource_path(path, root);
            trace!(property = %key, from = %path, to = %resolved, "样式资源路径已展开");
            *path = resolved;
        }
    }
}

/// 解析单个资源路径。绝对路径、URL 与内联数据保持不变。
pub fn resolve_resource_path(path: &str, root: Option<&str>) -> String {
    if path.contains(ROOT_PLACEHOLDER) {
        return path.replace(ROOT_PLACEHOLDER, root.unwrap_or_default().trim_end_matches('/'));
    }
    let Some(root) = root else {
        return path.to_string();
    };
    if !is_relative(path) {
        return path.to_string();
    }
    let relative = path.strip_prefix("./").unwrap_or(path);
    format!("{}/{}", root.trim_end_matches('/'), relative)
}

fn is_relative(path: &str) -> bool {
    !(path.is_empty()
        || path.contains("://")
        || path.starts_with("data:")
        || Path::new(path).is_absolute())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn placeholder_is_substituted() {
        assert_eq!(
            resolve_resource_path("{$root}/icons/pin.png", Some("/assets/")),
            "/assets/icons/pin.png"
        );
        assert_eq!(resolve_resource_path("{$root}/pin.png", None), "/pin.png");
    }

    #[test]
    fn relative_paths_join_the_root() {
        assert_eq!(
            resolve_resource_path("./img/a.png", Some("http://cdn.example")),
            "http://cdn.example/img/a.png"
        );
        assert_eq!(resolve_resource_path("img/a.png", None), "img/a.png");
        assert_eq!(
            resolve_resource_path("https://tiles/a.png", Some("/root")),
            "https://tiles/a.png"
        );
        assert_eq!(resolve_resource_path("/abs/a.png", Some("/root")), "/abs/a.png");
    }

    #[test]
    fn wrapper_root_overrides_default() {
        let style = json!({
            "$root": "/themes/night",
            "style": [
                { "filter": true, "symbol": { "markerFile": "pin.png", "markerWidth": 10 } }
            ]
        });
        let resolved = resolve_style(&style, Some("/themes/day")).expect("wrapper style");
        assert_eq!(resolved[0]["symbol"]["markerFile"], json!("/themes/night/pin.png"));
        assert_eq!(resolved[0]["symbol"]["markerWidth"], json!(10));
    }

    #[test]
    fn composite_symbol_arrays_are_left_as_is() {
        let style = json!([{ "symbol": [{ "markerFile": "pin.png" }] }]);
        let resolved = resolve_style(&style, Some("/assets")).expect("array style");
        assert_eq!(resolved, style);
    }

    #[test]
    fn single_rule_uses_default_root() {
        let style = json!({ "symbol": { "lineFile": "{$root}/dash.png" } });
        let resolved = resolve_style(&style, Some("/assets")).expect("single rule");
        assert_eq!(resolved["symbol"]["lineFile"], json!("/assets/dash.png"));
    }

    #[test]
    fn scalar_style_is_unsupported() {
        assert_eq!(
            resolve_style(&json!("red"), None),
            Err(StyleError::UnsupportedForm)
        );
        assert_eq!(
            resolve_style(&json!({ "$root": 3, "style": [] }), None),
            Err(StyleError::UnsupportedForm)
        );
    }
}
