//! S-expression plist helpers shared by the config loader, the replay
//! reader and the control endpoint.
//!
//! All inputs are parsed with lexpr's default options, where `:key` reads
//! as a symbol.  Keyword values written by an elisp-flavoured parser are
//! accepted too.

use lexpr::Value;

/// Name of a plist key (`:key` symbol or keyword), without the colon.
pub fn key_name(value: &Value) -> Option<&str> {
    match value {
        Value::Keyword(k) => Some(&**k),
        Value::Symbol(s) => s.strip_prefix(':'),
        _ => None,
    }
}

/// Top-level elements of a proper or improper list.
pub fn list_items(value: &Value) -> Vec<&Value> {
    let mut items = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        items.push(pair.car());
        current = pair.cdr();
    }
    items
}

/// Key/value pairs of a plist, in order.  A trailing key without a value
/// is dropped.
pub fn plist_pairs(value: &Value) -> Vec<(&str, &Value)> {
    let items = list_items(value);
    items
        .chunks_exact(2)
        .filter_map(|pair| key_name(pair[0]).map(|k| (k, pair[1])))
        .collect()
}

/// Raw value stored under `:key`.
pub fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = value;
    while let Value::Cons(pair) = current {
        if key_name(pair.car()) == Some(key) {
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

/// Render an atom as plain text: keywords lose their colon, booleans and
/// nil read as `t` / `nil`.
pub fn atom_text(value: &Value) -> String {
    match value {
        Value::Keyword(v) => v.to_string(),
        Value::Symbol(v) => {
            let s: &str = v;
            s.strip_prefix(':').unwrap_or(s).to_string()
        }
        Value::String(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if *b { "t" } else { "nil" }).to_string(),
        Value::Null | Value::Nil => "nil".to_string(),
        other => other.to_string(),
    }
}

/// True for every spelling of nil: the `nil` symbol, `()` and `#nil`.
pub fn is_nil(value: &Value) -> bool {
    match value {
        Value::Null | Value::Nil | Value::Bool(false) => true,
        Value::Symbol(s) => &**s == "nil",
        _ => false,
    }
}

pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Extract a keyword value from a plist as text.
pub fn get_keyword(value: &Value, key: &str) -> Option<String> {
    get_value(value, key).map(atom_text)
}

pub fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// A three-number list such as `(0 700 2000)`.
pub fn triple(value: &Value) -> Option<[f64; 3]> {
    let items = list_items(value);
    if items.len() != 3 {
        return None;
    }
    Some([number(items[0])?, number(items[1])?, number(items[2])?])
}

/// Escape a string for single-line s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

pub fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

pub fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}
