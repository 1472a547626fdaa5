//! テンプレート関数レジストリ
//!
//! テンプレートから呼び出せる関数の閉じた集合を定義します。
//! レジストリは値として構築され、[`TemplateProcessor`](super::TemplateProcessor)
//! に渡されます。`osRelease` のようなホスト依存の関数は
//! [`FunctionRegistry::insert`] で後から注入します。
//!
//! Teraの関数はキーワード引数のみを受け取るため、可変長引数は
//! `items` 配列として渡します。
//!
//! ```text
//! {{ nowTag() }}
//! {{ replace(old="/", new="-", s=output_name) }}
//! {{ join(sep=".", items=["a", "b"]) }}
//! ```

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tera::{Function, Tera};

type Args = HashMap<String, Value>;

/// 登録済みのテンプレート関数
pub type TemplateFunction = Arc<dyn Function>;

/// テンプレート関数の集合
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, TemplateFunction>,
}

impl FunctionRegistry {
    /// 関数を1つも持たないレジストリ
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// 組み込み関数を持つレジストリ（`nowTag` は現在のUTC日付）
    pub fn builtin() -> Self {
        Self::with_date(Utc::now().date_naive())
    }

    /// `nowTag` の日付を固定して組み込み関数を登録
    ///
    /// 日付はレジストリ構築時に一度だけ決まるため、同じ実行内の
    /// すべてのテンプレートで `nowTag` は同じ値になります。
    pub fn with_date(date: NaiveDate) -> Self {
        let mut registry = Self::empty();
        registry
            .insert("nowTag", NowTag::new(date))
            .insert("json", json)
            .insert("uuid", uuid)
            .insert("sha256", sha256)
            .insert("replaceRe", replace_re)
            .insert("replace", replace)
            .insert("sort", sort)
            .insert("join", join)
            .insert("split", split)
            .insert("splitN", split_n)
            .insert("startsWith", starts_with)
            .insert("endsWith", ends_with)
            .insert("contains", contains)
            .insert("lower", lower)
            .insert("upper", upper)
            .insert("title", title)
            .insert("chomp", chomp)
            .insert("slice", slice)
            .insert("dict", dict)
            .insert("index", index)
            .insert("default", default)
            .insert("fields", fields)
            .insert("readKeyVal", read_key_val)
            .insert("first", first)
            .insert("last", last)
            .insert("append", append);
        registry
    }

    /// 関数を追加（同名の関数は置き換え）
    pub fn insert<F: Function + 'static>(&mut self, name: impl Into<String>, function: F) -> &mut Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// 関数を追加したレジストリを返す
    pub fn with_function<F: Function + 'static>(mut self, name: impl Into<String>, function: F) -> Self {
        self.insert(name, function);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// 登録済みの関数名（辞書順）
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Teraインスタンスに全関数を登録
    pub fn install(&self, tera: &mut Tera) {
        for (name, function) in &self.functions {
            let function = Arc::clone(function);
            tera.register_function(name, move |args: &Args| function.call(args));
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// `nowTag()`: `YYYYMMDD` 形式の日付
struct NowTag {
    tag: String,
}

impl NowTag {
    fn new(date: NaiveDate) -> Self {
        Self {
            tag: date.format("%Y%m%d").to_string(),
        }
    }
}

impl Function for NowTag {
    fn call(&self, _args: &Args) -> tera::Result<Value> {
        Ok(Value::String(self.tag.clone()))
    }
}

// 引数の取り出し

fn required<'a>(function: &str, args: &'a Args, key: &str) -> tera::Result<&'a Value> {
    args.get(key).ok_or_else(|| {
        tera::Error::msg(format!(
            "Function `{}` requires the `{}` argument",
            function, key
        ))
    })
}

fn string_arg(function: &str, args: &Args, key: &str) -> tera::Result<String> {
    match required(function, args, key)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(tera::Error::msg(format!(
            "Function `{}`: `{}` must be a string, got {}",
            function, key, other
        ))),
    }
}

fn int_arg(function: &str, args: &Args, key: &str) -> tera::Result<i64> {
    required(function, args, key)?.as_i64().ok_or_else(|| {
        tera::Error::msg(format!(
            "Function `{}`: `{}` must be an integer",
            function, key
        ))
    })
}

fn array_arg(function: &str, args: &Args, key: &str) -> tera::Result<Vec<Value>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(tera::Error::msg(format!(
            "Function `{}`: `{}` must be an array, got {}",
            function, key, other
        ))),
    }
}

fn string_items(function: &str, args: &Args, key: &str) -> tera::Result<Vec<String>> {
    array_arg(function, args, key)?
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(tera::Error::msg(format!(
                "Function `{}`: `{}` must only contain scalars, got {}",
                function, key, other
            ))),
        })
        .collect()
}

fn strings(items: Vec<String>) -> Value {
    Value::Array(items.into_iter().map(Value::String).collect())
}

/// マップのキーに使う文字列表現
fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json(args: &Args) -> tera::Result<Value> {
    let value = args.get("value").unwrap_or(&Value::Null);
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("Function `json`: {}", e)))
}

fn uuid(_args: &Args) -> tera::Result<Value> {
    Ok(Value::String(::uuid::Uuid::new_v4().to_string()))
}

fn sha256(args: &Args) -> tera::Result<Value> {
    let s = string_arg("sha256", args, "s")?;
    Ok(Value::String(format!("{:x}", Sha256::digest(s.as_bytes()))))
}

fn replace_re(args: &Args) -> tera::Result<Value> {
    let pattern = string_arg("replaceRe", args, "pattern")?;
    let new = string_arg("replaceRe", args, "new")?;
    let s = string_arg("replaceRe", args, "s")?;

    let re = Regex::new(&pattern).map_err(|e| {
        tera::Error::msg(format!("Function `replaceRe`: invalid pattern: {}", e))
    })?;
    Ok(Value::String(re.replace_all(&s, new.as_str()).into_owned()))
}

fn replace(args: &Args) -> tera::Result<Value> {
    let old = string_arg("replace", args, "old")?;
    let new = string_arg("replace", args, "new")?;
    let s = string_arg("replace", args, "s")?;
    Ok(Value::String(s.replace(&old, &new)))
}

fn sort(args: &Args) -> tera::Result<Value> {
    let mut items = string_items("sort", args, "items")?;
    items.sort();
    Ok(strings(items))
}

fn join(args: &Args) -> tera::Result<Value> {
    let sep = string_arg("join", args, "sep")?;
    let items = string_items("join", args, "items")?;
    Ok(Value::String(items.join(&sep)))
}

fn split(args: &Args) -> tera::Result<Value> {
    let sep = string_arg("split", args, "sep")?;
    let s = string_arg("split", args, "s")?;
    Ok(strings(s.split(sep.as_str()).map(str::to_string).collect()))
}

/// n > 0 なら最大 n 個、n == 0 なら空、n < 0 なら全て
fn split_n(args: &Args) -> tera::Result<Value> {
    let sep = string_arg("splitN", args, "sep")?;
    let n = int_arg("splitN", args, "n")?;
    let s = string_arg("splitN", args, "s")?;

    let pieces: Vec<String> = match n {
        0 => Vec::new(),
        n if n < 0 => s.split(sep.as_str()).map(str::to_string).collect(),
        n => s
            .splitn(n as usize, sep.as_str())
            .map(str::to_string)
            .collect(),
    };
    Ok(strings(pieces))
}

fn starts_with(args: &Args) -> tera::Result<Value> {
    let prefix = string_arg("startsWith", args, "prefix")?;
    let s = string_arg("startsWith", args, "s")?;
    Ok(Value::Bool(s.starts_with(&prefix)))
}

fn ends_with(args: &Args) -> tera::Result<Value> {
    let suffix = string_arg("endsWith", args, "suffix")?;
    let s = string_arg("endsWith", args, "s")?;
    Ok(Value::Bool(s.ends_with(&suffix)))
}

fn contains(args: &Args) -> tera::Result<Value> {
    let substr = string_arg("contains", args, "substr")?;
    let s = string_arg("contains", args, "s")?;
    Ok(Value::Bool(s.contains(&substr)))
}

fn lower(args: &Args) -> tera::Result<Value> {
    Ok(Value::String(string_arg("lower", args, "s")?.to_lowercase()))
}

fn upper(args: &Args) -> tera::Result<Value> {
    Ok(Value::String(string_arg("upper", args, "s")?.to_uppercase()))
}

/// 先頭の1文字だけを大文字化
fn title(args: &Args) -> tera::Result<Value> {
    let s = string_arg("title", args, "s")?;
    let mut chars = s.chars();
    let titled = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    Ok(Value::String(titled))
}

fn chomp(args: &Args) -> tera::Result<Value> {
    let s = string_arg("chomp", args, "s")?;
    Ok(Value::String(s.trim_end_matches(['\r', '\n']).to_string()))
}

fn slice(args: &Args) -> tera::Result<Value> {
    Ok(Value::Array(array_arg("slice", args, "items")?))
}

/// `[k1, v1, k2, v2, ...]` からマップを作る
fn dict(args: &Args) -> tera::Result<Value> {
    let items = array_arg("dict", args, "items")?;
    if items.len() % 2 != 0 {
        return Err(tera::Error::msg(format!(
            "Function `dict` requires an even number of items, got {}",
            items.len()
        )));
    }

    let mut map = Map::new();
    for pair in items.chunks(2) {
        map.insert(key_string(&pair[0]), pair[1].clone());
    }
    Ok(Value::Object(map))
}

fn index(args: &Args) -> tera::Result<Value> {
    let i = int_arg("index", args, "i")?;
    let items = array_arg("index", args, "items")?;

    usize::try_from(i)
        .ok()
        .and_then(|i| items.get(i).cloned())
        .ok_or_else(|| {
            tera::Error::msg(format!(
                "Function `index`: index out of range: {} (len {})",
                i,
                items.len()
            ))
        })
}

/// 型ごとのゼロ値（null, 空文字列, 0）
fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn default(args: &Args) -> tera::Result<Value> {
    let fallback = required("default", args, "fallback")?;
    match args.get("value") {
        Some(value) if !is_zero(value) => Ok(value.clone()),
        _ => Ok(fallback.clone()),
    }
}

/// `key=value` を最初の区切りで分割して単一エントリのマップにする
fn fields(args: &Args) -> tera::Result<Value> {
    let s = string_arg("fields", args, "s")?;
    let sep = match args.get("sep") {
        Some(_) => string_arg("fields", args, "sep")?,
        None => "=".to_string(),
    };

    let (key, value) = s.split_once(sep.as_str()).unwrap_or((s.as_str(), ""));
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value.to_string()));
    Ok(Value::Object(map))
}

/// `key=value` の並びから key の値を引く（後勝ち、無ければ空文字列）
fn read_key_val(args: &Args) -> tera::Result<Value> {
    let key = string_arg("readKeyVal", args, "key")?;
    let items = string_items("readKeyVal", args, "items")?;

    let value = items
        .iter()
        .filter_map(|item| item.split_once('='))
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v)
        .next_back()
        .unwrap_or("");
    Ok(Value::String(value.to_string()))
}

fn first(args: &Args) -> tera::Result<Value> {
    let s = string_arg("first", args, "s")?;
    let key = s.split_once('=').map(|(k, _)| k).unwrap_or(s.as_str());
    Ok(Value::String(key.to_string()))
}

fn last(args: &Args) -> tera::Result<Value> {
    let s = string_arg("last", args, "s")?;
    s.split_once('=')
        .map(|(_, v)| Value::String(v.to_string()))
        .ok_or_else(|| {
            tera::Error::msg(format!(
                "Function `last`: `{}` is not a key=value string",
                s
            ))
        })
}

fn append(args: &Args) -> tera::Result<Value> {
    let mut items = array_arg("append", args, "items")?;
    if let Some(value) = args.get("value") {
        items.push(value.clone());
    }
    items.extend(array_arg("append", args, "values")?);
    Ok(Value::Array(items))
}
