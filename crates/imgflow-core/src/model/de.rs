//! 設定のデシリアライズ
//!
//! - 同じキーが繰り返された場合はエラーにせず、最後の値を採用する
//! - YAML のプレーンスカラー（`3.10`, `true`, `40.0`）は書かれた表記のまま
//!   文字列として読む。数値として解釈し直すと `3.10` が `3.1` になるため
//! - `null` は空文字列として扱う
//!
//! JSON は型付きなので、文字列以外のスカラーは拒否します。

use super::config::Config;
use super::job::Job;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};
use std::collections::BTreeMap;
use std::fmt;

/// 表記どおりの文字列（`null` は空文字列）
struct Text(String);

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Option::<RawScalar>::deserialize(deserializer)?;
        Ok(Text(text.map(|s| s.0).unwrap_or_default()))
    }
}

/// `deserialize_str` で読んだスカラー
///
/// serde_yaml はプレーンスカラーに対して元の表記を `visit_str` で渡します。
struct RawScalar(String);

impl<'de> Deserialize<'de> for RawScalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(RawScalarVisitor).map(RawScalar)
    }
}

struct RawScalarVisitor;

impl Visitor<'_> for RawScalarVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string scalar")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_unit<E: de::Error>(self) -> Result<String, E> {
        Ok(String::new())
    }
}

/// 値がスカラーのマップ（`null` なら空）
struct TextMap(BTreeMap<String, String>);

impl<'de> Deserialize<'de> for TextMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Option::<BTreeMap<String, Text>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(TextMap(map.into_iter().map(|(k, v)| (k, v.0)).collect()))
    }
}

/// スカラーのリスト（`null` なら空）
struct TextList(Vec<String>);

impl<'de> Deserialize<'de> for TextList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Option::<Vec<Text>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(TextList(items.into_iter().map(|t| t.0).collect()))
    }
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(JobVisitor)
    }
}

struct JobVisitor;

impl<'de> Visitor<'de> for JobVisitor {
    type Value = Job;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a job mapping")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Job, A::Error> {
        let mut job = Job::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "containerfile" => job.containerfile = map.next_value::<Text>()?.0,
                "build-args" => job.build_args = map.next_value::<TextMap>()?.0,
                "annotations" => job.annotations = map.next_value::<TextMap>()?.0,
                "labels" => job.labels = map.next_value::<TextMap>()?.0,
                "output-name" => job.output_name = map.next_value::<Text>()?.0,
                "output-tags" => job.output_tags = map.next_value::<TextList>()?.0,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(job)
    }
}

impl<'de> Deserialize<'de> for Config {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ConfigVisitor)
    }
}

struct ConfigVisitor;

impl<'de> Visitor<'de> for ConfigVisitor {
    type Value = Config;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping with a `jobs` list")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Config, A::Error> {
        let mut config = Config::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == "jobs" {
                config.jobs = map.next_value::<Option<Vec<Job>>>()?.unwrap_or_default();
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_scalars_keep_their_spelling() {
        let yaml = r#"
build-args:
  PYTHON: 3.10
  FEDORA: 40.0
  DEBUG: false
  COUNT: 007
  EMPTY: ~
output-tags: [1.10, 40.0, 2]
"#;
        let job: Job = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.build_args["PYTHON"], "3.10");
        assert_eq!(job.build_args["FEDORA"], "40.0");
        assert_eq!(job.build_args["DEBUG"], "false");
        assert_eq!(job.build_args["COUNT"], "007");
        assert_eq!(job.build_args["EMPTY"], "");
        assert_eq!(job.output_tags, vec!["1.10", "40.0", "2"]);
    }

    #[test]
    fn test_yaml_null_fields_are_empty() {
        let job: Job = serde_yaml::from_str("containerfile:\noutput-tags: ~\nlabels:\n").unwrap();
        assert_eq!(job.containerfile, "");
        assert!(job.output_tags.is_empty());
        assert!(job.labels.is_empty());
    }

    #[test]
    fn test_repeated_keys_take_last_value() {
        let yaml = "output-name: a/one\nlabels: {x: '1', x: '2'}\noutput-name: a/two\n";
        let job: Job = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.output_name, "a/two");
        assert_eq!(job.labels["x"], "2");

        let json = r#"{"jobs": [{"output-name": "a"}], "jobs": [{"output-name": "b"}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].output_name, "b");
    }

    #[test]
    fn test_json_rejects_non_string_scalars() {
        let result: Result<Job, _> = serde_json::from_str(r#"{"build-args": {"PYTHON": 3.10}}"#);
        let message = result.unwrap_err().to_string();
        assert!(message.contains("expected a string scalar"), "{message}");

        let job: Job = serde_json::from_str(r#"{"containerfile": null, "output-tags": ["1.10"]}"#)
            .unwrap();
        assert_eq!(job.containerfile, "");
        assert_eq!(job.output_tags, vec!["1.10"]);
    }

    #[test]
    fn test_nested_values_are_rejected() {
        assert!(serde_yaml::from_str::<Job>("labels: {a: {nested: 1}}").is_err());
        assert!(serde_yaml::from_str::<Job>("output-tags: [[a]]").is_err());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config: Config = serde_yaml::from_str("version: 2\njobs:\n  - extra: {a: 1}\n").unwrap();
        assert_eq!(config.jobs, vec![Job::default()]);
    }
}
