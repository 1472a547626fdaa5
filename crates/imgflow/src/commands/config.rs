use super::{ConfigArgs, load_conf};

/// 正規形の設定を標準出力へ
pub fn handle(args: &ConfigArgs, pretty: bool) -> anyhow::Result<()> {
    let (_, conf) = load_conf(args)?;

    if pretty {
        let value: serde_json::Value = serde_json::from_str(&conf)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", conf);
    }
    Ok(())
}
