use serde::{Deserialize, Deserializer};

/// 空字符串视为未填写
pub fn deserialize_empty_to_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(de)?;
    Ok(value.and_then(|v| op::ternary!(v.trim().is_empty() => None; Some(v))))
}

/// MySQL 的 TINYINT 与内存存储的 bool 都能读取
pub fn deserialize_flexible_bool<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(de)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// 数字列可能以字符串形式传入
pub fn deserialize_flexible_f64<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        F(f64),
        S(String),
    }
    match Num::deserialize(de)? {
        Num::F(f) => Ok(f),
        Num::S(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct Form {
        #[serde(default, deserialize_with = "deserialize_empty_to_none")]
        remark: Option<String>,
        #[serde(deserialize_with = "deserialize_flexible_bool")]
        active: bool,
        #[serde(deserialize_with = "deserialize_flexible_f64")]
        price: f64,
    }

    #[test]
    fn loose_inputs_are_normalized() {
        let f: Form = serde_json::from_value(json!({"remark": " ", "active": 1, "price": "12.5"})).unwrap();
        assert!(f.remark.is_none());
        assert!(f.active);
        assert_eq!(f.price, 12.5);
        let f: Form = serde_json::from_value(json!({"active": false, "price": 3})).unwrap();
        assert!(f.remark.is_none());
        assert!(!f.active);
    }
}
