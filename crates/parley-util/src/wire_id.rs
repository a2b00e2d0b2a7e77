//! Serializes `i64` snowflake ids as decimal strings on the wire, matching
//! the teacher gateway's `id.to_string()` convention (`paracord-ws::handler`)
//! so JS clients never lose precision to 53-bit float truncation. The typed
//! `ClientMessage`/`ServerMessage` enums use `#[serde(with = "...")]` where
//! the teacher's `json!` macros just call `.to_string()` inline.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(id: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(id)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse::<i64>().map_err(D::Error::custom)
}

pub mod option {
    use super::*;

    pub fn serialize<S>(id: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match id {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        opt.map(|s| s.parse::<i64>().map_err(D::Error::custom)).transpose()
    }
}

pub mod vec {
    use super::*;

    pub fn serialize<S>(ids: &[i64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(ids.len()))?;
        for id in ids {
            seq.serialize_element(&id.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse::<i64>().map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::wire_id")]
        id: i64,
        #[serde(with = "crate::wire_id::option")]
        parent_id: Option<i64>,
        #[serde(with = "crate::wire_id::vec")]
        member_ids: Vec<i64>,
    }

    #[test]
    fn round_trips_through_decimal_strings() {
        let w = Wrapper {
            id: 123456789012345,
            parent_id: Some(42),
            member_ids: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["id"], serde_json::json!("123456789012345"));
        assert_eq!(json["parent_id"], serde_json::json!("42"));
        assert_eq!(json["member_ids"], serde_json::json!(["1", "2", "3"]));

        let back: Wrapper = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, w.id);
        assert_eq!(back.parent_id, w.parent_id);
        assert_eq!(back.member_ids, w.member_ids);
    }

    #[test]
    fn option_none_serializes_as_null() {
        let w = Wrapper {
            id: 1,
            parent_id: None,
            member_ids: vec![],
        };
        let json = serde_json::to_value(&w).unwrap();
        assert!(json["parent_id"].is_null());
    }
}
