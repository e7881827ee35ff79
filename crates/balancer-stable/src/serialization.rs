use {
    alloy::primitives::U256,
    serde::{Deserializer, Serializer, de},
    serde_with::{DeserializeAs, SerializeAs},
    std::fmt,
};

/// Serialize [`U256`] as a decimal string and deserialize it from either a
/// decimal string or a `0x` prefixed hex string, as pool snapshots mix both.
#[derive(Debug)]
pub struct HexOrDecimalU256;

impl<'de> DeserializeAs<'de, U256> for HexOrDecimalU256 {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = U256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a u256 encoded either as 0x hex prefixed or decimal encoded string"
                )
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("0x") {
                    return Err(E::custom(format!("failed to decode {s:?} as u256: empty")));
                }
                match trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                {
                    Some(hex) => U256::from_str_radix(hex, 16).map_err(|err| {
                        E::custom(format!("failed to decode {s:?} as hex u256: {err}"))
                    }),
                    None => U256::from_str_radix(trimmed, 10).map_err(|err| {
                        E::custom(format!("failed to decode {s:?} as decimal u256: {err}"))
                    }),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(U256::from(v))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

impl SerializeAs<U256> for HexOrDecimalU256 {
    fn serialize_as<S: Serializer>(source: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        serde::{Deserialize, Serialize},
        serde_json::json,
        serde_with::serde_as,
    };

    #[serde_as]
    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Wrapper {
        #[serde_as(as = "HexOrDecimalU256")]
        value: U256,
        #[serde_as(as = "Option<HexOrDecimalU256>")]
        optional: Option<U256>,
    }

    #[test]
    fn deserializes_hex_and_decimal() {
        let hex: Wrapper =
            serde_json::from_value(json!({ "value": "0x1388", "optional": null })).unwrap();
        assert_eq!(hex.value, U256::from(5000));
        assert_eq!(hex.optional, None);

        let decimal: Wrapper =
            serde_json::from_value(json!({ "value": "5000", "optional": "0xFFB10F9BCF7D41A" }))
                .unwrap();
        assert_eq!(decimal.value, U256::from(5000));
        assert_eq!(
            decimal.optional,
            Some(U256::from(1_151_532_794_526_553_114_u64))
        );

        let number: Wrapper =
            serde_json::from_value(json!({ "value": 42, "optional": null })).unwrap();
        assert_eq!(number.value, U256::from(42));
    }

    #[test]
    fn rejects_garbage() {
        for value in ["0xzz", "12a", "-1", ""] {
            assert!(
                serde_json::from_value::<Wrapper>(json!({ "value": value, "optional": null }))
                    .is_err(),
                "{value:?}"
            );
        }
    }

    #[test]
    fn serializes_as_decimal() {
        let wrapper = Wrapper {
            value: U256::from(0x1388),
            optional: None,
        };
        assert_eq!(
            serde_json::to_value(&wrapper).unwrap(),
            json!({ "value": "5000", "optional": null })
        );
    }
}
