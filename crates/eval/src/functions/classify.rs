//! Product classification from a product code and item metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductType {
    Digital,
    Printed,
    FlashCard,
    Pbor,
    Tutorial,
    Marking,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Digital => "Digital",
            ProductType::Printed => "Printed",
            ProductType::FlashCard => "FlashCard",
            ProductType::Pbor => "PBOR",
            ProductType::Tutorial => "Tutorial",
            ProductType::Marking => "Marking",
        }
    }

    pub const ALL: [ProductType; 6] = [
        ProductType::Digital,
        ProductType::Printed,
        ProductType::FlashCard,
        ProductType::Pbor,
        ProductType::Tutorial,
        ProductType::Marking,
    ];
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown product type '{}'", s))
    }
}

/// Boolean traits derived for one product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_digital: bool,
    pub is_ebook: bool,
    pub is_printed: bool,
    pub is_material: bool,
    pub is_flash_card: bool,
    pub is_pbor: bool,
    pub is_tutorial: bool,
    pub is_live_tutorial: bool,
    pub is_marking: bool,
}

impl Classification {
    /// The single product type used by the VAT rules. Services win over
    /// materials; an unrecognised product is treated as digital.
    pub fn product_type(&self) -> ProductType {
        if self.is_marking {
            ProductType::Marking
        } else if self.is_tutorial {
            ProductType::Tutorial
        } else if self.is_flash_card {
            ProductType::FlashCard
        } else if self.is_pbor {
            ProductType::Pbor
        } else if self.is_printed {
            ProductType::Printed
        } else {
            ProductType::Digital
        }
    }

    pub fn to_value(&self) -> Value {
        let fields = [
            ("is_digital", self.is_digital),
            ("is_ebook", self.is_ebook),
            ("is_printed", self.is_printed),
            ("is_material", self.is_material),
            ("is_flash_card", self.is_flash_card),
            ("is_pbor", self.is_pbor),
            ("is_tutorial", self.is_tutorial),
            ("is_live_tutorial", self.is_live_tutorial),
            ("is_marking", self.is_marking),
        ];
        Value::Map(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::Bool(v)))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    /// Read a classification back from a context value; missing traits are false.
    pub fn from_value(v: &Value) -> Classification {
        let flag = |key: &str| {
            v.get_path(key)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        Classification {
            is_digital: flag("is_digital"),
            is_ebook: flag("is_ebook"),
            is_printed: flag("is_printed"),
            is_material: flag("is_material"),
            is_flash_card: flag("is_flash_card"),
            is_pbor: flag("is_pbor"),
            is_tutorial: flag("is_tutorial"),
            is_live_tutorial: flag("is_live_tutorial"),
            is_marking: flag("is_marking"),
        }
    }

    fn for_type(product_type: ProductType) -> Classification {
        let mut c = Classification::default();
        match product_type {
            ProductType::Digital => c.is_digital = true,
            ProductType::Printed => c.is_printed = true,
            ProductType::FlashCard => {
                c.is_flash_card = true;
                c.is_printed = true;
            }
            ProductType::Pbor => {
                c.is_pbor = true;
                c.is_printed = true;
            }
            ProductType::Tutorial => c.is_tutorial = true,
            ProductType::Marking => c.is_marking = true,
        }
        c.is_material = !(c.is_tutorial || c.is_marking);
        c
    }
}

fn meta_str<'a>(metadata: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| metadata.get_path(k).and_then(Value::as_str))
}

fn meta_flag(metadata: &Value, key: &str) -> bool {
    metadata
        .get_path(key)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Derive a classification.
///
/// An explicit `product_type`/`productType` in the metadata wins. Otherwise
/// traits come from the `variationType` and the tokens of the product code
/// (split on any non-alphanumeric character).
pub fn classify(product_code: Option<&str>, metadata: &Value) -> Classification {
    if let Some(explicit) = meta_str(metadata, &["product_type", "productType"]) {
        if let Ok(pt) = explicit.parse::<ProductType>() {
            let mut c = Classification::for_type(pt);
            let variation = meta_str(metadata, &["variationType", "variation_type"])
                .unwrap_or("")
                .to_ascii_lowercase();
            c.is_ebook = pt == ProductType::Digital && variation.contains("ebook");
            c.is_live_tutorial = pt == ProductType::Tutorial
                && (variation.contains("live") || meta_flag(metadata, "is_live"));
            return c;
        }
    }

    let code = product_code.unwrap_or("").to_ascii_lowercase();
    let tokens: Vec<&str> = code
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has_token = |t: &str| tokens.contains(&t);
    let variation = meta_str(metadata, &["variationType", "variation_type"])
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut c = Classification {
        is_marking: meta_flag(metadata, "is_marking")
            || variation.contains("marking")
            || has_token("marking")
            || has_token("mk"),
        is_tutorial: meta_flag(metadata, "is_tutorial")
            || variation.contains("tutorial")
            || has_token("tutorial")
            || has_token("tut"),
        is_flash_card: variation.contains("flash")
            || has_token("fc")
            || has_token("flashcard")
            || has_token("flashcards"),
        is_pbor: variation.contains("pbor") || has_token("pbor"),
        is_ebook: variation.contains("ebook") || has_token("ebook") || has_token("eb"),
        ..Classification::default()
    };
    c.is_live_tutorial = c.is_tutorial
        && (variation.contains("live") || has_token("live") || meta_flag(metadata, "is_live"));
    c.is_printed = c.is_flash_card
        || c.is_pbor
        || variation.contains("printed")
        || has_token("printed")
        || has_token("p");
    c.is_digital = !c.is_printed
        && (c.is_ebook
            || variation.contains("hub")
            || variation.contains("online")
            || variation.contains("digital")
            || has_token("hub")
            || has_token("online"));
    c.is_material = !(c.is_tutorial || c.is_marking);
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(j: serde_json::Value) -> Value {
        Value::from_json(&j)
    }

    #[test]
    fn explicit_product_type_wins() {
        let c = classify(Some("CM2/PC/P"), &meta(json!({"product_type": "Digital", "variationType": "eBook"})));
        assert_eq!(c.product_type(), ProductType::Digital);
        assert!(c.is_digital && c.is_ebook && c.is_material);

        let c = classify(None, &meta(json!({"productType": "pbor"})));
        assert_eq!(c.product_type(), ProductType::Pbor);
    }

    #[test]
    fn variation_type_drives_traits() {
        let c = classify(Some("CB1"), &meta(json!({"variationType": "eBook"})));
        assert_eq!(c.product_type(), ProductType::Digital);
        assert!(c.is_ebook);

        let c = classify(Some("CB1"), &meta(json!({"variationType": "Printed"})));
        assert_eq!(c.product_type(), ProductType::Printed);
        assert!(c.is_material && !c.is_digital);

        let c = classify(Some("CB1"), &meta(json!({"variationType": "Live Tutorial"})));
        assert_eq!(c.product_type(), ProductType::Tutorial);
        assert!(c.is_live_tutorial && !c.is_material);
    }

    #[test]
    fn code_tokens_drive_traits() {
        assert_eq!(classify(Some("CM2/FC"), &Value::Null).product_type(), ProductType::FlashCard);
        assert_eq!(classify(Some("SA1-PBOR"), &Value::Null).product_type(), ProductType::Pbor);
        assert_eq!(classify(Some("CP1_MK"), &Value::Null).product_type(), ProductType::Marking);
        // Substrings inside a token do not count.
        assert_eq!(classify(Some("FCX1"), &Value::Null).product_type(), ProductType::Digital);
    }

    #[test]
    fn unknown_product_defaults_to_digital() {
        let c = classify(None, &Value::Null);
        assert_eq!(c.product_type(), ProductType::Digital);
    }

    #[test]
    fn value_round_trip() {
        let c = classify(Some("CM2/FC"), &Value::Null);
        assert_eq!(Classification::from_value(&c.to_value()), c);
    }
}
