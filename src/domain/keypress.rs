//! Keypress records.

use crate::anon::{AnonError, Anonymize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::record! {
    /// One key press as reported by the capture layer.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct KeypressData as "keypresses" {
        pub key: String => "TEXT NOT NULL",
        pub timestamp: DateTime<Utc> => "DATETIME NOT NULL",
    }
}

crate::record! {
    /// Number of key presses in one interval. Carries no key content.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct KeypressAnonymousStats as "keypresses_anonymous" {
        pub timestamp: DateTime<Utc> => "DATETIME NOT NULL",
        pub keypresses_count: i64 => "INTEGER NOT NULL",
    }
}

impl KeypressData {
    /// A key press captured now.
    pub fn new(key: impl Into<String>) -> Self {
        Self::at(key, Utc::now())
    }

    pub fn at(key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    /// A key press captured now, named from a macOS virtual keycode.
    pub fn from_keycode(keycode: i64) -> Self {
        Self::new(key_name(keycode))
    }
}

impl Anonymize<KeypressAnonymousStats> for KeypressData {
    fn anonymize(
        records: &[Self],
        interval_start: DateTime<Utc>,
    ) -> Result<Vec<KeypressAnonymousStats>, AnonError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![KeypressAnonymousStats {
            timestamp: interval_start,
            keypresses_count: records.len() as i64,
        }])
    }
}

/// Name of a macOS virtual keycode (Swedish ISO layout); `key_<n>` when unknown.
pub fn key_name(keycode: i64) -> String {
    let name = match keycode {
        0 => "a",
        1 => "s",
        2 => "d",
        3 => "f",
        4 => "h",
        5 => "g",
        6 => "z",
        7 => "x",
        8 => "c",
        9 => "v",
        10 => "§",
        11 => "b",
        12 => "q",
        13 => "w",
        14 => "e",
        15 => "r",
        16 => "y",
        17 => "t",
        18 => "1",
        19 => "2",
        20 => "3",
        21 => "4",
        22 => "6",
        23 => "5",
        24 => "´",
        25 => "9",
        26 => "7",
        27 => "+",
        28 => "8",
        29 => "0",
        30 => "¨",
        31 => "o",
        32 => "u",
        33 => "å",
        34 => "i",
        35 => "p",
        36 => "return",
        37 => "l",
        38 => "j",
        39 => "ä",
        40 => "k",
        41 => "ö",
        42 => "'",
        43 => ",",
        44 => "-",
        45 => "n",
        46 => "m",
        47 => ".",
        48 => "tab",
        49 => "space",
        50 => "<",
        51 => "delete",
        53 => "escape",
        55 => "command",
        56 => "shift",
        57 => "capslock",
        58 => "option",
        59 => "control",
        60 => "right_shift",
        61 => "right_option",
        62 => "right_control",
        63 => "fn",
        64 => "f17",
        65 => "keypad_decimal",
        67 => "keypad_multiply",
        69 => "keypad_plus",
        71 => "keypad_clear",
        75 => "keypad_divide",
        76 => "keypad_enter",
        78 => "keypad_minus",
        79 => "f18",
        80 => "f19",
        81 => "keypad_equals",
        82 => "keypad_0",
        83 => "keypad_1",
        84 => "keypad_2",
        85 => "keypad_3",
        86 => "keypad_4",
        87 => "keypad_5",
        88 => "keypad_6",
        89 => "keypad_7",
        91 => "keypad_8",
        92 => "keypad_9",
        96 => "f5",
        97 => "f6",
        98 => "f7",
        99 => "f3",
        100 => "f8",
        101 => "f9",
        102 => "f11",
        103 => "f13",
        104 => "f16",
        105 => "f14",
        106 => "f10",
        107 => "f12",
        108 => "f15",
        109 => "f4",
        110 => "f2",
        111 => "f1",
        114 => "help",
        115 => "home",
        116 => "page_up",
        117 => "forward_delete",
        118 => "f4",
        119 => "end",
        120 => "f2",
        121 => "page_down",
        122 => "f1",
        123 => "left_arrow",
        124 => "right_arrow",
        125 => "down_arrow",
        126 => "up_arrow",
        _ => return format!("key_{keycode}"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use chrono::TimeZone;

    #[test]
    fn test_key_names() {
        assert_eq!(key_name(0), "a");
        assert_eq!(key_name(49), "space");
        assert_eq!(key_name(126), "up_arrow");
        assert_eq!(key_name(52), "key_52");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(KeypressData::table_name(), "keypresses");
        assert_eq!(KeypressAnonymousStats::table_name(), "keypresses_anonymous");
    }

    #[test]
    fn test_anonymize_counts_and_pins_timestamp() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let records = vec![
            KeypressData::at("a", start + chrono::Duration::seconds(3)),
            KeypressData::at("b", start + chrono::Duration::seconds(7)),
            KeypressData::at("a", start + chrono::Duration::seconds(9)),
        ];

        let stats = KeypressData::anonymize(&records, start).unwrap();
        assert_eq!(
            stats,
            vec![KeypressAnonymousStats {
                timestamp: start,
                keypresses_count: 3,
            }]
        );
    }

    #[test]
    fn test_anonymize_empty_batch() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert!(KeypressData::anonymize(&[], start).unwrap().is_empty());
    }
}
