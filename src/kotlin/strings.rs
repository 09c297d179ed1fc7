//! The string table of a metadata document.
//!
//! Strings referenced from the protobuf messages are indices into a table made of the `d2`
//! array and a list of [`Record`]s describing how to derive each entry: take a predefined
//! string or an inline one, cut a substring, replace a character and finally convert
//! between JVM internal names and Kotlin class ids.

use std::collections::HashSet;

/// Strings shared by every metadata document, selected by [`Record::predefined_index`].
pub const PREDEFINED_STRINGS: [&str; 44] = [
    "kotlin/Any",
    "kotlin/Nothing",
    "kotlin/Unit",
    "kotlin/Throwable",
    "kotlin/Number",
    "kotlin/Byte",
    "kotlin/Double",
    "kotlin/Float",
    "kotlin/Int",
    "kotlin/Long",
    "kotlin/Short",
    "kotlin/Boolean",
    "kotlin/Char",
    "kotlin/CharSequence",
    "kotlin/String",
    "kotlin/Comparable",
    "kotlin/Enum",
    "kotlin/Array",
    "kotlin/ByteArray",
    "kotlin/DoubleArray",
    "kotlin/FloatArray",
    "kotlin/IntArray",
    "kotlin/LongArray",
    "kotlin/ShortArray",
    "kotlin/BooleanArray",
    "kotlin/CharArray",
    "kotlin/Cloneable",
    "kotlin/Annotation",
    "kotlin/collections/Iterable",
    "kotlin/collections/MutableIterable",
    "kotlin/collections/Collection",
    "kotlin/collections/MutableCollection",
    "kotlin/collections/List",
    "kotlin/collections/MutableList",
    "kotlin/collections/Set",
    "kotlin/collections/MutableSet",
    "kotlin/collections/Map",
    "kotlin/collections/MutableMap",
    "kotlin/collections/Map.Entry",
    "kotlin/collections/MutableMap.MutableEntry",
    "kotlin/collections/Iterator",
    "kotlin/collections/MutableIterator",
    "kotlin/collections/ListIterator",
    "kotlin/collections/MutableListIterator",
];

/// Header of the string table, stored length-delimited at the start of `d1`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct StringTableTypes {
    /// Records covering the `d2` strings in order
    #[prost(message, repeated, tag = "1")]
    pub record: Vec<Record>,
    /// Indices of names that are local, not qualified
    #[prost(int32, repeated, tag = "5")]
    pub local_name: Vec<i32>,
}

/// Describes how to derive a run of string table entries.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Record {
    /// Number of consecutive entries sharing this record, 1 when absent.
    #[prost(int32, optional, tag = "1")]
    pub range: Option<i32>,
    /// Index into the predefined strings, replacing the `d2` entry
    #[prost(int32, optional, tag = "2")]
    pub predefined_index: Option<i32>,
    /// Literal replacing the `d2` entry
    #[prost(string, optional, tag = "6")]
    pub string: Option<String>,
    /// An [`Operation`] value
    #[prost(enumeration = "Operation", optional, tag = "3")]
    pub operation: Option<i32>,
    /// Begin and end of a substring to take
    #[prost(int32, repeated, tag = "4")]
    pub substring_index: Vec<i32>,
    /// Pair of characters, the first replaced by the second
    #[prost(int32, repeated, tag = "5")]
    pub replace_char: Vec<i32>,
}

/// Final conversion applied to a string table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Operation {
    /// Leave the entry as is
    None = 0,
    /// `$` becomes `.`
    InternalToClassId = 1,
    /// Strip `L` and `;`, then `$` becomes `.`
    DescToClassId = 2,
}

/// Resolves string table indices to strings.
pub struct NameResolver<'a> {
    strings: &'a [String],
    records: Vec<&'a Record>,
    local_names: HashSet<i32>,
}

impl<'a> NameResolver<'a> {
    /// Expand the record ranges of `types` over the `d2` strings.
    #[must_use]
    pub fn new(types: &'a StringTableTypes, strings: &'a [String]) -> Self {
        let mut records = Vec::with_capacity(strings.len());
        for record in &types.record {
            let range = usize::try_from(record.range.unwrap_or(1)).unwrap_or(0);
            records.extend(std::iter::repeat(record).take(range));
        }

        NameResolver {
            strings,
            records,
            local_names: types.local_name.iter().copied().collect(),
        }
    }

    /// Resolve the string at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is outside both the records and the
    /// `d2` strings.
    pub fn string(&self, index: i32) -> crate::Result<String> {
        let slot = usize::try_from(index)
            .map_err(|_| malformed_error!("Negative string table index {}", index))?;

        let Some(record) = self.records.get(slot) else {
            return self
                .strings
                .get(slot)
                .cloned()
                .ok_or_else(|| malformed_error!("String table index {} out of range", index));
        };

        let predefined = record
            .predefined_index
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| PREDEFINED_STRINGS.get(i));
        let mut string = if let Some(string) = &record.string {
            string.clone()
        } else if let Some(predefined) = predefined {
            (*predefined).to_string()
        } else {
            self.strings
                .get(slot)
                .cloned()
                .ok_or_else(|| malformed_error!("String table index {} out of range", index))?
        };

        if let [begin, end, ..] = record.substring_index[..] {
            let len = string.chars().count() as i32;
            if 0 <= begin && begin <= end && end <= len {
                string = string
                    .chars()
                    .skip(begin as usize)
                    .take((end - begin) as usize)
                    .collect();
            }
        }

        if let [from, to, ..] = record.replace_char[..] {
            let from = u32::try_from(from).ok().and_then(char::from_u32);
            let to = u32::try_from(to).ok().and_then(char::from_u32);
            if let (Some(from), Some(to)) = (from, to) {
                string = string.replace(from, &to.to_string());
            }
        }

        match Operation::try_from(record.operation.unwrap_or(0)).unwrap_or(Operation::None) {
            Operation::None => {}
            Operation::InternalToClassId => string = string.replace('$', "."),
            Operation::DescToClassId => {
                if string.chars().count() >= 2 {
                    let mut chars = string.chars();
                    chars.next();
                    chars.next_back();
                    string = chars.collect();
                }
                string = string.replace('$', ".");
            }
        }

        Ok(string)
    }

    /// Resolve a class id, e.g. `kotlin/collections/Map.Entry`.
    ///
    /// # Errors
    /// See [`NameResolver::string`].
    pub fn qualified_class_name(&self, index: i32) -> crate::Result<String> {
        self.string(index)
    }

    /// Returns `true` if the class at `index` is local to a function body.
    #[must_use]
    pub fn is_local_class_name(&self, index: i32) -> bool {
        self.local_names.contains(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            range: None,
            predefined_index: None,
            string: None,
            operation: None,
            substring_index: Vec::new(),
            replace_char: Vec::new(),
        }
    }

    #[test]
    fn test_plain_strings() {
        let strings = vec!["foo".to_string(), "bar".to_string()];
        let types = StringTableTypes::default();
        let resolver = NameResolver::new(&types, &strings);
        assert_eq!(resolver.string(1).unwrap(), "bar");
        assert!(resolver.string(2).is_err());
        assert!(resolver.string(-1).is_err());
    }

    #[test]
    fn test_ranges_and_operations() {
        let strings = vec![
            "com/example/Outer$Inner".to_string(),
            "Lcom/example/Outer$Inner;".to_string(),
            String::new(),
            "com_example".to_string(),
        ];
        let types = StringTableTypes {
            record: vec![
                Record {
                    operation: Some(Operation::InternalToClassId as i32),
                    ..record()
                },
                Record {
                    operation: Some(Operation::DescToClassId as i32),
                    ..record()
                },
                Record {
                    predefined_index: Some(38),
                    ..record()
                },
                Record {
                    replace_char: vec!['_' as i32, '/' as i32],
                    substring_index: vec![0, 7],
                    ..record()
                },
            ],
            local_name: vec![0],
        };
        let resolver = NameResolver::new(&types, &strings);
        assert_eq!(resolver.string(0).unwrap(), "com/example/Outer.Inner");
        assert_eq!(resolver.string(1).unwrap(), "com/example/Outer.Inner");
        assert_eq!(resolver.string(2).unwrap(), "kotlin/collections/Map.Entry");
        assert_eq!(resolver.string(3).unwrap(), "com/exa");
        assert!(resolver.is_local_class_name(0));
        assert!(!resolver.is_local_class_name(1));
    }

    #[test]
    fn test_record_range() {
        let strings = vec!["a$b".to_string(), "c$d".to_string(), "e$f".to_string()];
        let types = StringTableTypes {
            record: vec![
                Record {
                    range: Some(2),
                    operation: Some(Operation::InternalToClassId as i32),
                    ..record()
                },
                Record {
                    string: Some("inline".to_string()),
                    ..record()
                },
            ],
            local_name: Vec::new(),
        };
        let resolver = NameResolver::new(&types, &strings);
        assert_eq!(resolver.string(1).unwrap(), "c.d");
        assert_eq!(resolver.string(2).unwrap(), "inline");
    }
}
