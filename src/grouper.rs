//! Partition records into groups by a case-insensitive key.

use std::collections::HashMap;

/// Records sharing one normalized key, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<'a, T> {
    pub key: String,
    pub members: Vec<&'a T>,
}

/// Lowercased grouping key.
pub fn normalize_key(raw: &str) -> String {
    raw.to_lowercase()
}

/// Group `records` by `key_fn`, lowercasing each key.
///
/// Groups come back in order of first appearance, so the result is fully
/// determined by the input order.
pub fn group_by_key<'a, T, F>(records: &'a [T], key_fn: F) -> Vec<Group<'a, T>>
where
    F: Fn(&T) -> String,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group<'a, T>> = Vec::new();
    for rec in records {
        let key = normalize_key(&key_fn(rec));
        match index.get(&key) {
            Some(&i) => groups[i].members.push(rec),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    members: vec![rec],
                });
            }
        }
    }
    groups
}
