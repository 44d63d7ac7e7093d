//! Association-list helpers, mirroring `SExpressionAssocGet` /
//! `SExpressionAssocReplace`. An assoc list is a list of entries shaped
//! `(key value...)`; entries are matched by comparing the key symbol's
//! printed name, not by pointer identity.

use super::value::Value;

/// Looks up `key` in assoc list `list`, returning the cdr of the first
/// matching entry (i.e. everything after the key), or `None` if absent.
pub fn assoc_get<'a>(list: &'a Value, key: &str) -> Option<&'a Value> {
    for entry in list.iter_list() {
        if let Value::Pair(car, cdr) = entry {
            if car.symbol_name() == Some(key) {
                return Some(cdr);
            }
        }
    }
    None
}

/// Convenience wrapper for the common case of a single-value entry
/// `(key value)`: returns `value` rather than the `(value)` tail.
pub fn assoc_get_one<'a>(list: &'a Value, key: &str) -> Option<&'a Value> {
    assoc_get(list, key).and_then(|rest| rest.car())
}

/// Returns a new assoc list with `key`'s entry replaced by
/// `(key . new_value_tail)`, or the entry appended if `key` wasn't
/// present.
pub fn assoc_replace(list: &Value, key: &str, new_value_tail: Value) -> Value {
    let mut found = false;
    let mut entries: Vec<Value> = list
        .iter_list()
        .map(|entry| {
            if let Value::Pair(car, _) = entry {
                if car.symbol_name() == Some(key) {
                    found = true;
                    return Value::cons(Value::symbol(key), new_value_tail.clone());
                }
            }
            entry.clone()
        })
        .collect();

    if !found {
        entries.push(Value::cons(Value::symbol(key), new_value_tail));
    }
    Value::list(entries)
}
