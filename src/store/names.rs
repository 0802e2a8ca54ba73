// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Name keys used for next-key locking.
//!
//! Locking a binding also locks the gap after it by taking a lock on the
//! next bound name. The end of the namespace needs a key of its own, so
//! names are mapped before being reported: `None` becomes [`END_OF_NAMESPACE`]
//! and names starting with `z` get another `z` in front. No real name maps
//! to the end marker, and the mapping keeps the order of names.

use crate::store::StoreError;

/// Access key standing for the position after the last bound name.
pub const END_OF_NAMESPACE: &str = "z.end";

/// Maps a bound name, or `None` for the end of the namespace, to the key
/// reported for access.
pub fn name_for_access(name: Option<&str>) -> String {
    match name {
        None => END_OF_NAMESPACE.to_string(),
        Some(name) if name.starts_with('z') => format!("z{name}"),
        Some(name) => name.to_string(),
    }
}

/// Locks the next bound name and re-reads it until the lock covers the
/// current answer.
///
/// Between the first read and the lock another transaction may bind a name
/// in the gap, so the name is queried again after each lock. Returns the
/// stable next name.
pub(crate) fn lock_next_name<L, Q>(
    first: Option<String>,
    mut lock: L,
    mut requery: Q,
) -> Result<Option<String>, StoreError>
where
    L: FnMut(Option<&str>) -> Result<(), StoreError>,
    Q: FnMut() -> Result<Option<String>, StoreError>,
{
    let mut next = first;
    loop {
        lock(next.as_deref())?;
        let check = requery()?;
        if check == next {
            return Ok(next);
        }
        next = check;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_for_access() {
        assert_eq!(name_for_access(None), "z.end");
        assert_eq!(name_for_access(Some("a")), "a");
        assert_eq!(name_for_access(Some("")), "");
        assert_eq!(name_for_access(Some("zed")), "zzed");
        assert_eq!(name_for_access(Some("z.end")), "zz.end");
    }

    #[test]
    fn test_lock_next_name_stable() {
        let mut locked = Vec::new();
        let next = lock_next_name(
            Some("b".to_string()),
            |name| {
                locked.push(name.map(str::to_string));
                Ok(())
            },
            || Ok(Some("b".to_string())),
        )
        .unwrap();
        assert_eq!(next.as_deref(), Some("b"));
        assert_eq!(locked, vec![Some("b".to_string())]);
    }

    #[test]
    fn test_lock_next_name_follows_changes() {
        let mut answers = vec![None, Some("c".to_string()), Some("c".to_string())].into_iter();
        let mut locked = Vec::new();
        let next = lock_next_name(
            Some("d".to_string()),
            |name| {
                locked.push(name.map(str::to_string));
                Ok(())
            },
            || Ok(answers.next().flatten()),
        )
        .unwrap();
        assert_eq!(next.as_deref(), Some("c"));
        assert_eq!(
            locked,
            vec![Some("d".to_string()), None, Some("c".to_string())]
        );
    }

    #[test]
    fn test_lock_next_name_propagates_lock_failure() {
        let result = lock_next_name(
            None,
            |_| Err(StoreError::Internal("lock failed".into())),
            || Ok(None),
        );
        assert!(matches!(result, Err(StoreError::Internal(_))));
    }
}
